use async_trait::async_trait;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ConnectionError, ConnectionParams, Credential, HostKeyVerifier, RemoteSession, SessionResult};

/// Pause between polls of a channel with nothing to read
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// libssh2-backed session client. Every call opens its own TCP connection
/// on the blocking pool and tears it down afterwards.
pub struct Ssh2Client {
    host_keys: Arc<HostKeyVerifier>,
    connect_timeout: Duration,
}

impl Ssh2Client {
    pub fn new(host_keys: HostKeyVerifier, connect_timeout: Duration) -> Self {
        Self {
            host_keys: Arc::new(host_keys),
            connect_timeout,
        }
    }
}

#[async_trait]
impl RemoteSession for Ssh2Client {
    async fn connect_and_run(
        &self,
        params: &ConnectionParams,
        command: &str,
        timeout: Duration,
    ) -> SessionResult {
        let params = params.clone();
        let command = command.to_string();
        let host_keys = self.host_keys.clone();
        let connect_timeout = self.connect_timeout.min(timeout);

        let task = tokio::task::spawn_blocking(move || {
            run_command(&params, &command, connect_timeout, timeout, &host_keys)
        });

        // The blocking thread enforces the same deadline itself and tears the session down
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => SessionResult::failed(e),
            Ok(Err(e)) => SessionResult::failed(format!("Task join error: {}", e)),
            Err(_) => SessionResult::failed(ConnectionError::Timeout(timeout.as_secs())),
        }
    }
}

/// Open, verify and authenticate a session.
/// This is blocking, so call from a spawn_blocking context.
fn open_session(
    params: &ConnectionParams,
    connect_timeout: Duration,
    io_timeout: Duration,
    host_keys: &HostKeyVerifier,
) -> Result<ssh2::Session, ConnectionError> {
    let target = format!("{}:{}", params.host, params.port);
    let addr = (params.host.as_str(), params.port)
        .to_socket_addrs()
        .map_err(|e| ConnectionError::Address(format!("{}: {}", target, e)))?
        .next()
        .ok_or_else(|| ConnectionError::Address(format!("{}: no addresses resolved", target)))?;

    let tcp = TcpStream::connect_timeout(&addr, connect_timeout)?;
    tcp.set_read_timeout(Some(io_timeout)).ok();
    tcp.set_write_timeout(Some(io_timeout)).ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| ConnectionError::Handshake(format!("Failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(io_timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

    host_keys.verify(&session, &params.host, params.port)?;
    authenticate(&session, params)?;
    Ok(session)
}

fn authenticate(session: &ssh2::Session, params: &ConnectionParams) -> Result<(), ConnectionError> {
    let user = params.username.as_str();
    match &params.credential {
        Credential::KeyFile(path) => {
            session
                .userauth_pubkey_file(user, None, path, None)
                .map_err(|e| ConnectionError::Auth(format!("key {}: {}", path.display(), e)))?;
        }
        Credential::Password(password) => {
            match session.userauth_password(user, password) {
                Ok(_) if session.authenticated() => return Ok(()),
                _ => {}
            }
            // Some appliances only offer keyboard-interactive
            let mut prompter = PasswordPrompt {
                password: password.clone(),
            };
            let _ = session.userauth_keyboard_interactive(user, &mut prompter);
        }
        Credential::None => {
            if session.userauth_agent(user).is_err() {
                // Asking for the method list attempts the "none" method
                let _ = session.auth_methods(user);
            }
        }
    }

    if session.authenticated() {
        Ok(())
    } else {
        Err(ConnectionError::Auth(format!(
            "all methods exhausted ({})",
            params.credential.kind()
        )))
    }
}

/// Connect, run exactly one command and collect stdout, stderr and exit status.
/// Everything after the TCP connect is bounded by one deadline `timeout` from now.
fn run_command(
    params: &ConnectionParams,
    command: &str,
    connect_timeout: Duration,
    timeout: Duration,
    host_keys: &HostKeyVerifier,
) -> Result<SessionResult, ConnectionError> {
    let deadline = Instant::now() + timeout;
    let session = open_session(params, connect_timeout, timeout, host_keys)?;

    let mut channel = session
        .channel_session()
        .map_err(|e| ConnectionError::Exec(format!("Failed to open channel: {}", e)))?;
    channel
        .exec(command)
        .map_err(|e| ConnectionError::Exec(format!("Failed to execute command: {}", e)))?;

    session.set_blocking(false);
    let collected = collect_output(&mut channel, deadline, timeout.as_secs());
    session.set_blocking(true);

    let (stdout, stderr) = match collected {
        Ok(streams) => streams,
        Err(e) => {
            session.set_timeout(1_000);
            let _ = channel.close();
            let _ = session.disconnect(None, "timed out", None);
            return Err(e);
        }
    };

    let remaining = deadline.saturating_duration_since(Instant::now()).max(Duration::from_millis(1));
    session.set_timeout(u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX));
    channel
        .wait_close()
        .map_err(|e| ConnectionError::Exec(format!("Failed to close channel: {}", e)))?;
    let exit_code = channel
        .exit_status()
        .map_err(|e| ConnectionError::Exec(format!("Failed to read exit status: {}", e)))?;
    let exit_signal = channel.exit_signal().ok().and_then(|s| s.exit_signal);

    let _ = session.disconnect(None, "done", None);

    Ok(finish_result(exit_code, exit_signal, &stdout, &stderr))
}

/// Non-blocking view of a running command's output
trait OutputStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    /// The remote side closed its output and nothing is left to read
    fn finished(&self) -> bool;
}

impl OutputStreams for ssh2::Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stderr().read(buf)
    }

    fn finished(&self) -> bool {
        self.eof()
    }
}

/// Append whatever is available now; `Ok(false)` when nothing was read
fn drain(read: std::io::Result<usize>, buf: &[u8], sink: &mut Vec<u8>) -> std::io::Result<bool> {
    match read {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read stdout and stderr until the command closes them or `deadline` passes.
/// A command that keeps writing still stops at the deadline.
fn collect_output(
    streams: &mut impl OutputStreams,
    deadline: Instant,
    timeout_secs: u64,
) -> Result<(Vec<u8>, Vec<u8>), ConnectionError> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let read = streams.read_stdout(&mut buf);
        let got_out = drain(read, &buf, &mut stdout)
            .map_err(|e| ConnectionError::Exec(format!("Failed to read output: {}", e)))?;
        let read = streams.read_stderr(&mut buf);
        let got_err = drain(read, &buf, &mut stderr)
            .map_err(|e| ConnectionError::Exec(format!("Failed to read stderr: {}", e)))?;

        if !got_out && !got_err && streams.finished() {
            return Ok((stdout, stderr));
        }
        if Instant::now() >= deadline {
            return Err(ConnectionError::Timeout(timeout_secs));
        }
        if !got_out && !got_err {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// libssh2 reports exit status 0 when the server sent none, which is what
/// happens when the command dies on a signal. A signal always means failure.
fn finish_result(exit_code: i32, exit_signal: Option<String>, stdout: &[u8], stderr: &[u8]) -> SessionResult {
    let output = String::from_utf8_lossy(stdout).into_owned();
    let mut error = String::from_utf8_lossy(stderr).into_owned();
    match exit_signal {
        Some(signal) => {
            if !error.is_empty() && !error.ends_with('\n') {
                error.push('\n');
            }
            error.push_str(&format!("Command killed by signal SIG{}", signal.trim_start_matches("SIG")));
            SessionResult {
                success: false,
                exit_code: -1,
                output,
                error,
            }
        }
        None => SessionResult::from_exit(exit_code, output, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::HostKeyPolicy;

    fn client(dir: &std::path::Path) -> Ssh2Client {
        Ssh2Client::new(
            HostKeyVerifier::new(HostKeyPolicy::StrictKnownHosts, dir.join("known_hosts")),
            Duration::from_secs(2),
        )
    }

    /// Scripted output: chunks per stream, served one per read, `WouldBlock` in between
    struct FakeStreams {
        stdout: Vec<&'static str>,
        stderr: Vec<&'static str>,
        endless: bool,
        polls: usize,
    }

    impl FakeStreams {
        fn serve(chunks: &mut Vec<&'static str>, buf: &mut [u8]) -> std::io::Result<usize> {
            if chunks.is_empty() {
                return Err(ErrorKind::WouldBlock.into());
            }
            let chunk = chunks.remove(0).as_bytes();
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    impl OutputStreams for FakeStreams {
        fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.polls += 1;
            if self.endless {
                std::thread::sleep(Duration::from_millis(1));
                buf[0] = b'.';
                return Ok(1);
            }
            // Every other poll finds nothing yet
            if self.polls % 2 == 1 {
                return Err(ErrorKind::WouldBlock.into());
            }
            Self::serve(&mut self.stdout, buf)
        }

        fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.endless {
                return Err(ErrorKind::WouldBlock.into());
            }
            Self::serve(&mut self.stderr, buf)
        }

        fn finished(&self) -> bool {
            !self.endless && self.stdout.is_empty() && self.stderr.is_empty()
        }
    }

    #[test]
    fn test_collect_output_reads_both_streams_to_eof() {
        let mut streams = FakeStreams {
            stdout: vec!["hello ", "world\n"],
            stderr: vec!["warn\n"],
            endless: false,
            polls: 0,
        };

        let (out, err) = collect_output(&mut streams, Instant::now() + Duration::from_secs(5), 5).unwrap();

        assert_eq!(out, b"hello world\n");
        assert_eq!(err, b"warn\n");
    }

    #[test]
    fn test_collect_output_stops_chatty_command_at_deadline() {
        let mut streams = FakeStreams {
            stdout: vec![],
            stderr: vec![],
            endless: true,
            polls: 0,
        };
        let started = Instant::now();

        let err = collect_output(&mut streams, started + Duration::from_millis(200), 1).unwrap_err();

        assert!(matches!(err, ConnectionError::Timeout(1)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_signal_death_is_a_failure() {
        let killed = finish_result(0, Some("KILL".to_string()), b"partial", b"");
        assert!(!killed.success);
        assert_eq!(killed.exit_code, -1);
        assert_eq!(killed.output, "partial");
        assert_eq!(killed.error, "Command killed by signal SIGKILL");

        let with_stderr = finish_result(0, Some("SEGV".to_string()), b"", b"oops");
        assert_eq!(with_stderr.error, "oops\nCommand killed by signal SIGSEGV");

        let clean = finish_result(3, None, b"out", b"err");
        assert_eq!(clean, SessionResult::from_exit(3, "out".to_string(), "err".to_string()));
    }

    #[tokio::test]
    async fn test_unresolvable_host_folds_into_result() {
        let dir = tempfile::tempdir().unwrap();
        let params = ConnectionParams {
            host: "host.invalid".to_string(),
            port: 22,
            username: "root".to_string(),
            credential: Credential::None,
        };

        let result = client(dir.path())
            .connect_and_run(&params, "true", Duration::from_secs(5))
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(!result.error.is_empty());
    }

    #[tokio::test]
    async fn test_refused_port_folds_into_result() {
        // Bind then drop a listener to get a local port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let params = ConnectionParams {
            host: "127.0.0.1".to_string(),
            port,
            username: "root".to_string(),
            credential: Credential::Password("pw".to_string()),
        };

        let result = client(dir.path())
            .connect_and_run(&params, "true", Duration::from_secs(5))
            .await;

        assert_eq!(result.exit_code, -1);
        assert!(result.error.starts_with("TCP connection failed"));
    }
}
