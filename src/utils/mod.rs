use std::net::IpAddr;

/// Validate an IPv4 or IPv6 address literal.
pub fn is_valid_ip_address(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Validate a key pair name. It becomes a file name inside the key directory,
/// so only `[A-Za-z0-9._-]` is allowed and it may not start with a dot.
pub fn is_valid_key_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Replace every character a key name may not contain with `_`
pub fn sanitize_key_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "key".to_string()
    } else {
        cleaned
    }
}

/// Quote a string for POSIX sh as a single argument
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Truncate output to a maximum number of lines
pub fn truncate_lines(s: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= max_lines {
        s.to_string()
    } else {
        let truncated: Vec<&str> = lines[..max_lines].to_vec();
        format!("{}\n... ({} more lines)", truncated.join("\n"), lines.len() - max_lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ip_address() {
        assert!(is_valid_ip_address("192.168.1.1"));
        assert!(is_valid_ip_address("0.0.0.0"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("fe80::1"));
        assert!(!is_valid_ip_address(""));
        assert!(!is_valid_ip_address("not-an-ip"));
        assert!(!is_valid_ip_address("256.1.1.1"));
        assert!(!is_valid_ip_address("1.2.3"));
        assert!(!is_valid_ip_address("; rm -rf /"));
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("web-01"));
        assert!(is_valid_hostname("db.prod.local"));
        assert!(is_valid_hostname("my_host"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("host name")); // spaces
        assert!(!is_valid_hostname("host;rm")); // semicolon
        assert!(!is_valid_hostname("../etc/passwd")); // path traversal
        assert!(!is_valid_hostname("host\nname")); // newline
    }

    #[test]
    fn test_key_names() {
        assert!(is_valid_key_name("deploy_key"));
        assert!(is_valid_key_name("server_3_web-01.prod"));
        assert!(!is_valid_key_name(""));
        assert!(!is_valid_key_name(".hidden"));
        assert!(!is_valid_key_name("../id_rsa"));
        assert!(!is_valid_key_name("a/b"));
        assert!(!is_valid_key_name("key name"));

        assert_eq!(sanitize_key_name("web 01/prod"), "web_01_prod");
        assert_eq!(sanitize_key_name(""), "key");
        assert!(is_valid_key_name(&sanitize_key_name("../../etc")));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("abc"), "'abc'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_truncate_lines() {
        assert_eq!(truncate_lines("a\nb", 5), "a\nb");
        assert_eq!(truncate_lines("a\nb\nc", 2), "a\nb\n... (1 more lines)");
    }
}
