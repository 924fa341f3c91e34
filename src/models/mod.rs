mod executables;
mod executions;
mod servers;
mod ssh_keys;

pub use executables::*;
pub use executions::*;
pub use servers::*;
pub use ssh_keys::*;
