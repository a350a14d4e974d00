pub mod archive;
pub mod error;
pub mod process;
pub mod scp;
pub mod ssh;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use archive::{TarArchiver, DEFAULT_EXCLUDES};
pub use error::{Result, TransportError};
pub use process::{ProcessOutput, ProcessRunner};
pub use scp::ScpTransporter;
pub use ssh::SshExecutor;
pub use traits::{Archiver, RemoteExecutor, RemoteOutput, Transporter};
