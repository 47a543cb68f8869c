// Remote Transport Module
// Copy files to and run commands on ingress hosts

pub mod local;
pub mod ssh;

use crate::error::TransportError;
use async_trait::async_trait;
use std::path::Path;

pub use local::LocalMirrorTransport;
pub use ssh::SshTransport;

/// Remote copy / remote exec capability against a named host
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Copy a local file to `remote` on `host`
    async fn copy_file(&self, local: &Path, host: &str, remote: &str) -> Result<(), TransportError>;

    /// Run `command` on `host`; a non-zero exit is an error
    async fn execute_command(&self, host: &str, command: &str) -> Result<(), TransportError>;
}

/// Join a remote directory and a file name with exactly one separator
pub fn remote_path(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        return file.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), file)
}
