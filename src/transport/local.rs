// Local mirror transport
// Writes each host's files under `<root>/<host>/` for staging and dry runs

use super::RemoteTransport;
use crate::error::TransportError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// File name recording the commands "executed" on a mirrored host
pub const COMMAND_LOG: &str = "commands.log";

pub struct LocalMirrorTransport {
    root: PathBuf,
}

impl LocalMirrorTransport {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory standing in for `host`
    pub fn host_root(&self, host: &str) -> PathBuf {
        self.root.join(host.replace(':', "_"))
    }

    /// Local location standing in for `remote` on `host`
    pub fn mirror_path(&self, host: &str, remote: &str) -> Option<PathBuf> {
        let relative = Path::new(remote.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.host_root(host).join(relative))
    }
}

#[async_trait]
impl RemoteTransport for LocalMirrorTransport {
    async fn copy_file(&self, local: &Path, host: &str, remote: &str) -> Result<(), TransportError> {
        let copy_error = |reason: String| TransportError::Copy {
            host: host.to_string(),
            local: local.display().to_string(),
            remote: remote.to_string(),
            reason,
        };

        let target = self
            .mirror_path(host, remote)
            .ok_or_else(|| copy_error("remote path escapes the mirror root".to_string()))?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| copy_error(e.to_string()))?;
        }
        tokio::fs::copy(local, &target)
            .await
            .map_err(|e| copy_error(e.to_string()))?;

        debug!(host = %host, target = %target.display(), "File mirrored");
        Ok(())
    }

    async fn execute_command(&self, host: &str, command: &str) -> Result<(), TransportError> {
        let exec_error = |reason: String| TransportError::Exec {
            host: host.to_string(),
            command: command.to_string(),
            reason,
        };

        let dir = self.host_root(host);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(COMMAND_LOG))
            .await
            .map_err(|e| exec_error(e.to_string()))?;
        log.write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|e| exec_error(e.to_string()))?;
        // tokio finishes writes in the background; flush before reporting success
        log.flush().await.map_err(|e| exec_error(e.to_string()))?;

        debug!(host = %host, command = %command, "Command recorded");
        Ok(())
    }
}
