// SSH transport
// Shells out to the system scp/ssh clients with a fixed identity

use super::RemoteTransport;
use crate::error::TransportError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, instrument};

/// SSH identity and connection options shared by every host
#[derive(Debug, Clone)]
pub struct SshTransport {
    user: String,
    private_key_path: PathBuf,
    connect_timeout_secs: u64,
}

impl SshTransport {
    pub fn new<P: AsRef<Path>>(user: impl Into<String>, private_key_path: P, connect_timeout_secs: u64) -> Self {
        Self {
            user: user.into(),
            private_key_path: private_key_path.as_ref().to_path_buf(),
            connect_timeout_secs,
        }
    }

    /// Split `host[:port]` into its parts
    fn split_host(host: &str) -> (&str, Option<&str>) {
        match host.rsplit_once(':') {
            Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
                (name, Some(port))
            }
            _ => (host, None),
        }
    }

    fn common_options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.private_key_path.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ]
    }

    /// Arguments for `scp`, which takes the port as `-P`
    fn scp_args(&self, local: &Path, host: &str, remote: &str) -> Vec<String> {
        let (name, port) = Self::split_host(host);
        let mut args = self.common_options();
        if let Some(port) = port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args.push(local.display().to_string());
        args.push(format!("{}@{}:{}", self.user, name, remote));
        args
    }

    /// Arguments for `ssh`, which takes the port as `-p`
    fn ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        let (name, port) = Self::split_host(host);
        let mut args = self.common_options();
        if let Some(port) = port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(format!("{}@{}", self.user, name));
        args.push(command.to_string());
        args
    }

    fn failure_reason(output: &Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            output.status.to_string()
        } else {
            format!("{}: {}", output.status, stderr)
        }
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    #[instrument(skip(self, local), fields(local = %local.display()))]
    async fn copy_file(&self, local: &Path, host: &str, remote: &str) -> Result<(), TransportError> {
        let copy_error = |reason: String| TransportError::Copy {
            host: host.to_string(),
            local: local.display().to_string(),
            remote: remote.to_string(),
            reason,
        };

        let output = Command::new("scp")
            .args(self.scp_args(local, host, remote))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| copy_error(e.to_string()))?;

        if !output.status.success() {
            return Err(copy_error(Self::failure_reason(&output)));
        }

        debug!("File copied");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn execute_command(&self, host: &str, command: &str) -> Result<(), TransportError> {
        let exec_error = |reason: String| TransportError::Exec {
            host: host.to_string(),
            command: command.to_string(),
            reason,
        };

        let output = Command::new("ssh")
            .args(self.ssh_args(host, command))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        if !output.status.success() {
            return Err(exec_error(Self::failure_reason(&output)));
        }

        debug!("Remote command finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SshTransport {
        SshTransport::new("deploy", "/etc/dcm/id_ed25519", 10)
    }

    #[test]
    fn test_scp_args_with_port() {
        let args = transport().scp_args(Path::new("/tmp/p1/cert.pem"), "edge-1:2222", "/opt/certs/p1_fullchain.pem");

        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/etc/dcm/id_ed25519");
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        let port = args.iter().position(|a| a == "-P").unwrap();
        assert_eq!(args[port + 1], "2222");
        assert_eq!(args.last().unwrap(), "deploy@edge-1:/opt/certs/p1_fullchain.pem");
    }

    #[test]
    fn test_ssh_args_without_port() {
        let args = transport().ssh_args("edge-2.internal", "sudo nginx -s reload");

        assert!(!args.contains(&"-p".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@edge-2.internal");
        assert_eq!(args[args.len() - 1], "sudo nginx -s reload");
    }

    #[test]
    fn test_split_host() {
        assert_eq!(SshTransport::split_host("edge:22"), ("edge", Some("22")));
        assert_eq!(SshTransport::split_host("edge"), ("edge", None));
        assert_eq!(SshTransport::split_host("edge:"), ("edge:", None));
    }
}
