//! SSH transport built on the system `ssh` client via `openssh`.
//!
//! One multiplexed master connection per [`SshTransport`]; every shell line
//! and chunk push opens a new channel on it.

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::KnownHostsPolicy;
use crate::errors::TransportError;
use crate::session::RemoteSession;
use crate::transport::{CommandOutput, Transport};

/// Connection options for [`SshTransport`].
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Upper bound for establishing the master connection. Remote calls
    /// themselves are not bounded.
    pub connect_timeout: Duration,
    pub known_hosts: KnownHostsPolicy,
    /// Directory for the control socket; defaults to the openssh choice.
    pub control_dir: Option<PathBuf>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            known_hosts: KnownHostsPolicy::Strict,
            control_dir: None,
        }
    }
}

impl SshOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_known_hosts(mut self, policy: KnownHostsPolicy) -> Self {
        self.known_hosts = policy;
        self
    }
}

impl From<KnownHostsPolicy> for KnownHosts {
    fn from(policy: KnownHostsPolicy) -> Self {
        match policy {
            KnownHostsPolicy::Strict => KnownHosts::Strict,
            KnownHostsPolicy::Add => KnownHosts::Add,
            KnownHostsPolicy::Accept => KnownHosts::Accept,
        }
    }
}

/// Render an openssh failure, mapping timeouts to [`TransportError::TimedOut`].
fn map_ssh_error(context: &str, err: openssh::Error) -> TransportError {
    classify_message(format!("{context}: {err}"))
}

fn classify_message(message: String) -> TransportError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        TransportError::TimedOut { detail: message }
    } else {
        TransportError::Ssh(message)
    }
}

fn into_command_output(output: Output) -> CommandOutput {
    CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Shell line that stores stdin at `remote_path` with permissions `mode`.
pub fn push_command(remote_path: &str, mode: u32) -> String {
    let target = shell_escape::unix::escape(Cow::Borrowed(remote_path));
    format!("cat > {target} && chmod {mode:o} {target}")
}

/// Production transport over one SSH master connection.
pub struct SshTransport {
    session: Session,
    destination: String,
}

impl SshTransport {
    /// Open the master connection for `remote`.
    pub async fn connect(remote: &RemoteSession, options: &SshOptions) -> Result<Self, TransportError> {
        let mut builder = SessionBuilder::default();
        builder
            .user(remote.user.clone())
            .port(remote.port)
            .connect_timeout(options.connect_timeout)
            .known_hosts_check(options.known_hosts.into());
        if let Some(key) = &remote.identity_file {
            builder.keyfile(key);
        }
        if let Some(dir) = &options.control_dir {
            builder.control_directory(dir);
        }

        debug!(host = %remote, "Opening SSH master connection");
        let session = builder
            .connect(&remote.address)
            .await
            .map_err(|e| map_ssh_error(&format!("connect to {remote}"), e))?;
        info!(host = %remote, "SSH session established");

        Ok(Self {
            session,
            destination: remote.to_string(),
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Check the master connection is still alive.
    pub async fn check(&self) -> Result<(), TransportError> {
        self.session
            .check()
            .await
            .map_err(|e| map_ssh_error("session check", e))
    }

    /// Tear down the master connection.
    pub async fn close(self) -> Result<(), TransportError> {
        let destination = self.destination;
        self.session
            .close()
            .await
            .map_err(|e| map_ssh_error(&format!("close {destination}"), e))
    }
}

impl Transport for SshTransport {
    async fn run(&self, command_line: &str) -> Result<CommandOutput, TransportError> {
        let output = self
            .session
            .raw_command(command_line)
            .output()
            .await
            .map_err(|e| map_ssh_error("run", e))?;
        Ok(into_command_output(output))
    }

    async fn push(&self, remote_path: &str, mode: u32, bytes: &[u8]) -> Result<(), TransportError> {
        let line = push_command(remote_path, mode);
        let mut command = self.session.raw_command(&line);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .await
            .map_err(|e| map_ssh_error("spawn push", e))?;

        if let Some(mut stdin) = child.stdin().take() {
            stdin.write_all(bytes).await?;
            stdin.shutdown().await?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| map_ssh_error("push", e))?;
        let output = into_command_output(output);
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}
