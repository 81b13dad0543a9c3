//! Single-shot remote command execution.

use tracing::{debug, trace};

use crate::errors::RemoteError;
use crate::transport::Transport;

/// Wrap `command` for the remote login shell.
///
/// Produces `sudo bash -c '<command>'` when `privileged`, else
/// `bash -c '<command>'`. Single quotes inside `command` are closed, escaped
/// and reopened so the payload reaches bash unchanged.
pub fn wrap_command(command: &str, privileged: bool) -> String {
    let quoted = single_quote(command);
    if privileged {
        format!("sudo bash -c {quoted}")
    } else {
        format!("bash -c {quoted}")
    }
}

fn single_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Issues exactly one remote call per request.
#[derive(Debug, Clone)]
pub struct CommandExecutor<T> {
    transport: T,
}

impl<T: Transport> CommandExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Wrap `command` and run it once, returning stdout verbatim.
    pub async fn execute(&self, command: &str, privileged: bool) -> Result<String, RemoteError> {
        self.execute_line(&wrap_command(command, privileged)).await
    }

    /// Run an already-formatted shell line once.
    pub async fn execute_line(&self, line: &str) -> Result<String, RemoteError> {
        debug!(line, "Executing remote command");
        let output = self.transport.run(line).await?;
        trace!(
            exit_code = output.exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Remote command returned"
        );
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(RemoteError::NonZeroExit {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}
