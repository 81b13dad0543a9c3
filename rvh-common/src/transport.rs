//! Transport seam between the command layer and the remote host.

use std::future::Future;

use crate::errors::TransportError;

/// Captured result of one remote shell line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status of the remote shell line.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit status and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can run shell lines on, and write files to, one remote host.
///
/// Implementations hold an already-authenticated connection. Calls are issued
/// sequentially by the command layer, except that a scratch-log drain may be
/// issued while a command started through [`Transport::run`] is still pending.
pub trait Transport {
    /// Run `command_line` through the remote login shell, exactly once.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`], not
    /// as an error.
    fn run(
        &self,
        command_line: &str,
    ) -> impl Future<Output = Result<CommandOutput, TransportError>> + Send;

    /// Write `bytes` to `remote_path` and set its permission bits to `mode`.
    fn push(
        &self,
        remote_path: &str,
        mode: u32,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T: Transport> Transport for &T {
    fn run(
        &self,
        command_line: &str,
    ) -> impl Future<Output = Result<CommandOutput, TransportError>> + Send {
        (**self).run(command_line)
    }

    fn push(
        &self,
        remote_path: &str,
        mode: u32,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).push(remote_path, mode, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_constructors() {
        let ok = CommandOutput::ok("Ready\n");
        assert!(ok.success());
        assert_eq!(ok.stdout, "Ready\n");

        let failed = CommandOutput::failed(1, "boom");
        assert!(!failed.success());
        assert_eq!(failed.stderr, "boom");
        assert!(failed.stdout.is_empty());
    }
}
