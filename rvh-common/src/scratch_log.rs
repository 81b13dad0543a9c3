//! Remote scratch log used to surface output of long-running commands.
//!
//! Every resilient invocation tees its output into a well-known remote file.
//! While the command runs, the file is drained with a read-then-truncate
//! command. The pair is not atomic: a write that lands between the `cat` and
//! the truncation is dropped. The log is advisory, so that loss is accepted.

use std::borrow::Cow;

use crate::errors::TransportError;
use crate::transport::Transport;

/// Default remote path of the scratch log.
pub const DEFAULT_SCRATCH_LOG: &str = "/tmp/rvh-ssh.log";

/// Makes a tee'd pipeline exit with the command's status instead of `tee`'s.
pub const PIPEFAIL_PREFIX: &str = "set -o pipefail; ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLog {
    path: String,
}

impl Default for ScratchLog {
    fn default() -> Self {
        Self::new(DEFAULT_SCRATCH_LOG)
    }
}

impl ScratchLog {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn quoted_path(&self) -> Cow<'_, str> {
        shell_escape::unix::escape(Cow::Borrowed(self.path.as_str()))
    }

    /// Suffix that duplicates a command's output into the log.
    pub fn tee_suffix(&self) -> String {
        format!(" | tee -a {}", self.quoted_path())
    }

    /// `line` with its output duplicated into the log.
    ///
    /// The pipeline runs under `pipefail` so a failing command still
    /// reports its own exit status.
    pub fn attach(&self, line: &str) -> String {
        format!("{PIPEFAIL_PREFIX}{line}{}", self.tee_suffix())
    }

    /// Shell line that prints the log and truncates it.
    pub fn drain_command(&self) -> String {
        let path = self.quoted_path();
        format!("cat {path} && printf \"\" > {path}")
    }

    /// Read everything written since the last drain and empty the log.
    pub async fn drain<T: Transport>(&self, transport: &T) -> Result<String, TransportError> {
        let output = transport.run(&self.drain_command()).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(TransportError::Rejected {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}
