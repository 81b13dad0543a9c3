//! Error types for remote execution and artifact transfer.
//!
//! Transient failures are recognised by message text (see
//! [`RemoteError::message_contains`]), so every variant that wraps a lower
//! level failure renders that failure into its own message.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a [`crate::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection or the remote call did not answer in time.
    #[error("i/o timeout: {detail}")]
    TimedOut { detail: String },

    /// The SSH layer failed (connect, mux, or session teardown).
    #[error("ssh transport error: {0}")]
    Ssh(String),

    /// Local I/O failure while talking to the transport process.
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A remote write exited non-zero.
    #[error("remote write rejected with status {exit_code}: {stderr}")]
    Rejected { exit_code: i32, stderr: String },
}

/// Failures surfaced by the command executor and resilient invocation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The transport could not carry the command.
    #[error("remote command failed: {source}")]
    Transport {
        #[source]
        source: TransportError,
    },

    /// The command ran but exited non-zero.
    #[error("remote command failed: exit status {exit_code}: {}", .stderr.trim())]
    NonZeroExit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// A non-transient failure stopped the invocation.
    #[error("remote invocation failed on attempt {attempt}: {source}")]
    Fatal {
        attempt: u32,
        #[source]
        source: Box<RemoteError>,
    },

    /// Every attempt failed with a transient error.
    #[error("remote invocation gave up after {attempts} attempts, retries exhausted: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: Box<RemoteError>,
    },
}

impl RemoteError {
    /// Whether the rendered message contains `marker`.
    pub fn message_contains(&self, marker: &str) -> bool {
        self.to_string().contains(marker)
    }

    /// Exit status reported by the remote command, if it ran at all.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => Some(*exit_code),
            Self::Fatal { source, .. } => source.exit_code(),
            Self::RetriesExhausted { last_error, .. } => last_error.exit_code(),
            Self::Transport { .. } => None,
        }
    }
}

impl From<TransportError> for RemoteError {
    fn from(source: TransportError) -> Self {
        Self::Transport { source }
    }
}

/// Failures raised by the chunked transfer engine.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("unable to open source file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read chunk {index} of {path}: {source}")]
    Read {
        path: PathBuf,
        index: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to copy chunk {index} to {remote_path}: {source}")]
    Push {
        index: u64,
        remote_path: String,
        #[source]
        source: TransportError,
    },
}

impl TransferError {
    /// Index of the chunk that failed, for read and push failures.
    pub fn chunk_index(&self) -> Option<u64> {
        match self {
            Self::Read { index, .. } | Self::Push { index, .. } => Some(*index),
            Self::InvalidChunkSize | Self::Open { .. } => None,
        }
    }
}
