//! Shared library for Remote Validation Helper.
//!
//! Provides the resilient remote command layer (sudo wrapping, progress
//! draining, bounded retry on transient transport failures) and the
//! chunked artifact transfer engine used by validation runs.

pub mod config;
pub mod errors;
pub mod executor;
pub mod heartbeat;
pub mod logging;
pub mod mock;
pub mod readiness;
pub mod resilient;
pub mod scratch_log;
pub mod session;
#[cfg(unix)]
pub mod ssh;
pub mod steps;
pub mod transfer;
pub mod transport;

pub use config::{ConfigError, HarnessConfig, KnownHostsPolicy};
pub use errors::{RemoteError, TransferError, TransportError};
pub use executor::{CommandExecutor, wrap_command};
pub use heartbeat::Heartbeat;
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use readiness::{ReadinessError, ReadinessPolicy, wait_until_ready};
pub use resilient::{CommandInvocation, InvocationOutcome, ResilientRunner, RetryPolicy};
pub use scratch_log::ScratchLog;
pub use session::{PrivilegeMode, RemoteSession};
#[cfg(unix)]
pub use ssh::{SshOptions, SshTransport};
pub use steps::{Step, StepError, StepFile, StepReport, run_steps};
pub use transfer::{ChunkDescriptor, ChunkPlan, ChunkedTransfer, DEFAULT_CHUNK_SIZE, TransferJob};
pub use transport::{CommandOutput, Transport};
