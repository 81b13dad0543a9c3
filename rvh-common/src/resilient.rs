//! Resilient remote invocation.
//!
//! Each invocation tees the command's output into the remote scratch log,
//! drains that log on a fixed poll interval while the call is in flight, and
//! retries a bounded number of times when the failure looks like a transient
//! connectivity blip ("i/o timeout"). Any other failure ends the invocation
//! immediately, so retries never hide a genuinely failing command.
//!
//! ```text
//! Idle -> Running -> (Draining -> Running)* -> Completed
//!                                           -> TransientFailure -> Running (attempt + 1)
//!                                           -> FatalFailure
//!                                           -> RetriesExhausted
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, warn};

use crate::errors::RemoteError;
use crate::executor::{CommandExecutor, wrap_command};
use crate::scratch_log::ScratchLog;
use crate::session::RemoteSession;
use crate::transport::Transport;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default interval between scratch-log drains.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Default pause before retrying a transient failure.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);
/// Error text that marks a failure as transient.
pub const TRANSIENT_MARKER: &str = "i/o timeout";

/// Retry and progress-polling policy for resilient invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first try (minimum 1).
    pub max_attempts: u32,
    /// How often the scratch log is drained while a command runs.
    pub poll_interval: Duration,
    /// Fixed pause before a transient failure is retried.
    pub backoff: Duration,
    /// Substrings that classify an error message as transient.
    pub transient_markers: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: DEFAULT_RETRY_BACKOFF,
            transient_markers: vec![TRANSIENT_MARKER.to_string()],
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether `err` should be retried.
    ///
    /// Only transport failures qualify. A command that ran and exited
    /// non-zero is fatal even if its stderr mentions a timeout.
    pub fn is_transient(&self, err: &RemoteError) -> bool {
        let RemoteError::Transport { source } = err else {
            return false;
        };
        let message = source.to_string();
        self.transient_markers
            .iter()
            .any(|marker| !marker.is_empty() && message.contains(marker.as_str()))
    }
}

/// Bookkeeping for one call to [`ResilientRunner::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: String,
    pub privileged: bool,
    /// Attempts started so far.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl CommandInvocation {
    pub fn new(command: impl Into<String>, privileged: bool, max_attempts: u32) -> Self {
        Self {
            command: command.into(),
            privileged,
            attempt: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// Terminal state of an invocation.
#[derive(Debug)]
pub enum InvocationOutcome {
    /// The command succeeded; carries its stdout.
    Success { output: String, attempts: u32 },
    /// A non-transient failure; no further attempts were made.
    Fatal { attempt: u32, error: RemoteError },
    /// Every attempt failed transiently.
    RetriesExhausted { attempts: u32, last_error: RemoteError },
}

impl InvocationOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::RetriesExhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn into_result(self) -> Result<String, RemoteError> {
        match self {
            Self::Success { output, .. } => Ok(output),
            Self::Fatal { attempt, error } => Err(RemoteError::Fatal {
                attempt,
                source: Box::new(error),
            }),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => Err(RemoteError::RetriesExhausted {
                attempts,
                last_error: Box::new(last_error),
            }),
        }
    }
}

type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

fn log_progress(text: &str) {
    for line in text.lines() {
        info!(target: "rvh::progress", "{}", line);
    }
}

/// Runs commands on one remote host with progress draining and bounded retry.
pub struct ResilientRunner<T> {
    session: RemoteSession,
    executor: CommandExecutor<T>,
    scratch: ScratchLog,
    policy: RetryPolicy,
    sink: ProgressSink,
}

impl<T: Transport> ResilientRunner<T> {
    pub fn new(session: RemoteSession, transport: T) -> Self {
        Self {
            session,
            executor: CommandExecutor::new(transport),
            scratch: ScratchLog::default(),
            policy: RetryPolicy::default(),
            sink: Arc::new(log_progress),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_scratch_log(mut self, scratch: ScratchLog) -> Self {
        self.scratch = scratch;
        self
    }

    /// Replace the default progress sink (INFO events on `rvh::progress`).
    pub fn with_progress_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        self.executor.transport()
    }

    /// Run `command`, returning its stdout or a descriptive error.
    pub async fn run(&self, command: &str, privileged: bool) -> Result<String, RemoteError> {
        self.invoke(command, privileged).await.into_result()
    }

    /// Run `command` under the session's default privilege mode.
    pub async fn run_default(&self, command: &str) -> Result<String, RemoteError> {
        self.run(command, self.session.privilege.is_privileged()).await
    }

    pub async fn sudo(&self, command: &str) -> Result<String, RemoteError> {
        self.run(command, true).await
    }

    pub async fn plain(&self, command: &str) -> Result<String, RemoteError> {
        self.run(command, false).await
    }

    /// Run `command` and report the tagged terminal state.
    pub async fn invoke(&self, command: &str, privileged: bool) -> InvocationOutcome {
        let mut invocation =
            CommandInvocation::new(command, privileged, self.policy.max_attempts());
        let line = self.scratch.attach(&wrap_command(command, privileged));

        loop {
            invocation.attempt += 1;
            debug!(
                host = %self.session,
                attempt = invocation.attempt,
                max_attempts = invocation.max_attempts,
                privileged,
                "Starting remote invocation attempt"
            );

            match self.attempt(&line).await {
                Ok(output) => {
                    debug!(attempt = invocation.attempt, "Remote invocation succeeded");
                    return InvocationOutcome::Success {
                        output,
                        attempts: invocation.attempt,
                    };
                }
                Err(error) if self.policy.is_transient(&error) => {
                    if !invocation.has_attempts_left() {
                        warn!(
                            attempts = invocation.attempt,
                            error = %error,
                            "Transient failure on final attempt, giving up"
                        );
                        return InvocationOutcome::RetriesExhausted {
                            attempts: invocation.attempt,
                            last_error: error,
                        };
                    }
                    warn!(
                        attempt = invocation.attempt,
                        backoff_secs = self.policy.backoff.as_secs_f64(),
                        error = %error,
                        "i/o timeout error, trying again"
                    );
                    sleep(self.policy.backoff).await;
                }
                Err(error) => {
                    warn!(
                        attempt = invocation.attempt,
                        error = %error,
                        "Remote invocation failed (non-retryable)"
                    );
                    return InvocationOutcome::Fatal {
                        attempt: invocation.attempt,
                        error,
                    };
                }
            }
        }
    }

    /// One attempt: race the call against the drain timer, then flush the log.
    async fn attempt(&self, line: &str) -> Result<String, RemoteError> {
        let call = self.executor.execute_line(line);
        tokio::pin!(call);

        let period = self.policy.poll_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut call => break result,
                _ = ticker.tick() => self.drain_progress().await,
            }
        };

        self.drain_progress().await;
        result
    }

    /// Forward whatever the command wrote since the last drain. Never fails.
    async fn drain_progress(&self) {
        match self.scratch.drain(self.executor.transport()).await {
            Ok(text) if !text.is_empty() => (self.sink)(&text),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "error reading scratch log"),
        }
    }
}
