//! Waiting for a freshly provisioned host to accept commands.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::RemoteError;
use crate::resilient::ResilientRunner;
use crate::transport::Transport;

/// Command used to probe the host.
pub const READINESS_PROBE: &str = "whoami";

#[derive(Debug, Error)]
#[error("host never became ready after {attempts} attempts: {last_error}")]
pub struct ReadinessError {
    pub attempts: u32,
    #[source]
    pub last_error: RemoteError,
}

/// How long to keep probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    /// Pause between failed probes.
    pub interval: Duration,
    /// Extra wait after the first successful probe.
    pub settle: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval: Duration::from_secs(5),
            settle: Duration::from_secs(5),
        }
    }
}

/// Probe the host with a privileged `whoami` until it answers.
///
/// Each probe is a full resilient invocation, so a transient timeout inside
/// one probe is retried before the probe counts as failed. Returns the number
/// of probes it took.
pub async fn wait_until_ready<T: Transport>(
    runner: &ResilientRunner<T>,
    policy: &ReadinessPolicy,
) -> Result<u32, ReadinessError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match runner.sudo(READINESS_PROBE).await {
            Ok(user) => {
                info!(host = %runner.session(), attempt, user = user.trim(), "Host is answering");
                if !policy.settle.is_zero() {
                    debug!(settle_secs = policy.settle.as_secs(), "Waiting for host to settle");
                    sleep(policy.settle).await;
                }
                return Ok(attempt);
            }
            Err(last_error) if attempt >= attempts => {
                warn!(attempts = attempt, error = %last_error, "Host never became ready");
                return Err(ReadinessError {
                    attempts: attempt,
                    last_error,
                });
            }
            Err(e) => {
                debug!(attempt, error = %e, "Host not ready yet");
                sleep(policy.interval).await;
            }
        }
    }
}
