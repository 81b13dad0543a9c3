use std::time::Duration;

use anyhow::Result;
use rvh_common::{HarnessConfig, ReadinessPolicy, RemoteSession, ResilientRunner, Transport, wait_until_ready};

pub async fn run<T: Transport>(
    config: &HarnessConfig,
    session: RemoteSession,
    transport: T,
    attempts: u32,
    interval_secs: u64,
    settle_secs: u64,
) -> Result<()> {
    let runner = ResilientRunner::new(session, transport)
        .with_policy(config.retry_policy())
        .with_scratch_log(config.scratch_log());
    let policy = ReadinessPolicy {
        attempts,
        interval: Duration::from_secs(interval_secs),
        settle: Duration::from_secs(settle_secs),
    };
    let probes = wait_until_ready(&runner, &policy).await?;
    println!("ready after {probes} probe(s)");
    Ok(())
}
