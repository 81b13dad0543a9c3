use std::io::Write;

use anyhow::{Context, Result};
use rvh_common::{HarnessConfig, RemoteSession, ResilientRunner, Transport};

pub async fn run<T: Transport>(
    config: &HarnessConfig,
    session: RemoteSession,
    transport: T,
    command: &str,
    privileged: bool,
) -> Result<()> {
    let runner = ResilientRunner::new(session, transport)
        .with_policy(config.retry_policy())
        .with_scratch_log(config.scratch_log());

    let output = runner
        .run(command, privileged)
        .await
        .with_context(|| format!("Command failed: {command}"))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
