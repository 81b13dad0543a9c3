use std::path::Path;

use anyhow::{Context, Result};
use rvh_common::{HarnessConfig, RemoteSession, ResilientRunner, StepFile, Transport, run_steps};

pub async fn run<T: Transport>(
    config: &HarnessConfig,
    session: RemoteSession,
    transport: T,
    file: &Path,
    json: bool,
) -> Result<()> {
    let steps = StepFile::load(file)?;
    let runner = ResilientRunner::new(session, transport)
        .with_policy(config.retry_policy())
        .with_scratch_log(config.scratch_log());

    let reports = run_steps(&runner, &steps)
        .await
        .with_context(|| format!("Validation failed in {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!(
                "PASS  {}  ({} attempt(s), {:.1}s)",
                report.name,
                report.attempts,
                report.duration.as_secs_f64()
            );
        }
        println!("{} step(s) passed", reports.len());
    }
    Ok(())
}
