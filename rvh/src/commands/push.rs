use std::path::Path;

use anyhow::{Context, Result};
use rvh_common::config::parse_file_mode;
use rvh_common::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use rvh_common::{ChunkedTransfer, HarnessConfig, Heartbeat, Transport};

pub async fn run<T: Transport>(
    config: &HarnessConfig,
    transport: T,
    source: &Path,
    dest_folder: &str,
    mode: Option<&str>,
) -> Result<()> {
    let mode = match mode {
        Some(mode) => parse_file_mode(mode)?,
        None => config.file_mode()?,
    };
    let engine = ChunkedTransfer::new(transport).with_chunk_size(config.chunk_size_bytes())?;

    let heartbeat = Heartbeat::start(
        format!("push {}", source.display()),
        DEFAULT_HEARTBEAT_INTERVAL,
    );
    let result = engine.transfer_job(source, dest_folder, mode).await;
    heartbeat.stop().await;

    let job = result.with_context(|| format!("Failed to push {} to {}", source.display(), dest_folder))?;
    println!(
        "{}  {} ({} bytes, {} parts)",
        job.digest.unwrap_or_default(),
        source.display(),
        job.file_size,
        job.total_parts
    );
    Ok(())
}
