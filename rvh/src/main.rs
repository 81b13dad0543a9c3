//! Remote Validation Helper - CLI
//!
//! Runs shell commands and validation steps on a remote host over SSH with
//! progress draining and retry, and pushes large artifacts in chunks.

#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rvh_common::mock::{MockTransport, is_mock_enabled};
use rvh_common::{HarnessConfig, LogConfig, RemoteSession, Transport, init_logging};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "rvh")]
#[command(author, version, about = "Remote Validation Helper - resilient remote commands and chunked transfers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <config dir>/rvh/config.toml)
    #[arg(short, long, global = true, env = "RVH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one command on the remote host, retrying transient failures
    Exec {
        /// Shell command to run (passed to `bash -c`)
        command: String,

        /// Run without sudo
        #[arg(long)]
        no_sudo: bool,
    },

    /// Push a local file to a remote folder in chunks
    Push {
        /// Local file to send
        source: PathBuf,

        /// Remote folder that receives split_src_<n> chunks
        dest_folder: String,

        /// Octal permission bits for each chunk (overrides config)
        #[arg(long)]
        mode: Option<String>,
    },

    /// Wait until the remote host answers commands
    Ready {
        /// Maximum number of probes
        #[arg(long, default_value = "15")]
        attempts: u32,

        /// Seconds between failed probes
        #[arg(long, default_value = "5")]
        interval_secs: u64,

        /// Seconds to wait after the host first answers
        #[arg(long, default_value = "5")]
        settle_secs: u64,
    },

    /// Run a TOML file of validation steps in order
    Steps {
        /// Step file
        file: PathBuf,

        /// Print step reports as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if cli.json_logs {
        log_config = log_config.with_json();
    }
    let _logging_guards = init_logging(&log_config)?;

    let config = HarnessConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if is_mock_enabled() {
        info!("RVH_MOCK_SSH set, using mock transport");
        let session = mock_session(&config);
        return dispatch(cli.command, &config, session, MockTransport::new()).await;
    }

    let session = config.remote_session()?;
    connect_and_dispatch(cli.command, &config, session).await
}

fn mock_session(config: &HarnessConfig) -> RemoteSession {
    config
        .remote_session()
        .unwrap_or_else(|_| RemoteSession::new("mock-host"))
}

#[cfg(unix)]
async fn connect_and_dispatch(command: Commands, config: &HarnessConfig, session: RemoteSession) -> Result<()> {
    use rvh_common::{SshOptions, SshTransport};

    let options = SshOptions::default()
        .with_connect_timeout(config.connect_timeout())
        .with_known_hosts(config.ssh.known_hosts);
    let transport = SshTransport::connect(&session, &options)
        .await
        .with_context(|| format!("Failed to connect to {session}"))?;

    let result = dispatch(command, config, session, &transport).await;
    if let Err(e) = transport.close().await {
        debug!("closing SSH session failed: {}", e);
    }
    result
}

#[cfg(not(unix))]
async fn connect_and_dispatch(_command: Commands, _config: &HarnessConfig, _session: RemoteSession) -> Result<()> {
    anyhow::bail!("the SSH transport requires a Unix platform; set RVH_MOCK_SSH=1 to use the mock transport")
}

async fn dispatch<T: Transport>(
    command: Commands,
    config: &HarnessConfig,
    session: RemoteSession,
    transport: T,
) -> Result<()> {
    match command {
        Commands::Exec { command, no_sudo } => {
            commands::exec::run(config, session, transport, &command, !no_sudo).await
        }
        Commands::Push {
            source,
            dest_folder,
            mode,
        } => commands::push::run(config, transport, &source, &dest_folder, mode.as_deref()).await,
        Commands::Ready {
            attempts,
            interval_secs,
            settle_secs,
        } => commands::ready::run(config, session, transport, attempts, interval_secs, settle_secs).await,
        Commands::Steps { file, json } => {
            commands::steps::run(config, session, transport, &file, json).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from(["rvh", "exec", "kubectl get pods -A", "--no-sudo"]).unwrap();
        match cli.command {
            Commands::Exec { command, no_sudo } => {
                assert_eq!(command, "kubectl get pods -A");
                assert!(no_sudo);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_parse_push_with_globals() {
        let cli = Cli::try_parse_from([
            "rvh",
            "push",
            "disk.img",
            "/data/images",
            "--mode",
            "0600",
            "--verbose",
            "--config",
            "/etc/rvh.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/rvh.toml")));
        match cli.command {
            Commands::Push {
                source,
                dest_folder,
                mode,
            } => {
                assert_eq!(source, PathBuf::from("disk.img"));
                assert_eq!(dest_folder, "/data/images");
                assert_eq!(mode.as_deref(), Some("0600"));
            }
            _ => panic!("expected push"),
        }
    }

    #[test]
    fn test_parse_ready_defaults() {
        let cli = Cli::try_parse_from(["rvh", "ready"]).unwrap();
        match cli.command {
            Commands::Ready {
                attempts,
                interval_secs,
                settle_secs,
            } => {
                assert_eq!(attempts, 15);
                assert_eq!(interval_secs, 5);
                assert_eq!(settle_secs, 5);
            }
            _ => panic!("expected ready"),
        }
    }

    #[test]
    fn test_push_requires_destination() {
        assert!(Cli::try_parse_from(["rvh", "push", "disk.img"]).is_err());
    }

    #[test]
    fn test_mock_session_falls_back_without_host() {
        let session = mock_session(&HarnessConfig::default());
        assert_eq!(session.address, "mock-host");
    }
}
