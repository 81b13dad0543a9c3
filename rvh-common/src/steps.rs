//! Validation steps loaded from TOML.
//!
//! ```toml
//! [[step]]
//! name = "ingress answers"
//! command = "curl -sk https://localhost/healthz"
//! expect_contains = ["ok"]
//! expect_absent = ["error"]
//! ```
//!
//! Steps run in order through [`ResilientRunner`]; the first failure stops
//! the run.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::errors::RemoteError;
use crate::resilient::ResilientRunner;
use crate::transport::Transport;

fn default_privileged() -> bool {
    true
}

/// One named remote command and the assertions on its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub command: String,
    #[serde(default = "default_privileged")]
    pub privileged: bool,
    /// Every entry must appear in stdout.
    #[serde(default)]
    pub expect_contains: Vec<String>,
    /// No entry may appear in stdout.
    #[serde(default)]
    pub expect_absent: Vec<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            privileged: true,
            expect_contains: Vec::new(),
            expect_absent: Vec::new(),
        }
    }

    pub fn expecting(mut self, text: impl Into<String>) -> Self {
        self.expect_contains.push(text.into());
        self
    }

    pub fn rejecting(mut self, text: impl Into<String>) -> Self {
        self.expect_absent.push(text.into());
        self
    }

    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }

    /// Check `output` against this step's expectations.
    pub fn check_output(&self, output: &str) -> Result<(), StepError> {
        if let Some(missing) = self
            .expect_contains
            .iter()
            .find(|expected| !output.contains(expected.as_str()))
        {
            return Err(StepError::MissingOutput {
                step: self.name.clone(),
                expected: missing.clone(),
            });
        }
        if let Some(found) = self
            .expect_absent
            .iter()
            .find(|unwanted| output.contains(unwanted.as_str()))
        {
            return Err(StepError::UnexpectedOutput {
                step: self.name.clone(),
                found: found.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to read step file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse step file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("step file {0} defines no steps")]
    Empty(PathBuf),

    #[error("step '{step}' failed: {source}")]
    Remote {
        step: String,
        #[source]
        source: RemoteError,
    },

    #[error("step '{step}': expected output to contain '{expected}'")]
    MissingOutput { step: String, expected: String },

    #[error("step '{step}': output contains unexpected '{found}'")]
    UnexpectedOutput { step: String, found: String },
}

impl StepError {
    /// Name of the failing step, if the failure belongs to one.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Remote { step, .. }
            | Self::MissingOutput { step, .. }
            | Self::UnexpectedOutput { step, .. } => Some(step),
            Self::Read { .. } | Self::Parse { .. } | Self::Empty(_) => None,
        }
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFile {
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

impl StepFile {
    pub fn parse(contents: &str, path: &Path) -> Result<Self, StepError> {
        let file: Self = toml::from_str(contents).map_err(|source| StepError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if file.steps.is_empty() {
            return Err(StepError::Empty(path.to_path_buf()));
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self, StepError> {
        let contents = std::fs::read_to_string(path).map_err(|source| StepError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Result of one passed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub attempts: u32,
    pub duration: Duration,
    pub output: String,
}

/// Run `steps` in order, stopping at the first failure.
pub async fn run_steps<T: Transport>(
    runner: &ResilientRunner<T>,
    steps: &StepFile,
) -> Result<Vec<StepReport>, StepError> {
    let total = steps.len();
    let mut reports = Vec::with_capacity(total);

    for (index, step) in steps.steps.iter().enumerate() {
        info!(step = %step.name, index = index + 1, total, "Running step");
        let started = Instant::now();
        let outcome = runner.invoke(&step.command, step.privileged).await;
        let attempts = outcome.attempts();

        let output = outcome.into_result().map_err(|source| {
            error!(step = %step.name, error = %source, "Step failed");
            StepError::Remote {
                step: step.name.clone(),
                source,
            }
        })?;

        if let Err(e) = step.check_output(&output) {
            error!(step = %step.name, error = %e, "Step assertion failed");
            return Err(e);
        }

        let duration = started.elapsed();
        info!(
            step = %step.name,
            attempts,
            elapsed = %display_elapsed(duration),
            "Step passed"
        );
        reports.push(StepReport {
            name: step.name.clone(),
            attempts,
            duration,
            output,
        });
    }

    Ok(reports)
}

/// Human-readable duration rounded down to whole milliseconds.
fn display_elapsed(duration: Duration) -> String {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_millis(millis)).to_string()
}
