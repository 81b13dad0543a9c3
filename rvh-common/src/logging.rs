//! Logging initialization.
//!
//! Console output goes to stdout or stderr in text or JSON form; an optional
//! log file is written through a non-blocking appender whose guard must be
//! held until shutdown.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{EnvError, EnvParser};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("log file path {0} has no file name")]
    FilePath(PathBuf),

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `rvh=debug,warn`.
    pub level: String,
    pub format: LogFormat,
    /// Optional log file, appended to.
    pub file: Option<PathBuf>,
    /// Write console output to stderr instead of stdout.
    pub stderr: bool,
    /// Rejected environment values, reported once logging is up.
    pub env_warnings: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
            stderr: false,
            env_warnings: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Read `RVH_LOG_LEVEL`, `RVH_LOG_FORMAT` and `RVH_LOG_FILE`.
    ///
    /// Invalid values fall back to the defaults and are kept in
    /// [`LogConfig::env_warnings`] until [`init_logging`] can report them.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level).value;
        let raw_format = parser.get_string("LOG_FORMAT", "text");
        let format = match LogFormat::parse(&raw_format.value) {
            Some(format) => format,
            None => {
                parser.push_error(EnvError::InvalidValue {
                    var: raw_format.var.unwrap_or_else(|| "RVH_LOG_FORMAT".to_string()),
                    expected: "text or json".to_string(),
                    value: raw_format.value,
                });
                LogFormat::default()
            }
        };
        let file = parser.get_optional_path("LOG_FILE").value;
        Self {
            level,
            format,
            file,
            stderr: false,
            env_warnings: parser.take_errors().iter().map(ToString::to_string).collect(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            filter: self.level.clone(),
            message: e.to_string(),
        })
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Default)]
pub struct LoggingGuards {
    file: Option<WorkerGuard>,
}

impl LoggingGuards {
    pub fn has_file_writer(&self) -> bool {
        self.file.is_some()
    }
}

fn console_layer(config: &LogConfig) -> BoxedLayer {
    match (config.format, config.stderr) {
        (LogFormat::Text, false) => fmt::layer().with_target(true).boxed(),
        (LogFormat::Text, true) => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Json, false) => fmt::layer().json().with_target(true).boxed(),
        (LogFormat::Json, true) => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError> {
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::FilePath(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = config.filter()?;
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];
    let mut guards = LoggingGuards::default();

    if let Some(path) = &config.file {
        let (dir, name) = split_log_path(path)?;
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        );
        guards.file = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    for warning in &config.env_warnings {
        warn!("{warning}, using default");
    }

    Ok(guards)
}
