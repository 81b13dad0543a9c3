//! Configuration system for rvh.
//!
//! Values are resolved in three layers: built-in defaults, then the TOML
//! config file, then `RVH_*` environment variables. Environment parsing
//! collects every problem before failing so all of them can be reported at
//! once.

pub mod env;
pub mod source;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::resilient::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BACKOFF, RetryPolicy,
    TRANSIENT_MARKER,
};
use crate::scratch_log::{DEFAULT_SCRATCH_LOG, ScratchLog};
use crate::session::{DEFAULT_PORT, DEFAULT_USER, PrivilegeMode, RemoteSession};
use crate::transfer::DEFAULT_CHUNK_SIZE;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

const MIB: u64 = 1024 * 1024;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment configuration: {}", format_env_errors(.0))]
    Environment(Vec<EnvError>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// `[session]`: which host to talk to and as whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    /// Run commands through sudo unless a caller opts out.
    pub privileged: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            identity_file: None,
            privileged: true,
        }
    }
}

/// `[invocation]`: retry and progress polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    pub max_attempts: u32,
    pub poll_interval_secs: u64,
    pub retry_backoff_secs: u64,
    pub scratch_log: String,
    pub transient_markers: Vec<String>,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF.as_secs(),
            scratch_log: DEFAULT_SCRATCH_LOG.to_string(),
            transient_markers: vec![TRANSIENT_MARKER.to_string()],
        }
    }
}

/// `[transfer]`: chunking and remote file permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub chunk_size_mib: u64,
    /// Octal permission string applied to each pushed chunk.
    pub file_mode: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_mib: DEFAULT_CHUNK_SIZE / MIB,
            file_mode: "0644".to_string(),
        }
    }
}

/// Host key checking policy for the system ssh client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownHostsPolicy {
    #[default]
    Strict,
    Add,
    Accept,
}

impl std::str::FromStr for KnownHostsPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "add" => Ok(Self::Add),
            "accept" => Ok(Self::Accept),
            other => Err(ConfigError::Invalid(format!(
                "unknown known_hosts policy '{other}' (expected strict, add or accept)"
            ))),
        }
    }
}

/// `[ssh]`: transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub connect_timeout_secs: u64,
    pub known_hosts: KnownHostsPolicy,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            known_hosts: KnownHostsPolicy::default(),
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub session: SessionConfig,
    pub invocation: InvocationConfig,
    pub transfer: TransferConfig,
    pub ssh: SshConfig,
}

/// Default config file location: `<config_dir>/rvh/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rvh").join("config.toml"))
}

impl HarnessConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Resolve defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist. The default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.is_file() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        debug!(host = %config.session.host, "Configuration loaded");
        Ok(config)
    }

    /// Apply `RVH_*` overrides in place.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut parser = EnvParser::new();

        if let Some(host) = parser.get_optional_string("HOST").env_override().flatten() {
            self.session.host = host;
        }
        if let Some(port) = parser
            .get_u32_range("PORT", u32::from(self.session.port), 1, u32::from(u16::MAX))
            .env_override()
        {
            self.session.port = u16::try_from(port).unwrap_or(DEFAULT_PORT);
        }
        if let Some(user) = parser.get_optional_string("USER").env_override().flatten() {
            self.session.user = user;
        }
        if let Some(key) = parser.get_optional_path("IDENTITY_FILE").env_override() {
            self.session.identity_file = key;
        }
        if let Some(privileged) = parser
            .get_bool("PRIVILEGED", self.session.privileged)
            .env_override()
        {
            self.session.privileged = privileged;
        }

        if let Some(attempts) = parser
            .get_u32_range("MAX_ATTEMPTS", self.invocation.max_attempts, 1, 100)
            .env_override()
        {
            self.invocation.max_attempts = attempts;
        }
        if let Some(secs) = parser
            .get_u64_range("POLL_INTERVAL_SECS", self.invocation.poll_interval_secs, 1, 3600)
            .env_override()
        {
            self.invocation.poll_interval_secs = secs;
        }
        if let Some(secs) = parser
            .get_u64_range("RETRY_BACKOFF_SECS", self.invocation.retry_backoff_secs, 0, 3600)
            .env_override()
        {
            self.invocation.retry_backoff_secs = secs;
        }
        if let Some(path) = parser
            .get_string("SCRATCH_LOG", &self.invocation.scratch_log)
            .env_override()
        {
            self.invocation.scratch_log = path;
        }
        if let Some(markers) = parser
            .get_string_list("TRANSIENT_MARKERS", self.invocation.transient_markers.clone())
            .env_override()
        {
            self.invocation.transient_markers = markers;
        }

        if let Some(mib) = parser
            .get_u64_range("CHUNK_SIZE_MIB", self.transfer.chunk_size_mib, 1, 1024 * 1024)
            .env_override()
        {
            self.transfer.chunk_size_mib = mib;
        }
        if let Some(mode) = parser
            .get_string("FILE_MODE", &self.transfer.file_mode)
            .env_override()
        {
            self.transfer.file_mode = mode;
        }

        if let Some(secs) = parser
            .get_u64_range("CONNECT_TIMEOUT_SECS", self.ssh.connect_timeout_secs, 1, 600)
            .env_override()
        {
            self.ssh.connect_timeout_secs = secs;
        }
        if let Some(policy) = parser.get_optional_string("KNOWN_HOSTS").env_override().flatten() {
            match policy.parse() {
                Ok(policy) => self.ssh.known_hosts = policy,
                Err(_) => parser_error(&mut parser, "RVH_KNOWN_HOSTS", "strict|add|accept", &policy),
            }
        }

        if parser.has_errors() {
            return Err(ConfigError::Environment(parser.take_errors()));
        }
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.invocation.max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "invocation.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.invocation.poll_interval_secs < 1 {
            return Err(ConfigError::Invalid(
                "invocation.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.transfer.chunk_size_mib < 1 {
            return Err(ConfigError::Invalid(
                "transfer.chunk_size_mib must be at least 1".to_string(),
            ));
        }
        if self.invocation.scratch_log.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "invocation.scratch_log must not be empty".to_string(),
            ));
        }
        self.file_mode()?;
        Ok(())
    }

    /// Ensure a host is configured before connecting.
    pub fn require_host(&self) -> Result<&str, ConfigError> {
        let host = self.session.host.trim();
        if host.is_empty() {
            return Err(ConfigError::Invalid(
                "session.host is not set (use the config file or RVH_HOST)".to_string(),
            ));
        }
        Ok(host)
    }

    pub fn remote_session(&self) -> Result<RemoteSession, ConfigError> {
        let host = self.require_host()?;
        let privilege = if self.session.privileged {
            PrivilegeMode::Sudo
        } else {
            PrivilegeMode::Plain
        };
        let mut session = RemoteSession::new(host)
            .with_user(self.session.user.clone())
            .with_port(self.session.port)
            .with_privilege(privilege);
        if let Some(key) = &self.session.identity_file {
            session = session.with_identity_file(key);
        }
        Ok(session)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.invocation.max_attempts,
            poll_interval: Duration::from_secs(self.invocation.poll_interval_secs),
            backoff: Duration::from_secs(self.invocation.retry_backoff_secs),
            transient_markers: self.invocation.transient_markers.clone(),
        }
    }

    pub fn scratch_log(&self) -> ScratchLog {
        ScratchLog::new(self.invocation.scratch_log.clone())
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.transfer.chunk_size_mib.saturating_mul(MIB)
    }

    pub fn file_mode(&self) -> Result<u32, ConfigError> {
        parse_file_mode(&self.transfer.file_mode)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }
}

fn parser_error(parser: &mut EnvParser, var: &str, expected: &str, value: &str) {
    parser.push_error(EnvError::InvalidValue {
        var: var.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    });
}

/// Parse an octal permission string such as `0644` or `755`.
pub fn parse_file_mode(mode: &str) -> Result<u32, ConfigError> {
    let trimmed = mode.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    match u32::from_str_radix(digits, 8) {
        Ok(value) if !digits.is_empty() && value <= 0o7777 => Ok(value),
        _ => Err(ConfigError::Invalid(format!(
            "file mode '{mode}' is not an octal permission value"
        ))),
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    const ALL_VARS: &[&str] = &[
        "RVH_HOST",
        "RVH_PORT",
        "RVH_USER",
        "RVH_IDENTITY_FILE",
        "RVH_PRIVILEGED",
        "RVH_MAX_ATTEMPTS",
        "RVH_POLL_INTERVAL_SECS",
        "RVH_RETRY_BACKOFF_SECS",
        "RVH_SCRATCH_LOG",
        "RVH_TRANSIENT_MARKERS",
        "RVH_CHUNK_SIZE_MIB",
        "RVH_FILE_MODE",
        "RVH_CONNECT_TIMEOUT_SECS",
        "RVH_KNOWN_HOSTS",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            // SAFETY: Tests hold the env lock, no concurrent access to env vars
            unsafe { std::env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests hold the env lock, no concurrent access to env vars
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.session.port, 22);
        assert_eq!(config.session.user, "ubuntu");
        assert!(config.session.privileged);
        assert_eq!(config.invocation.max_attempts, 3);
        assert_eq!(config.invocation.poll_interval_secs, 10);
        assert_eq!(config.invocation.retry_backoff_secs, 3);
        assert_eq!(config.invocation.scratch_log, "/tmp/rvh-ssh.log");
        assert_eq!(config.invocation.transient_markers, vec!["i/o timeout"]);
        assert_eq!(config.transfer.chunk_size_mib, 500);
        assert_eq!(config.chunk_size_bytes(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.file_mode().unwrap(), 0o644);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
[session]
host = "10.0.0.4"
identity_file = "/keys/private_key"

[transfer]
chunk_size_mib = 64
file_mode = "0600"

[ssh]
known_hosts = "accept"
"#;
        let config = HarnessConfig::from_toml_str(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.session.host, "10.0.0.4");
        assert_eq!(config.session.user, "ubuntu");
        assert_eq!(config.invocation.max_attempts, 3);
        assert_eq!(config.chunk_size_bytes(), 64 * MIB);
        assert_eq!(config.file_mode().unwrap(), 0o600);
        assert_eq!(config.ssh.known_hosts, KnownHostsPolicy::Accept);

        let session = config.remote_session().unwrap();
        assert_eq!(session.destination(), "ubuntu@10.0.0.4");
        assert_eq!(session.identity_file.as_deref(), Some(Path::new("/keys/private_key")));
    }

    #[test]
    fn test_bad_toml_reports_path() {
        let err = HarnessConfig::from_toml_str("[session\nhost=", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let _guard = env_test_lock();
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[invocation]\nmax_attempts = 5\n").unwrap();

        let config = HarnessConfig::load(Some(&path)).unwrap();
        assert_eq!(config.invocation.max_attempts, 5);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let _guard = env_test_lock();
        clear_env();

        let err = HarnessConfig::load(Some(Path::new("/nonexistent/rvh.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let _guard = env_test_lock();
        clear_env();

        set_env("RVH_HOST", "192.168.1.20");
        set_env("RVH_PORT", "2222");
        set_env("RVH_PRIVILEGED", "false");
        set_env("RVH_MAX_ATTEMPTS", "4");
        set_env("RVH_TRANSIENT_MARKERS", "i/o timeout,connection reset");
        set_env("RVH_CHUNK_SIZE_MIB", "1");
        set_env("RVH_KNOWN_HOSTS", "add");

        let mut config = HarnessConfig::default();
        config.apply_env().unwrap();
        clear_env();

        assert_eq!(config.session.host, "192.168.1.20");
        assert_eq!(config.session.port, 2222);
        assert!(!config.session.privileged);
        assert_eq!(config.invocation.max_attempts, 4);
        assert_eq!(
            config.invocation.transient_markers,
            vec!["i/o timeout", "connection reset"]
        );
        assert_eq!(config.chunk_size_bytes(), MIB);
        assert_eq!(config.ssh.known_hosts, KnownHostsPolicy::Add);
        assert_eq!(
            config.remote_session().unwrap().privilege,
            PrivilegeMode::Plain
        );
    }

    #[test]
    fn test_env_errors_are_collected() {
        let _guard = env_test_lock();
        clear_env();

        set_env("RVH_MAX_ATTEMPTS", "0");
        set_env("RVH_PRIVILEGED", "sometimes");
        set_env("RVH_KNOWN_HOSTS", "whatever");

        let mut config = HarnessConfig::default();
        let err = config.apply_env().unwrap_err();
        clear_env();

        match err {
            ConfigError::Environment(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected environment error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarnessConfig::default();
        config.invocation.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.invocation.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.transfer.chunk_size_mib = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.transfer.file_mode = "rw-r--r--".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_host() {
        let config = HarnessConfig::default();
        assert!(config.require_host().is_err());
        assert!(config.remote_session().is_err());
    }

    #[test]
    fn test_parse_file_mode() {
        assert_eq!(parse_file_mode("0644").unwrap(), 0o644);
        assert_eq!(parse_file_mode("755").unwrap(), 0o755);
        assert_eq!(parse_file_mode("0o600").unwrap(), 0o600);
        assert!(parse_file_mode("").is_err());
        assert!(parse_file_mode("0999").is_err());
        assert!(parse_file_mode("17777").is_err());
    }
}
