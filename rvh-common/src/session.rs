//! Connection parameters for the single remote host under validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default SSH user for freshly provisioned hosts.
pub const DEFAULT_USER: &str = "ubuntu";

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Whether commands are escalated with `sudo` by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMode {
    /// Run as `sudo bash -c '...'`.
    #[default]
    Sudo,
    /// Run as `bash -c '...'`.
    Plain,
}

impl PrivilegeMode {
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Sudo)
    }
}

impl fmt::Display for PrivilegeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sudo => write!(f, "sudo"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

/// One remote host and the credentials used to reach it.
///
/// Built once by whoever provisioned the host and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    /// Hostname or IP address.
    pub address: String,
    /// SSH port.
    pub port: u16,
    /// SSH user name.
    pub user: String,
    /// Private key used to authenticate, if not left to the SSH agent.
    pub identity_file: Option<PathBuf>,
    /// Default privilege mode for commands run through this session.
    pub privilege: PrivilegeMode,
}

impl RemoteSession {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            identity_file: None,
            privilege: PrivilegeMode::default(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_identity_file(mut self, path: impl AsRef<Path>) -> Self {
        self.identity_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_privilege(mut self, privilege: PrivilegeMode) -> Self {
        self.privilege = privilege;
        self
    }

    /// `user@address` as passed to ssh.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

impl fmt::Display for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.destination(), self.port)
    }
}
