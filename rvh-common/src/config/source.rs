//! Tracking where a configuration value came from.

use std::fmt;

use tracing::debug;

/// Origin of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Set through an environment variable.
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment => write!(f, "environment"),
        }
    }
}

/// A value together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Name of the environment variable, when `source` is `Environment`.
    pub var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            var: None,
        }
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            var: Some(var.into()),
        }
    }

    pub fn is_from_env(&self) -> bool {
        self.source == ConfigSource::Environment
    }

    /// The value if it came from the environment.
    pub fn env_override(self) -> Option<T> {
        if !self.is_from_env() {
            return None;
        }
        if let Some(var) = &self.var {
            debug!(var = %var, source = %self.source, "Configuration value overridden");
        }
        Some(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_only_for_env_values() {
        assert_eq!(Sourced::from_env(5u32, "RVH_X").env_override(), Some(5));
        assert_eq!(Sourced::default_value(5u32).env_override(), None);
        assert_eq!(ConfigSource::Environment.to_string(), "environment");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
