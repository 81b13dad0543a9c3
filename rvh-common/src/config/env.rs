//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `RVH_` environment variables with
//! validation, error collection, and source tracking.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the RVH_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "RVH_",
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Record an error found while interpreting a value.
    pub fn push_error(&mut self, error: EnvError) {
        self.errors.push(error);
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        return Sourced::default_value(default);
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u32>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::default_value(default)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned 32-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<u64>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::default_value(default)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned 64-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a path value with ~ expansion.
    pub fn get_optional_path(&mut self, name: &str) -> Sourced<Option<PathBuf>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if !value.is_empty() => Sourced::from_env(Some(expand_home(&value)), var_name),
            _ => Sourced::default_value(None),
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Sourced::from_env(lower, var_name)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Sourced::default_value(default.to_string())
                    }
                }
            }
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get a comma-separated list of strings.
    pub fn get_string_list(&mut self, name: &str, default: Vec<String>) -> Sourced<Vec<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(Vec::new(), var_name),
            Ok(value) => {
                let items: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Sourced::from_env(items, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(value)
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: Tests hold the env lock, no concurrent access to env vars
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests hold the env lock, no concurrent access to env vars
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn test_get_bool_true_values() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_BOOL_TRUE"];
        cleanup_env(&vars);

        for val in &["1", "true", "yes", "on", "TRUE", "Yes"] {
            set_env("RVH_TEST_BOOL_TRUE", val);
            let mut parser = EnvParser::new();
            let result = parser.get_bool("TEST_BOOL_TRUE", false);
            assert!(result.value, "Expected true for '{}'", val);
            assert!(!parser.has_errors());
        }

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_bool_invalid_uses_default() {
        let _guard = env_test_lock();
        let vars = ["RVH_BAD_BOOL"];
        cleanup_env(&vars);

        set_env("RVH_BAD_BOOL", "maybe");
        let mut parser = EnvParser::new();
        let result = parser.get_bool("BAD_BOOL", false);
        assert!(!result.value);
        assert!(!result.is_from_env());
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u32_range_out_of_range() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_U32_OOR"];
        cleanup_env(&vars);

        set_env("RVH_TEST_U32_OOR", "200");
        let mut parser = EnvParser::new();
        let result = parser.get_u32_range("TEST_U32_OOR", 3, 1, 100);
        assert_eq!(result.value, 3);
        assert!(matches!(parser.errors()[0], EnvError::OutOfRange { .. }));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u64_range_valid() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_U64"];
        cleanup_env(&vars);

        set_env("RVH_TEST_U64", "50");
        let mut parser = EnvParser::new();
        let result = parser.get_u64_range("TEST_U64", 10, 0, 100);
        assert_eq!(result.value, 50);
        assert_eq!(result.var.as_deref(), Some("RVH_TEST_U64"));
        assert!(!parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u64_not_a_number() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_U64_NAN"];
        cleanup_env(&vars);

        set_env("RVH_TEST_U64_NAN", "lots");
        let mut parser = EnvParser::new();
        let result = parser.get_u64_range("TEST_U64_NAN", 10, 0, 100);
        assert_eq!(result.value, 10);
        let errors = parser.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("RVH_TEST_U64_NAN"));
        assert!(!parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_log_level() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_LEVEL"];
        cleanup_env(&vars);

        set_env("RVH_TEST_LEVEL", "DEBUG");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_log_level("TEST_LEVEL", "info").value, "debug");

        set_env("RVH_TEST_LEVEL", "loud");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_log_level("TEST_LEVEL", "info").value, "info");
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_string_list_trims_and_drops_empty() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_LIST"];
        cleanup_env(&vars);

        set_env("RVH_TEST_LIST", "i/o timeout, connection reset ,,");
        let mut parser = EnvParser::new();
        let result = parser.get_string_list("TEST_LIST", Vec::new());
        assert_eq!(result.value, vec!["i/o timeout", "connection reset"]);

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_string_and_path() {
        let _guard = env_test_lock();
        let vars = ["RVH_TEST_OPT", "RVH_TEST_PATH"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert!(parser.get_optional_string("TEST_OPT").value.is_none());
        assert!(parser.get_optional_path("TEST_PATH").value.is_none());

        set_env("RVH_TEST_OPT", "10.0.0.4");
        set_env("RVH_TEST_PATH", "/tmp/private_key");
        let mut parser = EnvParser::new();
        assert_eq!(
            parser.get_optional_string("TEST_OPT").value.as_deref(),
            Some("10.0.0.4")
        );
        assert_eq!(
            parser.get_optional_path("TEST_PATH").value,
            Some(PathBuf::from("/tmp/private_key"))
        );

        set_env("RVH_TEST_PATH", "");
        let mut parser = EnvParser::new();
        let empty = parser.get_optional_path("TEST_PATH");
        assert!(empty.value.is_none());
        assert!(!empty.is_from_env());

        cleanup_env(&vars);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/key"), PathBuf::from("/abs/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.ssh/id_ed25519"), home.join(".ssh/id_ed25519"));
        }
    }
}
