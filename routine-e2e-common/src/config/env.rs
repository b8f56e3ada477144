//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `ROUTINE_` environment variables with
//! validation, error collection, and source tracking. Values missing from
//! the process environment fall back to the dotenv overlay, then to the
//! default.

use super::source::{ConfigSource, Sourced};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
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
    dotenv: HashMap<String, String>,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the ROUTINE_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "ROUTINE_",
            dotenv: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Consult `vars` for variables the process environment does not set.
    pub fn with_dotenv(mut self, vars: HashMap<String, String>) -> Self {
        self.dotenv = vars;
        self
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Raw value and its origin; the process environment wins.
    fn lookup(&self, name: &str) -> Option<(String, String, ConfigSource)> {
        let var_name = self.var_name(name);
        if let Ok(value) = env::var(&var_name) {
            return Some((value, var_name, ConfigSource::Environment));
        }
        let value = self.dotenv.get(&var_name)?.clone();
        Some((value, var_name, ConfigSource::DotEnv))
    }

    fn sourced<T>(value: T, var_name: String, source: ConfigSource) -> Sourced<T> {
        match source {
            ConfigSource::DotEnv => Sourced::from_dotenv(value, var_name),
            _ => Sourced::from_env(value, var_name),
        }
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        match self.lookup(name) {
            Some((value, var_name, source)) => Self::sourced(value, var_name, source),
            None => Sourced::default_value(default.to_string()),
        }
    }

    /// Get an optional string (None if not set or blank).
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        match self.lookup(name) {
            Some((value, var_name, source)) if value.trim().is_empty() => {
                Self::sourced(None, var_name, source)
            }
            Some((value, var_name, source)) => Self::sourced(Some(value), var_name, source),
            None => Sourced::default_value(None),
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        match self.lookup(name) {
            Some((value, var_name, source)) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Self::sourced(parsed, var_name, source)
            }
            None => Sourced::default_value(default),
        }
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        match self.lookup(name) {
            Some((value, var_name, source)) => match value.trim().parse::<u64>() {
                Ok(n) if n >= min && n <= max => Self::sourced(n, var_name, source),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Self::sourced(default, var_name, source)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "unsigned 64-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            None => Sourced::default_value(default),
        }
    }

    /// Get an optional u64 (None if not set or blank).
    pub fn get_optional_u64(&mut self, name: &str) -> Sourced<Option<u64>> {
        match self.lookup(name) {
            Some((value, var_name, source)) if value.trim().is_empty() => {
                Self::sourced(None, var_name, source)
            }
            Some((value, var_name, source)) => match value.trim().parse::<u64>() {
                Ok(n) => Self::sourced(Some(n), var_name, source),
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "unsigned 64-bit integer".to_string(),
                        value,
                    });
                    Sourced::default_value(None)
                }
            },
            None => Sourced::default_value(None),
        }
    }

    /// Get any `FromStr` value; `expected` describes valid input in errors.
    pub fn get_parsed<T: FromStr>(&mut self, name: &str, default: T, expected: &str) -> Sourced<T> {
        match self.lookup(name) {
            Some((value, var_name, source)) => match value.parse::<T>() {
                Ok(parsed) => Self::sourced(parsed, var_name, source),
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: expected.to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            None => Sourced::default_value(default),
        }
    }

    /// Get a path value.
    pub fn get_path(&mut self, name: &str, default: &str) -> Sourced<PathBuf> {
        match self.lookup(name) {
            Some((value, var_name, source)) if !value.trim().is_empty() => {
                Self::sourced(PathBuf::from(value.trim()), var_name, source)
            }
            _ => Sourced::default_value(PathBuf::from(default)),
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        match self.lookup(name) {
            Some((value, var_name, source)) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Self::sourced(lower, var_name, source)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Self::sourced(default.to_string(), var_name, source)
                    }
                }
            }
            None => Sourced::default_value(default.to_string()),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;
    use proptest::prelude::*;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: Tests are serialized via env_test_lock
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests are serialized via env_test_lock
        unsafe { env::set_var(key, value) };
    }

    fn parse_bool_string(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => None,
        }
    }

    #[test]
    fn test_get_bool_true_values() {
        let _guard = env_test_lock();
        let vars = ["ROUTINE_TEST_BOOL_TRUE"];
        cleanup_env(&vars);

        for val in &["1", "true", "yes", "on", "TRUE", "Yes"] {
            set_env("ROUTINE_TEST_BOOL_TRUE", val);
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
        let vars = ["ROUTINE_BAD_BOOL"];
        cleanup_env(&vars);

        set_env("ROUTINE_BAD_BOOL", "maybe");
        let mut parser = EnvParser::new();
        let result = parser.get_bool("BAD_BOOL", false);
        assert!(!result.value);
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u64_range_out_of_range() {
        let _guard = env_test_lock();
        let vars = ["ROUTINE_TEST_U64_OOR"];
        cleanup_env(&vars);

        set_env("ROUTINE_TEST_U64_OOR", "200");
        let mut parser = EnvParser::new();
        let result = parser.get_u64_range("TEST_U64_OOR", 10, 0, 100);
        assert_eq!(result.value, 10); // Uses default
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_u64() {
        let _guard = env_test_lock();
        let vars = ["ROUTINE_TEST_OPT_U64"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_optional_u64("TEST_OPT_U64").value, None);

        set_env("ROUTINE_TEST_OPT_U64", " 42 ");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_optional_u64("TEST_OPT_U64").value, Some(42));

        set_env("ROUTINE_TEST_OPT_U64", "forty-two");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_optional_u64("TEST_OPT_U64").value, None);
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_log_level_invalid() {
        let _guard = env_test_lock();
        let vars = ["ROUTINE_TEST_LOG_LEVEL"];
        cleanup_env(&vars);

        set_env("ROUTINE_TEST_LOG_LEVEL", "verbose");
        let mut parser = EnvParser::new();
        let result = parser.get_log_level("TEST_LOG_LEVEL", "info");
        assert!(parser.has_errors());
        assert_eq!(result.value, "info");

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_string() {
        let _guard = env_test_lock();
        let vars = ["ROUTINE_TEST_OPT"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert!(parser.get_optional_string("TEST_OPT").value.is_none());

        set_env("ROUTINE_TEST_OPT", "  ");
        let mut parser = EnvParser::new();
        assert!(parser.get_optional_string("TEST_OPT").value.is_none());

        set_env("ROUTINE_TEST_OPT", "value");
        let mut parser = EnvParser::new();
        let result = parser.get_optional_string("TEST_OPT");
        assert_eq!(result.value, Some("value".to_string()));

        cleanup_env(&vars);
    }

    #[test]
    fn test_source_tracking() {
        let _guard = env_test_lock();
        let vars = ["ROUTINE_TEST_SRC"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.source, ConfigSource::Default);
        assert!(result.env_var.is_none());

        let dotenv = HashMap::from([("ROUTINE_TEST_SRC".to_string(), "from_file".to_string())]);
        let mut parser = EnvParser::new().with_dotenv(dotenv.clone());
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.value, "from_file");
        assert_eq!(result.source, ConfigSource::DotEnv);

        // Process environment wins over the file.
        set_env("ROUTINE_TEST_SRC", "from_env");
        let mut parser = EnvParser::new().with_dotenv(dotenv);
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.value, "from_env");
        assert_eq!(result.source, ConfigSource::Environment);
        assert_eq!(result.env_var.as_deref(), Some("ROUTINE_TEST_SRC"));

        cleanup_env(&vars);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_env_parser_get_bool(value in "[a-zA-Z0-9_-]{0,20}") {
            let _guard = env_test_lock();
            let var = "ROUTINE_PROPTEST_BOOL";
            cleanup_env(&[var]);

            set_env(var, &value);
            let mut parser = EnvParser::new();
            let result = parser.get_bool("PROPTEST_BOOL", false);
            prop_assert!(result.value == parse_bool_string(&value).unwrap_or(false));

            cleanup_env(&[var]);
        }

        #[test]
        fn test_env_parser_get_u64_range(value in "[-0-9a-zA-Z.]{0,30}") {
            let _guard = env_test_lock();
            let var = "ROUTINE_PROPTEST_U64";
            cleanup_env(&[var]);

            set_env(var, &value);
            let mut parser = EnvParser::new();
            let result = parser.get_u64_range("PROPTEST_U64", 50, 0, 100);

            match value.parse::<u64>().ok() {
                Some(n) if n <= 100 => prop_assert_eq!(result.value, n),
                _ => prop_assert_eq!(result.value, 50),
            }

            cleanup_env(&[var]);
        }
    }
}
