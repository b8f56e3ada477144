//! Source tracking for configuration values.

use serde::Serialize;
use std::fmt;

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Process environment.
    Environment,
    /// `.e2e.env` file.
    DotEnv,
    /// Command-line flag.
    Cli,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment => write!(f, "environment"),
            Self::DotEnv => write!(f, "dotenv"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

/// A value together with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Variable the value was read from, if any.
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    pub fn from_env(value: T, env_var: String) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(env_var),
        }
    }

    pub fn from_dotenv(value: T, env_var: String) -> Self {
        Self {
            value,
            source: ConfigSource::DotEnv,
            env_var: Some(env_var),
        }
    }

    pub fn from_cli(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Cli,
            env_var: None,
        }
    }

    /// Keep the origin, replace the value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
            env_var: self.env_var,
        }
    }

    /// Replace with a CLI value when one was given.
    pub fn override_with(&mut self, value: Option<T>) {
        if let Some(value) = value {
            *self = Self::from_cli(value);
        }
    }
}

impl<T: fmt::Display> fmt::Display for Sourced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "{} (from {} {})", self.value, self.source, var),
            None => write!(f, "{} (from {})", self.value, self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_with() {
        let mut value = Sourced::default_value(3u64);
        value.override_with(None);
        assert_eq!(value.source, ConfigSource::Default);
        value.override_with(Some(9));
        assert_eq!(value.value, 9);
        assert_eq!(value.source, ConfigSource::Cli);
    }

    #[test]
    fn test_display_names_variable() {
        let value = Sourced::from_env(5u32, "ROUTINE_E2E_SEED".to_string());
        assert_eq!(value.to_string(), "5 (from environment ROUTINE_E2E_SEED)");
        let value = Sourced::default_value("x");
        assert_eq!(value.to_string(), "x (from default)");
    }
}
