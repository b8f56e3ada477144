//! Run configuration.
//!
//! Values come from (highest precedence first) command-line flags, the
//! process environment, the `.e2e.env` file and built-in defaults. Every
//! value remembers its origin for the startup log.

pub mod dotenv;
pub mod env;
pub mod source;

pub use dotenv::{DEFAULT_DOTENV_FILE, load_dotenv, parse_dotenv};
pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::poll::Timeouts;
use crate::report::DEFAULT_RESULTS_PATH;
use crate::runner::CoverageMode;

/// Application URL used when `ROUTINE_BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://mercury/routine_app/";

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    DotEnv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<EnvError>),
}

/// Everything a run needs from its environment.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: Sourced<String>,
    pub session_cookie: Sourced<Option<String>>,
    /// Allocation seed; a fresh one is drawn when unset.
    pub seed: Sourced<Option<u64>>,
    pub results_path: Sourced<PathBuf>,
    pub log_level: Sourced<String>,
    pub action_timeout_ms: Sourced<u64>,
    pub settle_timeout_ms: Sourced<u64>,
    pub coverage: Sourced<CoverageMode>,
    pub headless: Sourced<bool>,
}

/// Ensure the URL ends with exactly one `/` so relative navigation works.
pub fn normalize_base_url(url: &str) -> String {
    format!("{}/", url.trim().trim_end_matches('/'))
}

impl RunConfig {
    /// Load from the environment, consulting `dotenv_path` for unset variables.
    pub fn load(dotenv_path: &Path) -> Result<Self, ConfigError> {
        let vars = load_dotenv(dotenv_path).map_err(|source| ConfigError::DotEnv {
            path: dotenv_path.to_path_buf(),
            source,
        })?;
        Self::from_parser(EnvParser::new().with_dotenv(vars))
    }

    pub fn from_parser(mut parser: EnvParser) -> Result<Self, ConfigError> {
        let config = Self {
            base_url: parser
                .get_string("BASE_URL", DEFAULT_BASE_URL)
                .map(|url| normalize_base_url(&url)),
            session_cookie: parser.get_optional_string("SESSION_COOKIE"),
            seed: parser.get_optional_u64("E2E_SEED"),
            results_path: parser.get_path("RESULTS_PATH", DEFAULT_RESULTS_PATH),
            log_level: parser.get_log_level("LOG_LEVEL", "info"),
            action_timeout_ms: parser.get_u64_range("ACTION_TIMEOUT_MS", 10_000, 100, 600_000),
            settle_timeout_ms: parser.get_u64_range("SETTLE_TIMEOUT_MS", 30_000, 100, 600_000),
            coverage: parser.get_parsed("COVERAGE", CoverageMode::Enforce, "enforce|report"),
            headless: parser.get_bool("HEADLESS", true),
        };
        if parser.has_errors() {
            return Err(ConfigError::Invalid(parser.take_errors()));
        }
        Ok(config)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            action: Duration::from_millis(self.action_timeout_ms.value),
            settle: Duration::from_millis(self.settle_timeout_ms.value),
            ..Timeouts::default()
        }
    }

    /// The configured seed, or a random one.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.value.unwrap_or_else(|| fastrand::u64(..))
    }

    /// Log where each value came from; the cookie value is never printed.
    pub fn log_sources(&self) {
        info!(base_url = %self.base_url, "Config");
        info!(
            session_cookie = self.session_cookie.value.is_some(),
            source = %self.session_cookie.source,
            "Config"
        );
        info!(results_path = %self.results_path.value.display(), source = %self.results_path.source, "Config");
        info!(coverage = self.coverage.value.as_str(), source = %self.coverage.source, "Config");
        info!(action_timeout_ms = %self.action_timeout_ms, settle_timeout_ms = %self.settle_timeout_ms, "Config");
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
