//! Test logging.
//!
//! ```ignore
//! use routine_e2e_common::testing::init_test_logging;
//!
//! #[tokio::test]
//! async fn test_full_run() {
//!     init_test_logging(); // Safe to call multiple times
//!     tracing::info!(case_id = "O-01", "This shows up under --nocapture");
//! }
//! ```

use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing_subscriber::prelude::*;

static TEST_LOGGING_INIT: Once = Once::new();

/// Install a compact subscriber that writes through the test harness.
///
/// # Environment Variables
///
/// - `ROUTINE_TEST_LOG_LEVEL`: level for the engine crates (default: `info`)
/// - `ROUTINE_TEST_LOG_FILE`: additionally write JSON lines to this file
pub fn init_test_logging() {
    TEST_LOGGING_INIT.call_once(|| {
        let level = std::env::var("ROUTINE_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = tracing_subscriber::EnvFilter::try_new(format!(
            "routine_e2e_common={level},routine_e2e={level}"
        ))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let file_layer = log_file().map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_current_span(true)
        });

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer);

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn log_file() -> Option<std::fs::File> {
    let path = PathBuf::from(std::env::var("ROUTINE_TEST_LOG_FILE").ok()?);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::File::create(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!(check = true, "logging initialized");
    }
}
