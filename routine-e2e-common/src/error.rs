//! Error types for the E2E engine.
//!
//! | Type          | Raised by                         | Effect                         |
//! |---------------|-----------------------------------|--------------------------------|
//! | `DriverError` | the browser automation boundary   | wrapped into `E2eError`        |
//! | `E2eError`    | allocator, locator, polls, steps  | aborts the current case        |
//!
//! Case- and run-level wrappers live next to the orchestrator and runner.

use std::time::Duration;

use crate::ui::Screen;

/// Failure reported by a [`RoutineUi`](crate::ui::RoutineUi) implementation.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),
}

/// Error raised while executing one step of a case.
#[derive(Debug, thiserror::Error)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not enough assignee candidates: need={need}, got={got}")]
    CandidatePoolTooSmall { need: usize, got: usize },

    #[error("Session is invalid or expired (redirected to {url})")]
    InvalidSession { url: String },

    #[error("{screen} row not found for '{key}' after scanning {pages_scanned} page(s)")]
    RecordNotFound {
        screen: Screen,
        key: String,
        pages_scanned: usize,
    },

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_too_small_message() {
        let err = E2eError::CandidatePoolTooSmall { need: 2, got: 1 };
        assert_eq!(err.to_string(), "Not enough assignee candidates: need=2, got=1");
    }

    #[test]
    fn test_record_not_found_names_screen_and_key() {
        let err = E2eError::RecordNotFound {
            screen: Screen::Routines,
            key: "1042".to_string(),
            pages_scanned: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("routines"));
        assert!(msg.contains("1042"));
        assert!(msg.contains("3 page"));
    }

    #[test]
    fn test_driver_error_converts() {
        let err: E2eError = DriverError::ElementNotFound("#open-create-btn".to_string()).into();
        assert!(matches!(err, E2eError::Driver(_)));
    }
}
