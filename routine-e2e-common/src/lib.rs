//! Orchestration engine for routine app end-to-end acceptance runs.
//!
//! The engine drives a fixed catalog of scheduling scenarios through the
//! application's UI: each case creates a parent record, renames it, finds
//! and edits one generated routine instance, completes it and completes the
//! parent. Assignees are drawn without replacement from the candidates the
//! UI offers, and the run checks that every candidate was used.
//!
//! The browser sits behind [`ui::RoutineUi`]; [`fake_app::FakeRoutineApp`]
//! implements it in memory for tests.

pub mod allocator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fake_app;
pub mod locator;
pub mod orchestrator;
pub mod poll;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod session;
pub mod testing;
pub mod types;
pub mod ui;

pub use allocator::{AllocatorState, Coverage, pick_assignees};
pub use catalog::{BUILTIN_CASES, builtin_cases, validate_catalog};
pub use config::RunConfig;
pub use error::{DriverError, E2eError, E2eResult};
pub use locator::{LocatorLimits, ViewLocator};
pub use orchestrator::{CaseError, Orchestrator, WorkflowStep};
pub use poll::{PollPolicy, Timeouts, wait_until};
pub use runner::{CoverageMode, RunController, RunError, RunOptions, RunReport};
pub use session::{SessionPlan, establish, plan_session};
pub use types::{CaseOutcome, CaseResult, Frequency, ScenarioCase, Schedule, TaskKind, YearMonth};
pub use ui::{RoutineUi, Screen, SessionCookie};
