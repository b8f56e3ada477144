//! Run Controller: execute the catalog sequentially against one UI session.
//!
//! Cases share one [`AllocatorState`]. The first failing case aborts the
//! run; nothing after it is attempted. After the last case the assignee
//! coverage is checked.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::allocator::{AllocatorState, Coverage};
use crate::error::E2eError;
use crate::orchestrator::{CaseError, Orchestrator, WorkflowStep};
use crate::poll::Timeouts;
use crate::types::{CaseOutcome, ScenarioCase};
use crate::ui::RoutineUi;

/// What to do when some candidate was never assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageMode {
    /// Fail the run.
    #[default]
    Enforce,
    /// Log a warning and succeed.
    Report,
}

impl CoverageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Report => "report",
        }
    }
}

impl FromStr for CoverageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "report" => Ok(Self::Report),
            other => Err(format!("unknown coverage mode '{other}' (expected enforce|report)")),
        }
    }
}

/// Settings of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub base_url: String,
    pub seed: u64,
    pub coverage: CoverageMode,
    pub timeouts: Timeouts,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub executed_at: DateTime<Utc>,
    pub base_url: String,
    pub seed: u64,
    pub outcomes: Vec<CaseOutcome>,
    pub coverage: Coverage,
    /// Discovered candidate pool, sorted.
    pub candidates: Vec<String>,
}

impl RunReport {
    pub fn total_cases(&self) -> usize {
        self.outcomes.len()
    }
}

/// Run-level failure.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("case {case_id} failed at {step}: {source}")]
    CaseFailed {
        case_id: String,
        step: WorkflowStep,
        #[source]
        source: E2eError,
        /// Outcomes of the cases that passed before the failure.
        completed: Vec<CaseOutcome>,
    },

    #[error(
        "assignee coverage incomplete: used {}/{} (missing: {})",
        .report.coverage.used_count,
        .report.coverage.candidate_count,
        .report.coverage.missing.join(", ")
    )]
    CoverageViolation { report: Box<RunReport> },
}

impl RunError {
    /// The report of a run that executed every case, if there is one.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::CoverageViolation { report } => Some(report),
            Self::CaseFailed { .. } => None,
        }
    }
}

/// Sequential driver over the case catalog.
#[derive(Debug)]
pub struct RunController {
    options: RunOptions,
    orchestrator: Orchestrator,
    allocator: AllocatorState,
}

impl RunController {
    pub fn new(options: RunOptions) -> Self {
        // Titles draw from their own stream so the allocation sequence only
        // depends on the seed.
        let orchestrator = Orchestrator::new(options.timeouts, options.seed.rotate_left(32));
        Self {
            allocator: AllocatorState::new(options.seed),
            orchestrator,
            options,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn allocator(&self) -> &AllocatorState {
        &self.allocator
    }

    /// Execute `cases` in order.
    pub async fn run<U: RoutineUi>(
        &mut self,
        ui: &mut U,
        cases: &[ScenarioCase],
    ) -> Result<RunReport, RunError> {
        let mut outcomes = Vec::with_capacity(cases.len());

        for case in cases {
            info!(case_id = case.id, "START");
            match self.orchestrator.run_case(ui, &mut self.allocator, case).await {
                Ok(outcome) => {
                    info!(
                        case_id = case.id,
                        task_no = %outcome.task_no,
                        title = %outcome.title,
                        assignees = %outcome.assignees.join("; "),
                        "PASS"
                    );
                    outcomes.push(outcome);
                }
                Err(CaseError { step, source }) => {
                    tracing::error!(case_id = case.id, step = %step, error = %source, "FAIL");
                    return Err(RunError::CaseFailed {
                        case_id: case.id.to_string(),
                        step,
                        source,
                        completed: outcomes,
                    });
                }
            }
        }

        let coverage = self.allocator.coverage();
        info!(
            used = coverage.used_count,
            candidates = coverage.candidate_count,
            "Assignee coverage used={}/{}",
            coverage.used_count,
            coverage.candidate_count
        );

        let mut candidates = self.allocator.pool().to_vec();
        candidates.sort();
        let report = RunReport {
            executed_at: Utc::now(),
            base_url: self.options.base_url.clone(),
            seed: self.options.seed,
            outcomes,
            coverage,
            candidates,
        };

        if !report.coverage.is_complete() {
            match self.options.coverage {
                CoverageMode::Enforce => {
                    return Err(RunError::CoverageViolation {
                        report: Box::new(report),
                    });
                }
                CoverageMode::Report => {
                    warn!(missing = ?report.coverage.missing, "Assignee coverage incomplete");
                }
            }
        }

        info!(cases = report.total_cases(), "All cases passed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_mode_parse() {
        assert_eq!("enforce".parse::<CoverageMode>(), Ok(CoverageMode::Enforce));
        assert_eq!(" Report ".parse::<CoverageMode>(), Ok(CoverageMode::Report));
        assert!("strict".parse::<CoverageMode>().is_err());
        assert_eq!(CoverageMode::default(), CoverageMode::Enforce);
    }

    #[test]
    fn test_coverage_violation_message() {
        let report = RunReport {
            executed_at: Utc::now(),
            base_url: "https://mercury/routine_app/".to_string(),
            seed: 1,
            outcomes: Vec::new(),
            coverage: Coverage {
                used_count: 2,
                candidate_count: 3,
                missing: vec!["Mori Aoi".to_string()],
            },
            candidates: Vec::new(),
        };
        let err = RunError::CoverageViolation {
            report: Box::new(report),
        };
        assert_eq!(
            err.to_string(),
            "assignee coverage incomplete: used 2/3 (missing: Mori Aoi)"
        );
        assert!(err.report().is_some());
    }
}
