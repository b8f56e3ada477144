//! Result files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::allocator::Coverage;
use crate::error::E2eResult;
use crate::runner::RunReport;
use crate::types::CaseOutcome;

/// Default location of the per-case results.
pub const DEFAULT_RESULTS_PATH: &str = "test-results/ortho-results.json";

/// File name of the run summary, written next to the results.
pub const SUMMARY_FILE_NAME: &str = "ortho-summary.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary<'a> {
    executed_at: String,
    base_url: &'a str,
    seed: u64,
    total_cases: usize,
    coverage: &'a Coverage,
    candidates: &'a [String],
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> E2eResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Write the outcomes as a pretty-printed JSON array, creating parent
/// directories as needed.
pub fn write_results(path: &Path, outcomes: &[CaseOutcome]) -> E2eResult<()> {
    write_pretty(path, outcomes)?;
    info!(path = %path.display(), cases = outcomes.len(), "Results written");
    Ok(())
}

/// Path of the summary file belonging to `results_path`.
pub fn summary_path(results_path: &Path) -> PathBuf {
    results_path.with_file_name(SUMMARY_FILE_NAME)
}

pub fn write_summary(path: &Path, report: &RunReport) -> E2eResult<()> {
    let summary = RunSummary {
        executed_at: report.executed_at.to_rfc3339(),
        base_url: &report.base_url,
        seed: report.seed,
        total_cases: report.total_cases(),
        coverage: &report.coverage,
        candidates: &report.candidates,
    };
    write_pretty(path, &summary)?;
    info!(path = %path.display(), "Summary written");
    Ok(())
}

/// Write both files for a finished run.
pub fn write_report(results_path: &Path, report: &RunReport) -> E2eResult<()> {
    write_results(results_path, &report.outcomes)?;
    write_summary(&summary_path(results_path), report)
}
