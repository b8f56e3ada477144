//! Common types used across the routine E2E engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recurrence of a parent record as offered by the creation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Spot,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Position of this frequency in the creation form's select element.
    ///
    /// Index 0 is the placeholder and index 5 is the half-year option,
    /// which the catalog does not exercise.
    pub fn option_index(self) -> usize {
        match self {
            Self::Spot => 1,
            Self::Weekly => 2,
            Self::Monthly => 3,
            Self::Quarterly => 4,
            Self::Yearly => 6,
        }
    }

    /// Month step between generated routine instances.
    pub fn month_step(self) -> Option<u32> {
        match self {
            Self::Spot => None,
            Self::Weekly | Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Yearly => Some(12),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Whether a record is owned by one person or shared by a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Individual,
    Group,
}

impl TaskKind {
    /// Number of assignees the application requires for this kind.
    pub fn required_assignees(self) -> usize {
        match self {
            Self::Individual => 1,
            Self::Group => 2,
        }
    }

    /// Position of this kind in the creation form's select element.
    pub fn option_index(self) -> usize {
        match self {
            Self::Individual => 0,
            Self::Group => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A calendar month in `YYYY-MM` form, as used by month inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub const fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Step forward by `delta` months, rolling the year over.
    pub fn add_months(self, delta: u32) -> Self {
        let zero_based = self.month - 1 + delta;
        Self {
            year: self.year + (zero_based / 12) as i32,
            month: zero_based % 12 + 1,
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

/// Error parsing a `YYYY-MM` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid year-month '{0}': expected YYYY-MM with month 1..=12")]
pub struct YearMonthParseError(pub String);

impl FromStr for YearMonth {
    type Err = YearMonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || YearMonthParseError(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(err)?;
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        if !(1..=12).contains(&month) {
            return Err(err());
        }
        Ok(Self { year, month })
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Temporal fields of a scenario. The shape is determined by the frequency:
/// spot tasks carry a due date, everything else a week selector and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Spot {
        due_date: NaiveDate,
    },
    Window {
        week_of_month: u8,
        start_month: YearMonth,
        end_month: YearMonth,
    },
}

/// One parameterized end-to-end scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioCase {
    pub id: &'static str,
    pub frequency: Frequency,
    pub kind: TaskKind,
    pub schedule: Schedule,
}

impl ScenarioCase {
    /// Whether the schedule shape agrees with the frequency.
    pub fn is_consistent(&self) -> bool {
        matches!(
            (self.frequency, &self.schedule),
            (Frequency::Spot, Schedule::Spot { .. })
        ) || (self.frequency != Frequency::Spot
            && matches!(self.schedule, Schedule::Window { .. }))
    }
}

/// Terminal result of a case. Failures abort the run instead of being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseResult {
    #[serde(rename = "PASS")]
    Pass,
}

/// Outcome produced once per completed case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseOutcome {
    pub case_id: String,
    pub title: String,
    pub task_no: String,
    pub assignees: Vec<String>,
    pub result: CaseResult,
}

impl CaseOutcome {
    pub fn pass(case_id: &str, title: String, task_no: String, assignees: Vec<String>) -> Self {
        Self {
            case_id: case_id.to_string(),
            title,
            task_no,
            assignees,
            result: CaseResult::Pass,
        }
    }
}
