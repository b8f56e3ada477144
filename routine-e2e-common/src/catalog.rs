//! Built-in scenario catalog.
//!
//! Fourteen cases covering every frequency/kind pairing of interest, with
//! first and fourth week selections and single-month as well as multi-month
//! windows so the application's scheduling-window computation gets
//! cross-checked from both ends.

use crate::types::{Frequency, ScenarioCase, Schedule, TaskKind, YearMonth};
use chrono::NaiveDate;
use std::collections::HashSet;

const fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid catalog date"),
    }
}

const fn window(
    id: &'static str,
    frequency: Frequency,
    kind: TaskKind,
    week_of_month: u8,
    start: YearMonth,
    end: YearMonth,
) -> ScenarioCase {
    ScenarioCase {
        id,
        frequency,
        kind,
        schedule: Schedule::Window {
            week_of_month,
            start_month: start,
            end_month: end,
        },
    }
}

const fn spot(id: &'static str, kind: TaskKind, due_date: NaiveDate) -> ScenarioCase {
    ScenarioCase {
        id,
        frequency: Frequency::Spot,
        kind,
        schedule: Schedule::Spot { due_date },
    }
}

const FEB_2026: YearMonth = YearMonth::new(2026, 2);
const APR_2026: YearMonth = YearMonth::new(2026, 4);
const JAN_2027: YearMonth = YearMonth::new(2027, 1);
const DEC_2027: YearMonth = YearMonth::new(2027, 12);

use Frequency::{Monthly, Quarterly, Weekly, Yearly};
use TaskKind::{Group, Individual};

/// The catalog, in execution order.
pub const BUILTIN_CASES: [ScenarioCase; 14] = [
    window("O-01", Monthly, Individual, 1, FEB_2026, FEB_2026),
    window("O-02", Monthly, Group, 4, FEB_2026, APR_2026),
    window("O-03", Quarterly, Individual, 1, FEB_2026, APR_2026),
    window("O-04", Quarterly, Group, 4, FEB_2026, APR_2026),
    window("O-05", Monthly, Individual, 4, FEB_2026, APR_2026),
    window("O-06", Monthly, Group, 1, FEB_2026, FEB_2026),
    spot("O-07", Individual, ymd(2026, 2, 20)),
    spot("O-08", Group, ymd(2026, 2, 27)),
    window("O-09", Quarterly, Individual, 4, FEB_2026, APR_2026),
    window("O-10", Quarterly, Group, 1, FEB_2026, APR_2026),
    window("O-11", Monthly, Individual, 1, FEB_2026, APR_2026),
    window("O-12", Monthly, Group, 4, FEB_2026, FEB_2026),
    window("O-13", Weekly, Individual, 1, FEB_2026, JAN_2027),
    window("O-14", Yearly, Group, 4, FEB_2026, DEC_2027),
];

/// Return the built-in catalog. Every call yields the same ordered sequence.
pub fn builtin_cases() -> Vec<ScenarioCase> {
    BUILTIN_CASES.to_vec()
}

/// Catalog defects detected before a run starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate case id: {0}")]
    DuplicateId(String),

    #[error("case {id}: schedule does not match frequency {frequency}")]
    ScheduleMismatch { id: String, frequency: Frequency },

    #[error("case {id}: week of month {week} outside 1..=4")]
    WeekOutOfRange { id: String, week: u8 },

    #[error("case {id}: end month {end} precedes start month {start}")]
    InvertedWindow {
        id: String,
        start: YearMonth,
        end: YearMonth,
    },
}

/// Check ids are unique and every schedule is well-formed for its frequency.
pub fn validate_catalog(cases: &[ScenarioCase]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for case in cases {
        if !seen.insert(case.id) {
            return Err(CatalogError::DuplicateId(case.id.to_string()));
        }
        if !case.is_consistent() {
            return Err(CatalogError::ScheduleMismatch {
                id: case.id.to_string(),
                frequency: case.frequency,
            });
        }
        if let Schedule::Window {
            week_of_month,
            start_month,
            end_month,
        } = case.schedule
        {
            if !(1..=4).contains(&week_of_month) {
                return Err(CatalogError::WeekOutOfRange {
                    id: case.id.to_string(),
                    week: week_of_month,
                });
            }
            if end_month < start_month {
                return Err(CatalogError::InvertedWindow {
                    id: case.id.to_string(),
                    start: start_month,
                    end: end_month,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_stable() {
        assert_eq!(builtin_cases(), builtin_cases());
        let ids: Vec<_> = builtin_cases().iter().map(|c| c.id).collect();
        assert_eq!(ids.first(), Some(&"O-01"));
        assert_eq!(ids.last(), Some(&"O-14"));
        assert_eq!(ids.len(), 14);
    }

    #[test]
    fn test_builtin_catalog_validates() {
        assert_eq!(validate_catalog(&builtin_cases()), Ok(()));
    }

    #[test]
    fn test_catalog_covers_every_frequency_and_kind() {
        let pairs: HashSet<_> = builtin_cases()
            .iter()
            .map(|c| (c.frequency, c.kind))
            .collect();
        assert!(pairs.contains(&(Frequency::Spot, TaskKind::Individual)));
        assert!(pairs.contains(&(Frequency::Spot, TaskKind::Group)));
        assert!(pairs.contains(&(Frequency::Monthly, TaskKind::Individual)));
        assert!(pairs.contains(&(Frequency::Monthly, TaskKind::Group)));
        assert!(pairs.contains(&(Frequency::Quarterly, TaskKind::Individual)));
        assert!(pairs.contains(&(Frequency::Quarterly, TaskKind::Group)));
        assert!(pairs.contains(&(Frequency::Weekly, TaskKind::Individual)));
        assert!(pairs.contains(&(Frequency::Yearly, TaskKind::Group)));
    }

    #[test]
    fn test_catalog_assignee_demand() {
        let demand: usize = builtin_cases()
            .iter()
            .map(|c| c.kind.required_assignees())
            .sum();
        assert_eq!(demand, 21);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut cases = builtin_cases();
        cases.push(cases[0].clone());
        assert_eq!(
            validate_catalog(&cases),
            Err(CatalogError::DuplicateId("O-01".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_week() {
        let cases = vec![window("Z-01", Monthly, Individual, 5, FEB_2026, FEB_2026)];
        assert!(matches!(
            validate_catalog(&cases),
            Err(CatalogError::WeekOutOfRange { week: 5, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let cases = vec![window("Z-02", Monthly, Individual, 1, APR_2026, FEB_2026)];
        assert!(matches!(
            validate_catalog(&cases),
            Err(CatalogError::InvertedWindow { .. })
        ));
    }
}
