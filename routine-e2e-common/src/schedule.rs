//! Expected routine-instance generation.
//!
//! Mirrors the rule the application applies when a parent record is saved:
//! one instance per step month inside the window, due on the Nth Friday.

use crate::types::{Frequency, ScenarioCase, Schedule, YearMonth};
use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Due date for week `week_num` of a month: the Nth Friday, clamped to the
/// month's last day. `week_num` is clamped to 1..=4.
pub fn nth_friday(month: YearMonth, week_num: u8) -> Option<NaiveDate> {
    let week_num = u32::from(week_num.clamp(1, 4));
    let first = month.first_day()?;
    let to_friday = (Weekday::Fri.num_days_from_monday() + 7
        - first.weekday().num_days_from_monday())
        % 7;
    let day = 1 + to_friday + 7 * (week_num - 1);
    let last = last_day_of_month(month)?;
    Some(NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap_or(last))
}

fn last_day_of_month(month: YearMonth) -> Option<NaiveDate> {
    month
        .add_months(1)
        .first_day()?
        .checked_sub_days(Days::new(1))
}

/// Month in which generation starts. Quarterly records anchor on the
/// start month's position inside its quarter, rolled forward until it is
/// not before the window start.
fn generation_start(frequency: Frequency, start: YearMonth) -> YearMonth {
    if frequency != Frequency::Quarterly {
        return start;
    }
    let month_in_quarter = (start.month - 1) % 3 + 1;
    let mut cursor = YearMonth::new(start.year, month_in_quarter);
    while cursor < start {
        cursor = cursor.add_months(3);
    }
    cursor
}

/// Months in `[start, end]` visited with the frequency's step.
pub fn generation_months(frequency: Frequency, start: YearMonth, end: YearMonth) -> Vec<YearMonth> {
    let Some(step) = frequency.month_step() else {
        return Vec::new();
    };
    let mut months = Vec::new();
    let mut cursor = generation_start(frequency, start);
    while cursor <= end {
        months.push(cursor);
        cursor = cursor.add_months(step);
    }
    months
}

/// Due dates of every routine instance the application should generate.
pub fn expected_instances(frequency: Frequency, schedule: &Schedule) -> Vec<NaiveDate> {
    match *schedule {
        Schedule::Spot { due_date } => vec![due_date],
        Schedule::Window {
            week_of_month,
            start_month,
            end_month,
        } => generation_months(frequency, start_month, end_month)
            .into_iter()
            .filter_map(|month| nth_friday(month, week_of_month))
            .collect(),
    }
}

/// Convenience wrapper over [`expected_instances`] for a catalog case.
pub fn expected_for_case(case: &ScenarioCase) -> Vec<NaiveDate> {
    expected_instances(case.frequency, &case.schedule)
}
