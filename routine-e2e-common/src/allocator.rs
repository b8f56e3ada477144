//! Assignee allocation without replacement.
//!
//! The candidate pool is discovered from the creation form's assignee select
//! on the first request, permuted with a seeded RNG and consumed front to
//! back. When a request does not fit in the unconsumed tail, the *entire*
//! pool is permuted again and consumption restarts at position 0. Every
//! handed-out id is recorded so the run can check that all candidates were
//! assigned at least once.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{DriverError, E2eError, E2eResult};
use crate::poll::{Timeouts, wait_until};
use crate::ui::RoutineUi;

/// Option value standing for "every employee"; never a real assignee.
pub const ALL_EMPLOYEES_SENTINEL: &str = "社員全員";

/// Leading placeholder options of the assignee select.
pub const RESERVED_LEADING_OPTIONS: usize = 2;

/// Turn raw select option values into the candidate list: skip the
/// placeholders, trim, drop blanks, the sentinel and duplicates.
pub fn candidates_from_options(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.iter()
        .skip(RESERVED_LEADING_OPTIONS)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && *value != ALL_EMPLOYEES_SENTINEL)
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}

/// How much of the candidate pool a run has touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub used_count: usize,
    pub candidate_count: usize,
    /// Candidates never allocated, sorted.
    pub missing: Vec<String>,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.used_count == self.candidate_count
    }
}

/// Allocation state shared by every case of one run.
#[derive(Debug, Clone)]
pub struct AllocatorState {
    pool: Vec<String>,
    cursor: usize,
    used: BTreeSet<String>,
    rng: fastrand::Rng,
    reshuffles: usize,
}

impl AllocatorState {
    /// Create an empty state; the pool is filled on the first allocation.
    pub fn new(seed: u64) -> Self {
        Self {
            pool: Vec::new(),
            cursor: 0,
            used: BTreeSet::new(),
            rng: fastrand::Rng::with_seed(seed),
            reshuffles: 0,
        }
    }

    /// Create a state with an already-known candidate list.
    pub fn with_candidates(seed: u64, candidates: Vec<String>) -> Self {
        let mut state = Self::new(seed);
        state.initialize(candidates);
        state
    }

    pub fn is_initialized(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Install a freshly discovered candidate list in random order.
    pub fn initialize(&mut self, candidates: Vec<String>) {
        self.pool = candidates;
        self.rng.shuffle(&mut self.pool);
        self.cursor = 0;
        self.used.clear();
        self.reshuffles = 0;
    }

    /// Hand out `count` pairwise-distinct candidates.
    pub fn take(&mut self, count: usize) -> E2eResult<Vec<String>> {
        if count == 0 {
            return Err(E2eError::Config(
                "assignee allocation requires count >= 1".to_string(),
            ));
        }
        if self.pool.len() < count {
            return Err(E2eError::CandidatePoolTooSmall {
                need: count,
                got: self.pool.len(),
            });
        }

        if self.cursor + count > self.pool.len() {
            self.rng.shuffle(&mut self.pool);
            self.cursor = 0;
            self.reshuffles += 1;
            debug!(
                pool_size = self.pool.len(),
                reshuffles = self.reshuffles,
                "Assignee pool exhausted, reshuffled"
            );
        }

        let picked = self.pool[self.cursor..self.cursor + count].to_vec();
        self.cursor += count;
        self.used.extend(picked.iter().cloned());
        Ok(picked)
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn used(&self) -> &BTreeSet<String> {
        &self.used
    }

    /// Number of full-pool permutations after the initial one.
    pub fn reshuffles(&self) -> usize {
        self.reshuffles
    }

    pub fn coverage(&self) -> Coverage {
        let mut missing: Vec<String> = self
            .pool
            .iter()
            .filter(|candidate| !self.used.contains(*candidate))
            .cloned()
            .collect();
        missing.sort();
        Coverage {
            used_count: self.used.len(),
            candidate_count: self.pool.len(),
            missing,
        }
    }
}

/// Allocate `count` assignees and apply them to the open creation form.
///
/// Clears previously selected chips, selects each id in turn and waits
/// until the hidden assignee field echoes every one of them.
pub async fn pick_assignees<U: RoutineUi>(
    ui: &mut U,
    state: &mut AllocatorState,
    count: usize,
    timeouts: &Timeouts,
) -> E2eResult<Vec<String>> {
    {
        let view: &U = ui;
        wait_until("assignee select attached", timeouts.attach(), move || {
            view.assignee_select_attached()
        })
        .await?;
    }

    if !state.is_initialized() {
        let raw = ui.assignee_options().await?;
        let candidates = candidates_from_options(&raw);
        if candidates.len() < count {
            return Err(E2eError::CandidatePoolTooSmall {
                need: count,
                got: candidates.len(),
            });
        }
        info!(candidates = candidates.len(), "Discovered assignee pool");
        state.initialize(candidates);
    }

    while ui.assignee_chip_count().await? > 0 {
        ui.remove_first_assignee_chip().await?;
    }

    let picked = state.take(count)?;
    for name in &picked {
        ui.select_assignee(name).await?;
    }

    let view: &U = ui;
    for name in &picked {
        let what = format!("assignee field to contain '{name}'");
        wait_until(&what, timeouts.action(), move || async move {
            let value = view.assignee_field_value().await?;
            Ok::<_, DriverError>(value.contains(name.as_str()))
        })
        .await?;
    }

    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("emp-{i:02}")).collect()
    }

    #[test]
    fn test_candidates_skip_placeholders_and_sentinel() {
        let raw: Vec<String> = [
            "",
            "-- select --",
            "Sato",
            " ",
            ALL_EMPLOYEES_SENTINEL,
            " Suzuki ",
            "Sato",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(candidates_from_options(&raw), vec!["Sato", "Suzuki"]);
    }

    #[test]
    fn test_candidates_only_placeholders() {
        let raw = vec!["".to_string(), "pick".to_string()];
        assert!(candidates_from_options(&raw).is_empty());
    }

    #[test]
    fn test_take_returns_distinct_pool_members() {
        let mut state = AllocatorState::with_candidates(7, names(5));
        let picked = state.take(2).unwrap();
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert!(picked.iter().all(|p| state.pool().contains(p)));
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.used().len(), 2);
    }

    #[test]
    fn test_take_reshuffles_on_exhaustion() {
        let mut state = AllocatorState::with_candidates(42, names(3));
        state.take(2).unwrap();
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.reshuffles(), 0);

        let second = state.take(2).unwrap();
        assert_eq!(state.reshuffles(), 1);
        assert_eq!(state.cursor(), 2);
        assert_eq!(second, state.pool()[0..2].to_vec());
    }

    #[test]
    fn test_take_exact_fit_does_not_reshuffle() {
        let mut state = AllocatorState::with_candidates(1, names(4));
        state.take(2).unwrap();
        state.take(2).unwrap();
        assert_eq!(state.reshuffles(), 0);
        assert_eq!(state.cursor(), 4);
        assert!(state.coverage().is_complete());
    }

    #[test]
    fn test_take_pool_too_small() {
        let mut state = AllocatorState::with_candidates(1, names(1));
        match state.take(2) {
            Err(E2eError::CandidatePoolTooSmall { need, got }) => {
                assert_eq!(need, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected pool too small, got {other:?}"),
        }
    }

    #[test]
    fn test_take_zero_is_config_error() {
        let mut state = AllocatorState::with_candidates(1, names(3));
        assert!(matches!(state.take(0), Err(E2eError::Config(_))));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = AllocatorState::with_candidates(99, names(6));
        let mut b = AllocatorState::with_candidates(99, names(6));
        for count in [1, 2, 2, 1, 2, 2] {
            assert_eq!(a.take(count).unwrap(), b.take(count).unwrap());
        }
    }

    #[test]
    fn test_coverage_reports_missing_sorted() {
        let mut state = AllocatorState::with_candidates(3, names(4));
        let picked = state.take(1).unwrap();
        let coverage = state.coverage();
        assert_eq!(coverage.used_count, 1);
        assert_eq!(coverage.candidate_count, 4);
        assert_eq!(coverage.missing.len(), 3);
        assert!(!coverage.missing.contains(&picked[0]));
        let mut sorted = coverage.missing.clone();
        sorted.sort();
        assert_eq!(coverage.missing, sorted);
        assert!(!coverage.is_complete());
    }

    proptest! {
        #[test]
        fn prop_every_allocation_is_distinct(
            seed in any::<u64>(),
            pool_size in 2usize..12,
            requests in proptest::collection::vec(1usize..=2, 1..40),
        ) {
            let mut state = AllocatorState::with_candidates(seed, names(pool_size));
            let pool: HashSet<String> = names(pool_size).into_iter().collect();
            for count in requests {
                let picked = state.take(count).unwrap();
                prop_assert_eq!(picked.len(), count);
                let unique: HashSet<&String> = picked.iter().collect();
                prop_assert_eq!(unique.len(), count);
                prop_assert!(picked.iter().all(|p| pool.contains(p)));
                prop_assert!(state.cursor() <= state.pool().len());
            }
        }

        #[test]
        fn prop_sequential_pass_covers_pool(seed in any::<u64>(), pool_size in 1usize..20) {
            // Single-id requests totalling the pool size never reshuffle,
            // so one pass touches every candidate.
            let mut state = AllocatorState::with_candidates(seed, names(pool_size));
            for _ in 0..pool_size {
                state.take(1).unwrap();
            }
            prop_assert!(state.coverage().is_complete());
            prop_assert_eq!(state.reshuffles(), 0);
        }

        #[test]
        fn prop_mixed_requests_converge_to_full_coverage(
            seed in any::<u64>(),
            pool_size in 2usize..13,
            pattern in proptest::collection::vec(1usize..=2, 1..8),
        ) {
            let mut state = AllocatorState::with_candidates(seed, names(pool_size));
            let mut used_before = 0;
            let mut converged_at = None;
            for round in 0..400 {
                for &count in &pattern {
                    let cursor = state.cursor();
                    let reshuffles = state.reshuffles();
                    state.take(count).unwrap();
                    if state.reshuffles() > reshuffles {
                        // Only a tail shorter than the request is skipped.
                        prop_assert!(pool_size - cursor < count);
                    }
                    let used = state.used().len();
                    prop_assert!(used >= used_before);
                    used_before = used;
                }
                if converged_at.is_none() && state.coverage().is_complete() {
                    converged_at = Some(round);
                }
            }
            let coverage = state.coverage();
            prop_assert!(converged_at.is_some(), "missing after 400 rounds: {:?}", coverage.missing);
            prop_assert_eq!(coverage.used_count, pool_size);
            prop_assert!(coverage.missing.is_empty());
        }
    }
}
