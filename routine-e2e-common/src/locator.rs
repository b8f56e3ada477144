//! View Locator: find a record in a paginated, filterable list screen.
//!
//! The list screens expose no key lookup, so the search is a linear scan
//! from a known origin: filters cleared, first page shown. Both the rewind
//! and the forward scan are capped because the UI does not report a page
//! count and a broken pagination control must not spin forever.

use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::poll::{Timeouts, wait_until};
use crate::ui::{PageStep, RoutineUi, RowQuery, Screen};

/// Maximum "previous page" clicks while rewinding to page 1.
pub const DEFAULT_MAX_REWIND: usize = 30;

/// Maximum pages examined during the forward scan.
pub const DEFAULT_MAX_ADVANCE: usize = 60;

/// Iteration caps of the locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorLimits {
    pub max_rewind: usize,
    pub max_advance: usize,
}

impl Default for LocatorLimits {
    fn default() -> Self {
        Self {
            max_rewind: DEFAULT_MAX_REWIND,
            max_advance: DEFAULT_MAX_ADVANCE,
        }
    }
}

/// Scans list screens for rows by text.
#[derive(Debug, Clone)]
pub struct ViewLocator {
    limits: LocatorLimits,
    timeouts: Timeouts,
}

impl ViewLocator {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            limits: LocatorLimits::default(),
            timeouts,
        }
    }

    pub fn with_limits(mut self, limits: LocatorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> LocatorLimits {
        self.limits
    }

    /// Locate the first row on `screen` whose text contains `key`.
    ///
    /// Fails with [`E2eError::RecordNotFound`] once every page has been
    /// examined or the scan cap is reached.
    pub async fn find_row<U: RoutineUi>(
        &self,
        ui: &mut U,
        screen: Screen,
        key: &str,
    ) -> E2eResult<RowQuery> {
        self.reset_filters(ui, screen).await?;
        self.rewind(ui, screen).await?;

        let query = RowQuery::text(screen, key);
        let mut pages_scanned = 0;

        for _ in 0..self.limits.max_advance {
            pages_scanned += 1;
            if ui.row_count(&query).await? > 0 {
                let view: &U = ui;
                let target = &query;
                wait_until(&format!("{target} to be visible"), self.timeouts.action(), move || {
                    view.row_visible(target)
                })
                .await?;
                debug!(%screen, key, pages_scanned, "Row located");
                return Ok(query);
            }
            if ui.page_control_disabled(screen, PageStep::Next).await? {
                break;
            }
            ui.click_page_control(screen, PageStep::Next).await?;
            self.settle().await;
        }

        Err(E2eError::RecordNotFound {
            screen,
            key: key.to_string(),
            pages_scanned,
        })
    }

    /// Clear every filter and re-apply so the full dataset is listed.
    async fn reset_filters<U: RoutineUi>(&self, ui: &mut U, screen: Screen) -> E2eResult<()> {
        ui.clear_filters(screen).await?;
        if ui.has_filter_button(screen).await? {
            ui.click_filter_button(screen).await?;
        }
        Ok(())
    }

    /// Step back until "previous" is disabled, i.e. page 1 is shown.
    async fn rewind<U: RoutineUi>(&self, ui: &mut U, screen: Screen) -> E2eResult<()> {
        let mut clicks = 0;
        while clicks < self.limits.max_rewind {
            if ui.page_control_disabled(screen, PageStep::Previous).await? {
                break;
            }
            ui.click_page_control(screen, PageStep::Previous).await?;
            self.settle().await;
            clicks += 1;
        }
        debug!(%screen, clicks, "Rewound to first page");
        Ok(())
    }

    async fn settle(&self) {
        if !self.timeouts.page_settle.is_zero() {
            tokio::time::sleep(self.timeouts.page_settle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_app::{FakeRoutineApp, FilterState};
    use crate::ui::PageStep;

    fn app_with_routines(count: usize) -> FakeRoutineApp {
        let mut app = FakeRoutineApp::builder().page_size(5).build();
        for i in 0..count {
            app.seed_routine(&format!("filler-{i:03}"));
        }
        app
    }

    fn locator() -> ViewLocator {
        ViewLocator::new(Timeouts::fast())
    }

    #[tokio::test]
    async fn test_finds_row_on_later_page_from_any_start() {
        for start_page in 0..5 {
            let mut app = app_with_routines(23);
            app.set_page(Screen::Routines, start_page);

            let row = locator()
                .find_row(&mut app, Screen::Routines, "filler-017")
                .await
                .unwrap();

            assert_eq!(row, RowQuery::text(Screen::Routines, "filler-017"));
            assert_eq!(app.page(Screen::Routines), 3, "start page {start_page}");
            assert_eq!(app.row_count(&row).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_resets_filters_before_scan() {
        let mut app = app_with_routines(8);
        app.set_filters(
            Screen::Routines,
            FilterState {
                year: Some("2031".to_string()),
                month: None,
                assignee: None,
            },
        );

        let row = locator()
            .find_row(&mut app, Screen::Routines, "filler-006")
            .await
            .unwrap();

        assert_eq!(app.row_count(&row).await.unwrap(), 1);
        assert_eq!(app.filters(Screen::Routines), FilterState::default());
    }

    #[tokio::test]
    async fn test_missing_key_scans_every_page() {
        let mut app = app_with_routines(12);
        app.set_page(Screen::Routines, 2);

        let err = locator()
            .find_row(&mut app, Screen::Routines, "no-such-row")
            .await
            .unwrap_err();

        match err {
            E2eError::RecordNotFound {
                screen,
                key,
                pages_scanned,
            } => {
                assert_eq!(screen, Screen::Routines);
                assert_eq!(key, "no-such-row");
                assert_eq!(pages_scanned, 3);
            }
            other => panic!("expected RecordNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scan_cap_bounds_broken_pagination() {
        let mut app = app_with_routines(4);
        app.break_pagination(Screen::Routines);

        let limits = LocatorLimits {
            max_rewind: 3,
            max_advance: 7,
        };
        let err = locator()
            .with_limits(limits)
            .find_row(&mut app, Screen::Routines, "absent")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            E2eError::RecordNotFound {
                pages_scanned: 7,
                ..
            }
        ));
        assert_eq!(app.page_clicks(Screen::Routines, PageStep::Previous), 3);
        assert_eq!(app.page_clicks(Screen::Routines, PageStep::Next), 7);
    }

    #[test]
    fn test_default_limits() {
        let limits = LocatorLimits::default();
        assert_eq!(limits.max_rewind, 30);
        assert_eq!(limits.max_advance, 60);
    }
}
