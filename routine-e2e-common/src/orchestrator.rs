//! Per-case workflow.
//!
//! A case walks the record through its whole life: create the parent,
//! rename it, find one generated routine instance, edit it, complete it,
//! and complete (or observe the automatic completion of) the parent.
//! Steps run strictly in [`WorkflowStep`] order; the first failure is
//! returned as a [`CaseError`] tagged with the step it happened in.

use std::fmt;

use chrono::Local;
use tracing::{debug, info};

use crate::allocator::{AllocatorState, pick_assignees};
use crate::error::{DriverError, E2eError, E2eResult};
use crate::locator::ViewLocator;
use crate::poll::{Timeouts, wait_until};
use crate::types::{CaseOutcome, Schedule, ScenarioCase};
use crate::ui::{Field, Form, Overlay, RoutineUi, RowQuery, Screen};

/// Alphabet of the random title suffix; no look-alike characters.
pub const TITLE_TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random title suffix.
pub const TITLE_TOKEN_LEN: usize = 4;

/// Status option chosen when editing a routine instance.
pub const ROUTINE_STATUS_INDEX: usize = 1;

/// Stages of one case, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkflowStep {
    Created,
    ParentEdited,
    RoutineLocated,
    RoutineEdited,
    RoutineCompleted,
    ParentCompleted,
    Done,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 7] = [
        Self::Created,
        Self::ParentEdited,
        Self::RoutineLocated,
        Self::RoutineEdited,
        Self::RoutineCompleted,
        Self::ParentCompleted,
        Self::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ParentEdited => "parent_edited",
            Self::RoutineLocated => "routine_located",
            Self::RoutineEdited => "routine_edited",
            Self::RoutineCompleted => "routine_completed",
            Self::ParentCompleted => "parent_completed",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A case failed in `step`.
#[derive(Debug, thiserror::Error)]
#[error("step {step} failed: {source}")]
pub struct CaseError {
    pub step: WorkflowStep,
    #[source]
    pub source: E2eError,
}

impl CaseError {
    fn at(step: WorkflowStep) -> impl FnOnce(E2eError) -> CaseError {
        move |source| CaseError { step, source }
    }
}

/// Titles and summaries written by one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseLabels {
    pub title: String,
    pub updated_title: String,
    pub parent_summary: String,
    pub routine_summary: String,
}

impl CaseLabels {
    pub fn new(case_id: &str, title: String) -> Self {
        Self {
            updated_title: format!("{title}_UPD"),
            parent_summary: format!("parent update {case_id}"),
            routine_summary: format!("routine update {case_id}"),
            title,
        }
    }
}

/// Build `PW_E2E_{id}_{YYYYmmdd_HHMMSS}_{token}` from the local clock.
pub fn generate_title(case_id: &str, rng: &mut fastrand::Rng) -> String {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let token: String = (0..TITLE_TOKEN_LEN)
        .map(|_| TITLE_TOKEN_ALPHABET[rng.usize(..TITLE_TOKEN_ALPHABET.len())] as char)
        .collect();
    format!("PW_E2E_{case_id}_{stamp}_{token}")
}

/// Bring `screen` to the front; the active tab is disabled and left alone.
pub async fn switch_screen<U: RoutineUi>(
    ui: &mut U,
    screen: Screen,
    timeouts: &Timeouts,
) -> E2eResult<()> {
    {
        let view: &U = ui;
        wait_until(&format!("{screen} tab visible"), timeouts.action(), move || {
            view.screen_tab_visible(screen)
        })
        .await?;
    }
    if !ui.screen_tab_disabled(screen).await? {
        ui.click_screen_tab(screen).await?;
    }
    Ok(())
}

/// Open the creation overlay, falling back to a scripted click when the
/// button is attached but not visible.
pub async fn open_create_form<U: RoutineUi>(ui: &mut U, timeouts: &Timeouts) -> E2eResult<()> {
    if ui.create_button_visible().await? {
        ui.click_create_button().await?;
    } else {
        debug!("Create button hidden, triggering it from script");
        ui.trigger_create_button().await?;
    }
    wait_overlay(ui, Overlay::Creation, true, timeouts).await
}

async fn wait_overlay<U: RoutineUi>(
    ui: &U,
    overlay: Overlay,
    open: bool,
    timeouts: &Timeouts,
) -> E2eResult<()> {
    let (what, policy) = if open {
        (format!("{overlay} to open"), timeouts.action())
    } else {
        (format!("{overlay} to close"), timeouts.settle())
    };
    wait_until(&what, policy, move || async move {
        let is_open = ui.overlay_open(overlay).await?;
        Ok::<_, DriverError>(is_open == open)
    })
    .await
}

async fn wait_row_visible<U: RoutineUi>(
    ui: &U,
    row: &RowQuery,
    timeouts: &Timeouts,
) -> E2eResult<()> {
    wait_until(&format!("{row} to be visible"), timeouts.settle(), move || {
        ui.row_visible(row)
    })
    .await
}

async fn wait_row_gone<U: RoutineUi>(
    ui: &U,
    row: &RowQuery,
    timeouts: &Timeouts,
) -> E2eResult<()> {
    wait_until(&format!("{row} to disappear"), timeouts.settle(), move || async move {
        let count = ui.row_count(row).await?;
        Ok::<_, DriverError>(count == 0)
    })
    .await
}

/// Drives single cases through the workflow.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    timeouts: Timeouts,
    locator: ViewLocator,
    title_rng: fastrand::Rng,
}

impl Orchestrator {
    pub fn new(timeouts: Timeouts, title_seed: u64) -> Self {
        Self {
            locator: ViewLocator::new(timeouts),
            timeouts,
            title_rng: fastrand::Rng::with_seed(title_seed),
        }
    }

    pub fn with_locator(mut self, locator: ViewLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Execute every step of `case` and return its outcome.
    pub async fn run_case<U: RoutineUi>(
        &mut self,
        ui: &mut U,
        allocator: &mut AllocatorState,
        case: &ScenarioCase,
    ) -> Result<CaseOutcome, CaseError> {
        let labels = CaseLabels::new(case.id, generate_title(case.id, &mut self.title_rng));

        enter(case, WorkflowStep::Created);
        let assignees = self
            .create_parent(ui, allocator, case, &labels)
            .await
            .map_err(CaseError::at(WorkflowStep::Created))?;
        info!(case_id = case.id, assignees = %assignees.join("; "), "Parent created");

        enter(case, WorkflowStep::ParentEdited);
        let task_no = self
            .edit_parent(ui, &labels)
            .await
            .map_err(CaseError::at(WorkflowStep::ParentEdited))?;

        enter(case, WorkflowStep::RoutineLocated);
        let routine_row = self
            .locate_routine(ui, &task_no)
            .await
            .map_err(CaseError::at(WorkflowStep::RoutineLocated))?;

        enter(case, WorkflowStep::RoutineEdited);
        self.edit_routine(ui, &routine_row, &labels)
            .await
            .map_err(CaseError::at(WorkflowStep::RoutineEdited))?;

        enter(case, WorkflowStep::RoutineCompleted);
        self.complete_routine(ui, &labels)
            .await
            .map_err(CaseError::at(WorkflowStep::RoutineCompleted))?;

        enter(case, WorkflowStep::ParentCompleted);
        self.complete_parent(ui, case, &task_no)
            .await
            .map_err(CaseError::at(WorkflowStep::ParentCompleted))?;

        enter(case, WorkflowStep::Done);
        Ok(CaseOutcome::pass(
            case.id,
            labels.updated_title,
            task_no,
            assignees,
        ))
    }

    async fn create_parent<U: RoutineUi>(
        &self,
        ui: &mut U,
        allocator: &mut AllocatorState,
        case: &ScenarioCase,
        labels: &CaseLabels,
    ) -> E2eResult<Vec<String>> {
        open_create_form(ui, &self.timeouts).await?;

        ui.fill(Form::Creation, Field::Title, &labels.title).await?;
        ui.select_index(Form::Creation, Field::TaskKind, case.kind.option_index())
            .await?;
        ui.select_index(Form::Creation, Field::Frequency, case.frequency.option_index())
            .await?;

        match case.schedule {
            Schedule::Spot { due_date } => {
                let due = due_date.format("%Y-%m-%d").to_string();
                ui.set_value(Form::Creation, Field::DueDate, &due).await?;
            }
            Schedule::Window {
                week_of_month,
                start_month,
                end_month,
            } => {
                ui.set_value(Form::Creation, Field::StartMonth, &start_month.to_string())
                    .await?;
                ui.set_value(Form::Creation, Field::EndMonth, &end_month.to_string())
                    .await?;
                if ui.field_enabled(Form::Creation, Field::Week).await? {
                    ui.select_value(Form::Creation, Field::Week, &week_of_month.to_string())
                        .await?;
                }
            }
        }

        let picked = pick_assignees(
            ui,
            allocator,
            case.kind.required_assignees(),
            &self.timeouts,
        )
        .await?;

        ui.submit(Form::Creation).await?;
        wait_overlay(ui, Overlay::Creation, false, &self.timeouts).await?;
        Ok(picked)
    }

    /// Rename the parent and return its task number.
    async fn edit_parent<U: RoutineUi>(&self, ui: &mut U, labels: &CaseLabels) -> E2eResult<String> {
        switch_screen(ui, Screen::Parents, &self.timeouts).await?;

        let row = self
            .locator
            .find_row(ui, Screen::Parents, &labels.title)
            .await?;
        let task_no = ui.row_task_no(&row).await?.trim().to_string();
        if task_no.is_empty() {
            return Err(E2eError::Driver(DriverError::ElementNotFound(format!(
                "{row}: empty task number"
            ))));
        }
        debug!(task_no = %task_no, "Captured task number");

        ui.click_edit_trigger(&row).await?;
        wait_overlay(ui, Overlay::Creation, true, &self.timeouts).await?;
        ui.fill(Form::Creation, Field::Title, &labels.updated_title)
            .await?;
        ui.fill(Form::Creation, Field::Summary, &labels.parent_summary)
            .await?;
        ui.submit(Form::Creation).await?;
        wait_overlay(ui, Overlay::Creation, false, &self.timeouts).await?;
        Ok(task_no)
    }

    async fn locate_routine<U: RoutineUi>(&self, ui: &mut U, task_no: &str) -> E2eResult<RowQuery> {
        switch_screen(ui, Screen::Routines, &self.timeouts).await?;
        self.locator.find_row(ui, Screen::Routines, task_no).await
    }

    async fn edit_routine<U: RoutineUi>(
        &self,
        ui: &mut U,
        row: &RowQuery,
        labels: &CaseLabels,
    ) -> E2eResult<()> {
        ui.click_row(row).await?;
        wait_overlay(ui, Overlay::RoutineEdit, true, &self.timeouts).await?;
        ui.select_index(Form::RoutineEdit, Field::Status, ROUTINE_STATUS_INDEX)
            .await?;
        ui.fill(Form::RoutineEdit, Field::Summary, &labels.routine_summary)
            .await?;
        ui.submit(Form::RoutineEdit).await?;
        wait_overlay(ui, Overlay::RoutineEdit, false, &self.timeouts).await
    }

    async fn complete_routine<U: RoutineUi>(&self, ui: &mut U, labels: &CaseLabels) -> E2eResult<()> {
        let row = RowQuery::text(Screen::Routines, labels.routine_summary.as_str());
        wait_row_visible(ui, &row, &self.timeouts).await?;
        ui.check_completion(&row).await?;
        wait_row_gone(ui, &row, &self.timeouts).await
    }

    async fn complete_parent<U: RoutineUi>(
        &self,
        ui: &mut U,
        case: &ScenarioCase,
        task_no: &str,
    ) -> E2eResult<()> {
        switch_screen(ui, Screen::Parents, &self.timeouts).await?;

        let row = RowQuery::task_no(Screen::Parents, task_no);
        if ui.row_count(&row).await? == 0 {
            info!(case_id = case.id, task_no, "Parent auto-completed");
            return Ok(());
        }
        wait_row_visible(ui, &row, &self.timeouts).await?;
        ui.check_completion(&row).await?;
        wait_row_gone(ui, &row, &self.timeouts).await
    }
}

fn enter(case: &ScenarioCase, step: WorkflowStep) {
    debug!(case_id = case.id, step = %step, "Entering step");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BUILTIN_CASES;
    use crate::fake_app::{FakeEvent, FakeFaults, FakeRoutineApp, FilterState};

    fn case(id: &str) -> &'static ScenarioCase {
        BUILTIN_CASES.iter().find(|c| c.id == id).unwrap()
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Timeouts::fast(), 11)
    }

    #[test]
    fn test_title_shape() {
        let mut rng = fastrand::Rng::with_seed(5);
        let title = generate_title("O-07", &mut rng);
        let parts: Vec<&str> = title.split('_').collect();
        assert_eq!(parts[0], "PW");
        assert_eq!(parts[1], "E2E");
        assert_eq!(parts[2], "O-07");
        assert_eq!(parts[3].len(), 8);
        assert_eq!(parts[4].len(), 6);
        assert_eq!(parts[5].len(), TITLE_TOKEN_LEN);
        assert!(parts[5].bytes().all(|b| TITLE_TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_labels() {
        let labels = CaseLabels::new("O-03", "PW_E2E_O-03_x".to_string());
        assert_eq!(labels.updated_title, "PW_E2E_O-03_x_UPD");
        assert_eq!(labels.parent_summary, "parent update O-03");
        assert_eq!(labels.routine_summary, "routine update O-03");
    }

    #[test]
    fn test_steps_are_ordered() {
        let mut sorted = WorkflowStep::ALL;
        sorted.sort();
        assert_eq!(sorted, WorkflowStep::ALL);
        assert_eq!(WorkflowStep::ParentEdited.to_string(), "parent_edited");
    }

    #[tokio::test]
    async fn test_individual_case_walks_every_step() {
        let mut app = FakeRoutineApp::default();
        let mut allocator = AllocatorState::new(3);

        let outcome = orchestrator()
            .run_case(&mut app, &mut allocator, case("O-03"))
            .await
            .unwrap();

        assert!(outcome.title.ends_with("_UPD"));
        assert_eq!(outcome.task_no, "1001");
        assert_eq!(outcome.assignees.len(), 1);

        let parent = &app.parents()[0];
        assert!(parent.completed);
        assert_eq!(parent.summary, "parent update O-03");
        let edited = app
            .routines()
            .iter()
            .find(|r| r.summary == "routine update O-03")
            .unwrap();
        assert!(edited.completed);
        assert_eq!(edited.status, crate::fake_app::STATUS_OPTIONS[ROUTINE_STATUS_INDEX]);
    }

    #[tokio::test]
    async fn test_group_case_uses_two_assignees() {
        let mut app = FakeRoutineApp::default();
        let mut allocator = AllocatorState::new(3);

        let outcome = orchestrator()
            .run_case(&mut app, &mut allocator, case("O-02"))
            .await
            .unwrap();

        assert_eq!(outcome.assignees.len(), 2);
        assert_eq!(app.parents()[0].assignees, outcome.assignees);
    }

    fn app_with_older_parents(count: usize) -> FakeRoutineApp {
        let mut app = FakeRoutineApp::builder().page_size(2).build();
        for i in 0..count {
            app.seed_parent(&format!("older-parent-{i}"));
        }
        app
    }

    #[tokio::test]
    async fn test_parent_found_when_parents_view_left_on_later_page() {
        let mut app = app_with_older_parents(3);
        app.set_page(Screen::Parents, 1);
        let mut allocator = AllocatorState::new(3);

        let outcome = orchestrator()
            .run_case(&mut app, &mut allocator, case("O-01"))
            .await
            .unwrap();

        assert_eq!(outcome.task_no, "1004");
        let parent = app.parents().iter().find(|p| p.task_no == 1004).unwrap();
        assert!(parent.completed);
        assert_eq!(parent.summary, "parent update O-01");
        assert_eq!(app.page(Screen::Parents), 0);
    }

    #[tokio::test]
    async fn test_parent_found_when_parents_view_is_filtered() {
        let mut app = app_with_older_parents(3);
        app.set_filters(
            Screen::Parents,
            FilterState {
                year: Some("2031".to_string()),
                month: None,
                assignee: None,
            },
        );
        let mut allocator = AllocatorState::new(3);

        let outcome = orchestrator()
            .run_case(&mut app, &mut allocator, case("O-01"))
            .await
            .unwrap();

        assert_eq!(outcome.task_no, "1004");
        assert_eq!(app.filters(Screen::Parents), FilterState::default());
        assert!(app.journal().contains(&FakeEvent::ParentCompleted {
            task_no: 1004,
            automatic: false,
        }));
    }

    #[tokio::test]
    async fn test_missing_routines_fail_at_locate_step() {
        let mut app = FakeRoutineApp::builder()
            .faults(FakeFaults {
                drop_routines_for: Some("O-01".to_string()),
                ..FakeFaults::default()
            })
            .build();
        let mut allocator = AllocatorState::new(3);

        let err = orchestrator()
            .run_case(&mut app, &mut allocator, case("O-01"))
            .await
            .unwrap_err();

        assert_eq!(err.step, WorkflowStep::RoutineLocated);
        assert!(matches!(err.source, E2eError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_swallowed_assignee_times_out_in_create_step() {
        let mut app = FakeRoutineApp::builder()
            .faults(FakeFaults {
                swallow_assignee_selection: true,
                ..FakeFaults::default()
            })
            .build();
        let mut allocator = AllocatorState::new(3);

        let err = orchestrator()
            .run_case(&mut app, &mut allocator, case("O-01"))
            .await
            .unwrap_err();

        assert_eq!(err.step, WorkflowStep::Created);
        assert!(matches!(err.source, E2eError::Timeout { .. }));
        assert!(app.parents().is_empty());
    }

    #[tokio::test]
    async fn test_auto_completed_parent_is_not_clicked() {
        let mut app = FakeRoutineApp::builder().auto_complete_parent(true).build();
        let mut allocator = AllocatorState::new(3);

        orchestrator()
            .run_case(&mut app, &mut allocator, case("O-01"))
            .await
            .unwrap();

        assert!(app.journal().contains(&FakeEvent::ParentCompleted {
            task_no: 1001,
            automatic: true,
        }));
        assert!(!app.journal().contains(&FakeEvent::ParentCompleted {
            task_no: 1001,
            automatic: false,
        }));
    }
}
