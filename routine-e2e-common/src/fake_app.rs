//! In-memory stand-in for the routine application.
//!
//! Implements [`RoutineUi`] over plain data so the allocator, locator,
//! orchestrator and run controller can be exercised without a browser.
//! It models what the engine can observe: overlays that open and close,
//! paginated and filterable list screens, the assignee chips and their
//! hidden echo field, routine generation on save, and the session redirect.
//! Every state change is appended to a journal tests can assert on.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::allocator::ALL_EMPLOYEES_SENTINEL;
use crate::error::DriverError;
use crate::schedule::expected_instances;
use crate::types::{Frequency, Schedule, TaskKind, YearMonth};
use crate::ui::{
    Field, Form, Overlay, PageStep, RoutineUi, RowMatcher, RowQuery, Screen, SessionCookie,
};

/// Where the fake sends unauthenticated navigations.
pub const FAKE_LOGIN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";

/// Options of the routine editor's status select.
pub const STATUS_OPTIONS: [&str; 3] = ["未対応", "処理中", "保留"];

const FIRST_TASK_NO: u32 = 1001;
const FIRST_RECORD_NO: u32 = 70001;
const FILLER_TASK_NO: u32 = 9000;

/// Applied or pending filter values of a list screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub year: Option<String>,
    pub month: Option<String>,
    pub assignee: Option<String>,
}

impl FilterState {
    fn admits(&self, due: NaiveDate, assignees: &[String]) -> bool {
        let year_ok = self
            .year
            .as_deref()
            .is_none_or(|y| y == due.year().to_string());
        let month_ok = self
            .month
            .as_deref()
            .is_none_or(|m| m.parse::<u32>().ok() == Some(due.month()));
        let assignee_ok = self
            .assignee
            .as_deref()
            .is_none_or(|a| assignees.iter().any(|x| x == a));
        year_ok && month_ok && assignee_ok
    }
}

/// Observable state changes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Created {
        task_no: u32,
        title: String,
        assignees: Vec<String>,
        instances: usize,
    },
    Rejected {
        reason: String,
    },
    ParentUpdated {
        task_no: u32,
        title: String,
        summary: String,
    },
    RoutineUpdated {
        record_no: u32,
        status: String,
        summary: String,
    },
    RoutineCompleted {
        record_no: u32,
    },
    ParentCompleted {
        task_no: u32,
        automatic: bool,
    },
}

/// Injected misbehaviour.
#[derive(Debug, Clone, Default)]
pub struct FakeFaults {
    /// Parents whose title contains this text get no routine instances.
    pub drop_routines_for: Option<String>,
    /// Assignee selections are ignored, so the hidden field never echoes them.
    pub swallow_assignee_selection: bool,
    /// The app shell never renders (create button missing).
    pub shell_missing: bool,
}

#[derive(Debug, Clone)]
pub struct ParentRecord {
    pub task_no: u32,
    pub title: String,
    pub summary: String,
    pub frequency: Frequency,
    pub kind: TaskKind,
    pub schedule: Schedule,
    pub assignees: Vec<String>,
    pub completed: bool,
}

impl ParentRecord {
    fn anchor_date(&self) -> NaiveDate {
        match self.schedule {
            Schedule::Spot { due_date } => due_date,
            Schedule::Window { start_month, .. } => start_month.first_day().unwrap_or_default(),
        }
    }

    fn row_text(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.task_no,
            self.title,
            self.frequency,
            self.kind,
            self.assignees.join("; "),
            self.summary
        )
    }
}

#[derive(Debug, Clone)]
pub struct RoutineRecord {
    pub record_no: u32,
    pub task_no: u32,
    pub title: String,
    pub due_date: NaiveDate,
    pub assignees: Vec<String>,
    pub status: String,
    pub summary: String,
    pub completed: bool,
}

impl RoutineRecord {
    fn row_text(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.task_no, self.record_no, self.title, self.due_date, self.status, self.summary
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormMode {
    Create,
    EditParent(u32),
}

#[derive(Debug, Clone)]
struct CreationForm {
    mode: FormMode,
    fields: HashMap<Field, String>,
}

#[derive(Debug, Clone)]
struct RoutineEditForm {
    record_no: u32,
    status: Option<usize>,
    summary: String,
}

#[derive(Debug, Clone, Default)]
struct ViewState {
    page: usize,
    pending: FilterState,
    applied: FilterState,
    broken_pagination: bool,
    prev_clicks: usize,
    next_clicks: usize,
}

#[derive(Debug, Clone, Copy)]
enum RowRef {
    Parent(usize),
    Routine(usize),
}

/// Builder for [`FakeRoutineApp`].
#[derive(Debug, Clone)]
pub struct FakeRoutineAppBuilder {
    page_size: usize,
    employees: Vec<String>,
    auto_complete_parent: bool,
    session_token: Option<String>,
    faults: FakeFaults,
}

impl Default for FakeRoutineAppBuilder {
    fn default() -> Self {
        Self {
            page_size: 20,
            employees: default_employees(),
            auto_complete_parent: false,
            session_token: None,
            faults: FakeFaults::default(),
        }
    }
}

/// Twelve employees: exactly the catalog's first-pass demand.
pub fn default_employees() -> Vec<String> {
    [
        "Aoki Haruto",
        "Endo Yui",
        "Fujita Ren",
        "Hayashi Mio",
        "Ikeda Sota",
        "Kato Hina",
        "Kimura Riku",
        "Mori Aoi",
        "Nakamura Yuto",
        "Ogawa Sakura",
        "Sasaki Kaito",
        "Yamada Rin",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

impl FakeRoutineAppBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn employees(mut self, employees: Vec<String>) -> Self {
        self.employees = employees;
        self
    }

    /// Complete the parent when its last routine instance is completed.
    pub fn auto_complete_parent(mut self, enabled: bool) -> Self {
        self.auto_complete_parent = enabled;
        self
    }

    /// Only this cookie value counts as an authenticated session.
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn faults(mut self, faults: FakeFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn build(self) -> FakeRoutineApp {
        let mut views = HashMap::new();
        views.insert(Screen::Parents, ViewState::default());
        views.insert(Screen::Routines, ViewState::default());
        FakeRoutineApp {
            page_size: self.page_size,
            employees: self.employees,
            auto_complete_parent: self.auto_complete_parent,
            session_token: self.session_token,
            faults: self.faults,
            url: "about:blank".to_string(),
            cookie: None,
            dialogs_accepted: false,
            next_task_no: FIRST_TASK_NO,
            next_record_no: FIRST_RECORD_NO,
            parents: Vec::new(),
            routines: Vec::new(),
            active_screen: Screen::Routines,
            views,
            creation: None,
            routine_edit: None,
            chips: Vec::new(),
            journal: Vec::new(),
        }
    }
}

/// In-memory routine application.
#[derive(Debug, Clone)]
pub struct FakeRoutineApp {
    page_size: usize,
    employees: Vec<String>,
    auto_complete_parent: bool,
    session_token: Option<String>,
    faults: FakeFaults,
    url: String,
    cookie: Option<SessionCookie>,
    dialogs_accepted: bool,
    next_task_no: u32,
    next_record_no: u32,
    parents: Vec<ParentRecord>,
    routines: Vec<RoutineRecord>,
    active_screen: Screen,
    views: HashMap<Screen, ViewState>,
    creation: Option<CreationForm>,
    routine_edit: Option<RoutineEditForm>,
    /// Selected assignees; survives closing the form like the real widget.
    chips: Vec<String>,
    journal: Vec<FakeEvent>,
}

impl Default for FakeRoutineApp {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FakeRoutineApp {
    pub fn builder() -> FakeRoutineAppBuilder {
        FakeRoutineAppBuilder::default()
    }

    pub fn journal(&self) -> &[FakeEvent] {
        &self.journal
    }

    pub fn parents(&self) -> &[ParentRecord] {
        &self.parents
    }

    pub fn routines(&self) -> &[RoutineRecord] {
        &self.routines
    }

    pub fn session_cookie(&self) -> Option<&SessionCookie> {
        self.cookie.as_ref()
    }

    pub fn dialogs_accepted(&self) -> bool {
        self.dialogs_accepted
    }

    /// Add an unrelated routine row to pad out the routines screen.
    pub fn seed_routine(&mut self, title: &str) {
        let record_no = self.next_record_no;
        self.next_record_no += 1;
        self.routines.push(RoutineRecord {
            record_no,
            task_no: FILLER_TASK_NO,
            title: title.to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 6).unwrap_or_default(),
            assignees: Vec::new(),
            status: STATUS_OPTIONS[0].to_string(),
            summary: String::new(),
            completed: false,
        });
    }

    /// Add an unrelated, incomplete parent with no routines.
    pub fn seed_parent(&mut self, title: &str) {
        let task_no = self.next_task_no;
        self.next_task_no += 1;
        self.parents.push(ParentRecord {
            task_no,
            title: title.to_string(),
            summary: String::new(),
            frequency: Frequency::Spot,
            kind: TaskKind::Individual,
            schedule: Schedule::Spot {
                due_date: NaiveDate::from_ymd_opt(2026, 2, 6).unwrap_or_default(),
            },
            assignees: Vec::new(),
            completed: false,
        });
    }

    pub fn page(&self, screen: Screen) -> usize {
        self.clamped_page(screen)
    }

    pub fn set_page(&mut self, screen: Screen, page: usize) {
        self.view_mut(screen).page = page;
    }

    pub fn filters(&self, screen: Screen) -> FilterState {
        self.view(screen).applied.clone()
    }

    /// Set both the filter inputs and the applied filter.
    pub fn set_filters(&mut self, screen: Screen, filters: FilterState) {
        let view = self.view_mut(screen);
        view.pending = filters.clone();
        view.applied = filters;
    }

    /// Make the pagination controls never disable and never move.
    pub fn break_pagination(&mut self, screen: Screen) {
        self.view_mut(screen).broken_pagination = true;
    }

    pub fn page_clicks(&self, screen: Screen, step: PageStep) -> usize {
        let view = self.view(screen);
        match step {
            PageStep::Previous => view.prev_clicks,
            PageStep::Next => view.next_clicks,
        }
    }

    fn view(&self, screen: Screen) -> &ViewState {
        // Both screens are inserted by the builder.
        &self.views[&screen]
    }

    fn view_mut(&mut self, screen: Screen) -> &mut ViewState {
        self.views.entry(screen).or_default()
    }

    fn option_values(&self) -> Vec<String> {
        let mut options = vec![
            String::new(),
            "担当者を選択".to_string(),
            ALL_EMPLOYEES_SENTINEL.to_string(),
        ];
        options.extend(self.employees.iter().cloned());
        options
    }

    fn filtered_rows(&self, screen: Screen) -> Vec<RowRef> {
        let filters = &self.view(screen).applied;
        match screen {
            Screen::Parents => {
                let mut rows: Vec<usize> = self
                    .parents
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| !p.completed && filters.admits(p.anchor_date(), &p.assignees))
                    .map(|(i, _)| i)
                    .collect();
                // Newest first.
                rows.sort_by_key(|&i| std::cmp::Reverse(self.parents[i].task_no));
                rows.into_iter().map(RowRef::Parent).collect()
            }
            Screen::Routines => self
                .routines
                .iter()
                .enumerate()
                .filter(|(_, r)| !r.completed && filters.admits(r.due_date, &r.assignees))
                .map(|(i, _)| RowRef::Routine(i))
                .collect(),
        }
    }

    fn page_count(&self, screen: Screen) -> usize {
        self.filtered_rows(screen).len().div_ceil(self.page_size).max(1)
    }

    fn clamped_page(&self, screen: Screen) -> usize {
        self.view(screen).page.min(self.page_count(screen) - 1)
    }

    fn page_rows(&self, screen: Screen) -> Vec<RowRef> {
        let page = self.clamped_page(screen);
        self.filtered_rows(screen)
            .into_iter()
            .skip(page * self.page_size)
            .take(self.page_size)
            .collect()
    }

    fn row_text(&self, row: RowRef) -> String {
        match row {
            RowRef::Parent(i) => self.parents[i].row_text(),
            RowRef::Routine(i) => self.routines[i].row_text(),
        }
    }

    fn row_matches(&self, row: RowRef, matcher: &RowMatcher) -> bool {
        match matcher {
            RowMatcher::Text(needle) => self.row_text(row).contains(needle.as_str()),
            RowMatcher::TaskNo(no) => match row {
                RowRef::Parent(i) => self.parents[i].task_no.to_string() == *no,
                RowRef::Routine(_) => false,
            },
        }
    }

    fn matching_rows(&self, query: &RowQuery) -> Vec<RowRef> {
        self.page_rows(query.screen)
            .into_iter()
            .filter(|row| self.row_matches(*row, &query.matcher))
            .collect()
    }

    fn first_match(&self, query: &RowQuery) -> Result<RowRef, DriverError> {
        self.matching_rows(query)
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(query.to_string()))
    }

    fn require_screen(&self, query: &RowQuery) -> Result<(), DriverError> {
        if self.active_screen != query.screen || self.any_overlay_open() {
            return Err(DriverError::NotInteractable(query.to_string()));
        }
        Ok(())
    }

    fn any_overlay_open(&self) -> bool {
        self.creation.is_some() || self.routine_edit.is_some()
    }

    fn creation_form(&mut self) -> Result<&mut CreationForm, DriverError> {
        self.creation
            .as_mut()
            .ok_or_else(|| DriverError::NotInteractable("creation form is hidden".to_string()))
    }

    fn routine_form(&mut self) -> Result<&mut RoutineEditForm, DriverError> {
        self.routine_edit
            .as_mut()
            .ok_or_else(|| DriverError::NotInteractable("routine edit form is hidden".to_string()))
    }

    fn set_field(&mut self, form: Form, field: Field, value: String) -> Result<(), DriverError> {
        match form {
            Form::Creation => {
                self.creation_form()?.fields.insert(field, value);
            }
            Form::RoutineEdit => {
                let edit = self.routine_form()?;
                match field {
                    Field::Summary => edit.summary = value,
                    Field::Status => {
                        let index = value.parse::<usize>().map_err(|_| {
                            DriverError::Script(format!("status index '{value}' is not numeric"))
                        })?;
                        edit.status = Some(index);
                    }
                    other => {
                        return Err(DriverError::ElementNotFound(format!(
                            "routine edit field {}",
                            other.name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn reject(&mut self, reason: impl Into<String>) {
        self.journal.push(FakeEvent::Rejected {
            reason: reason.into(),
        });
    }

    fn submit_creation(&mut self) {
        let Some(form) = self.creation.clone() else {
            return;
        };
        match form.mode {
            FormMode::Create => match self.parse_new_parent(&form) {
                Ok(parent) => {
                    self.insert_parent(parent);
                    self.creation = None;
                }
                Err(reason) => self.reject(reason),
            },
            FormMode::EditParent(task_no) => {
                let title = form.fields.get(&Field::Title).cloned().unwrap_or_default();
                let summary = form.fields.get(&Field::Summary).cloned().unwrap_or_default();
                if title.trim().is_empty() {
                    self.reject("title is required");
                    return;
                }
                if let Some(parent) = self.parents.iter_mut().find(|p| p.task_no == task_no) {
                    parent.title = title.clone();
                    parent.summary = summary.clone();
                }
                self.journal.push(FakeEvent::ParentUpdated {
                    task_no,
                    title,
                    summary,
                });
                self.creation = None;
            }
        }
    }

    fn parse_new_parent(&self, form: &CreationForm) -> Result<ParentRecord, String> {
        let field = |f: Field| form.fields.get(&f).map(String::as_str).unwrap_or("");

        let title = field(Field::Title).trim().to_string();
        if title.is_empty() {
            return Err("title is required".to_string());
        }
        let kind = match field(Field::TaskKind) {
            "" | "0" => TaskKind::Individual,
            "1" => TaskKind::Group,
            other => return Err(format!("unknown task kind option {other}")),
        };
        let frequency = match field(Field::Frequency) {
            "1" => Frequency::Spot,
            "2" => Frequency::Weekly,
            "3" => Frequency::Monthly,
            "4" => Frequency::Quarterly,
            "6" => Frequency::Yearly,
            other => return Err(format!("unsupported frequency option '{other}'")),
        };
        let assignees = self.chips.clone();
        if kind == TaskKind::Group && assignees.len() < 2 {
            return Err("group tasks need at least two assignees".to_string());
        }

        let schedule = if frequency == Frequency::Spot {
            let due_date = NaiveDate::parse_from_str(field(Field::DueDate), "%Y-%m-%d")
                .map_err(|_| "due_date is required for spot tasks".to_string())?;
            Schedule::Spot { due_date }
        } else {
            let start_month: YearMonth = field(Field::StartMonth).parse().map_err(|e| format!("{e}"))?;
            let end_month: YearMonth = field(Field::EndMonth).parse().map_err(|e| format!("{e}"))?;
            if end_month < start_month {
                return Err("end_month must be the same or after start_month".to_string());
            }
            let week_of_month = match field(Field::Week) {
                "" if frequency == Frequency::Weekly => 1,
                "" => return Err("week number is required when not a spot task".to_string()),
                raw => raw
                    .parse::<u8>()
                    .ok()
                    .filter(|w| (1..=4).contains(w))
                    .ok_or_else(|| "week number must be between 1 and 4".to_string())?,
            };
            Schedule::Window {
                week_of_month,
                start_month,
                end_month,
            }
        };

        Ok(ParentRecord {
            task_no: self.next_task_no,
            title,
            summary: String::new(),
            frequency,
            kind,
            schedule,
            assignees,
            completed: false,
        })
    }

    fn insert_parent(&mut self, parent: ParentRecord) {
        let dropped = self
            .faults
            .drop_routines_for
            .as_deref()
            .is_some_and(|needle| parent.title.contains(needle));
        let due_dates = if dropped {
            Vec::new()
        } else {
            expected_instances(parent.frequency, &parent.schedule)
        };

        for due_date in &due_dates {
            let record_no = self.next_record_no;
            self.next_record_no += 1;
            self.routines.push(RoutineRecord {
                record_no,
                task_no: parent.task_no,
                title: parent.title.clone(),
                due_date: *due_date,
                assignees: parent.assignees.clone(),
                status: STATUS_OPTIONS[0].to_string(),
                summary: String::new(),
                completed: false,
            });
        }

        self.journal.push(FakeEvent::Created {
            task_no: parent.task_no,
            title: parent.title.clone(),
            assignees: parent.assignees.clone(),
            instances: due_dates.len(),
        });
        self.next_task_no += 1;
        self.parents.push(parent);
    }

    fn submit_routine_edit(&mut self) {
        let Some(edit) = self.routine_edit.clone() else {
            return;
        };
        let Some(status) = edit.status.and_then(|i| STATUS_OPTIONS.get(i)) else {
            self.reject("status option out of range");
            return;
        };
        if let Some(routine) = self.routines.iter_mut().find(|r| r.record_no == edit.record_no) {
            routine.status = status.to_string();
            routine.summary = edit.summary.clone();
        }
        self.journal.push(FakeEvent::RoutineUpdated {
            record_no: edit.record_no,
            status: status.to_string(),
            summary: edit.summary,
        });
        self.routine_edit = None;
    }

    fn complete_routine(&mut self, index: usize) {
        let (record_no, task_no) = {
            let routine = &mut self.routines[index];
            routine.completed = true;
            (routine.record_no, routine.task_no)
        };
        self.journal.push(FakeEvent::RoutineCompleted { record_no });

        if !self.auto_complete_parent {
            return;
        }
        let all_done = self
            .routines
            .iter()
            .filter(|r| r.task_no == task_no)
            .all(|r| r.completed);
        if !all_done {
            return;
        }
        if let Some(parent) = self.parents.iter_mut().find(|p| p.task_no == task_no) {
            parent.completed = true;
            self.journal.push(FakeEvent::ParentCompleted {
                task_no,
                automatic: true,
            });
        }
    }

    fn complete_parent(&mut self, index: usize) {
        let task_no = {
            let parent = &mut self.parents[index];
            parent.completed = true;
            parent.task_no
        };
        for routine in self.routines.iter_mut().filter(|r| r.task_no == task_no) {
            routine.completed = true;
        }
        self.journal.push(FakeEvent::ParentCompleted {
            task_no,
            automatic: false,
        });
    }

    fn logged_in(&self) -> bool {
        match (&self.session_token, &self.cookie) {
            (None, _) => true,
            (Some(expected), Some(cookie)) => cookie.name == "session" && cookie.value == *expected,
            (Some(_), None) => false,
        }
    }
}

impl RoutineUi for FakeRoutineApp {
    async fn accept_dialogs(&mut self) -> Result<(), DriverError> {
        self.dialogs_accepted = true;
        Ok(())
    }

    async fn add_session_cookie(&mut self, cookie: &SessionCookie) -> Result<(), DriverError> {
        self.cookie = Some(cookie.clone());
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), DriverError> {
        self.url = if self.logged_in() {
            url.to_string()
        } else {
            FAKE_LOGIN_URL.to_string()
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.url.clone())
    }

    async fn app_ready(&self) -> Result<bool, DriverError> {
        Ok(self.logged_in() && !self.faults.shell_missing)
    }

    async fn create_button_visible(&self) -> Result<bool, DriverError> {
        Ok(!self.faults.shell_missing && !self.any_overlay_open())
    }

    async fn click_create_button(&mut self) -> Result<(), DriverError> {
        if self.faults.shell_missing || self.any_overlay_open() {
            return Err(DriverError::NotInteractable("#open-create-btn".to_string()));
        }
        self.trigger_create_button().await
    }

    async fn trigger_create_button(&mut self) -> Result<(), DriverError> {
        if self.faults.shell_missing {
            return Err(DriverError::ElementNotFound("#open-create-btn".to_string()));
        }
        self.creation = Some(CreationForm {
            mode: FormMode::Create,
            fields: HashMap::new(),
        });
        Ok(())
    }

    async fn overlay_open(&self, overlay: Overlay) -> Result<bool, DriverError> {
        Ok(match overlay {
            Overlay::Creation => self.creation.is_some(),
            Overlay::RoutineEdit => self.routine_edit.is_some(),
        })
    }

    async fn fill(&mut self, form: Form, field: Field, value: &str) -> Result<(), DriverError> {
        self.set_field(form, field, value.to_string())
    }

    async fn set_value(
        &mut self,
        form: Form,
        field: Field,
        value: &str,
    ) -> Result<(), DriverError> {
        self.set_field(form, field, value.to_string())
    }

    async fn select_index(
        &mut self,
        form: Form,
        field: Field,
        index: usize,
    ) -> Result<(), DriverError> {
        self.set_field(form, field, index.to_string())
    }

    async fn select_value(
        &mut self,
        form: Form,
        field: Field,
        value: &str,
    ) -> Result<(), DriverError> {
        self.set_field(form, field, value.to_string())
    }

    async fn field_enabled(&self, form: Form, field: Field) -> Result<bool, DriverError> {
        let Some(creation) = self.creation.as_ref().filter(|_| form == Form::Creation) else {
            return Ok(self.routine_edit.is_some());
        };
        if field == Field::Week {
            // Week is meaningless for spot tasks.
            let frequency = creation.fields.get(&Field::Frequency).map(String::as_str);
            return Ok(frequency != Some("1"));
        }
        Ok(true)
    }

    async fn submit(&mut self, form: Form) -> Result<(), DriverError> {
        match form {
            Form::Creation => {
                self.creation_form()?;
                self.submit_creation();
            }
            Form::RoutineEdit => {
                self.routine_form()?;
                self.submit_routine_edit();
            }
        }
        Ok(())
    }

    async fn assignee_select_attached(&self) -> Result<bool, DriverError> {
        Ok(!self.faults.shell_missing)
    }

    async fn assignee_options(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.option_values())
    }

    async fn assignee_chip_count(&self) -> Result<usize, DriverError> {
        Ok(self.chips.len())
    }

    async fn remove_first_assignee_chip(&mut self) -> Result<(), DriverError> {
        if self.chips.is_empty() {
            return Err(DriverError::ElementNotFound("[data-remove-assignee]".to_string()));
        }
        self.chips.remove(0);
        Ok(())
    }

    async fn select_assignee(&mut self, name: &str) -> Result<(), DriverError> {
        self.creation_form()?;
        if !self.employees.iter().any(|e| e == name) {
            return Err(DriverError::ElementNotFound(format!("assignee option '{name}'")));
        }
        if !self.faults.swallow_assignee_selection && !self.chips.iter().any(|c| c == name) {
            self.chips.push(name.to_string());
        }
        Ok(())
    }

    async fn assignee_field_value(&self) -> Result<String, DriverError> {
        Ok(self.chips.join("; "))
    }

    async fn screen_tab_visible(&self, _screen: Screen) -> Result<bool, DriverError> {
        Ok(!self.any_overlay_open())
    }

    async fn screen_tab_disabled(&self, screen: Screen) -> Result<bool, DriverError> {
        Ok(self.active_screen == screen)
    }

    async fn click_screen_tab(&mut self, screen: Screen) -> Result<(), DriverError> {
        if self.active_screen == screen {
            return Err(DriverError::NotInteractable(format!(
                "[data-screen=\"{screen}\"] is disabled"
            )));
        }
        self.active_screen = screen;
        Ok(())
    }

    async fn clear_filters(&mut self, screen: Screen) -> Result<(), DriverError> {
        self.view_mut(screen).pending = FilterState::default();
        Ok(())
    }

    async fn has_filter_button(&self, _screen: Screen) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn click_filter_button(&mut self, screen: Screen) -> Result<(), DriverError> {
        let view = self.view_mut(screen);
        view.applied = view.pending.clone();
        view.page = 0;
        Ok(())
    }

    async fn page_control_disabled(
        &self,
        screen: Screen,
        step: PageStep,
    ) -> Result<bool, DriverError> {
        if self.view(screen).broken_pagination {
            return Ok(false);
        }
        let page = self.clamped_page(screen);
        Ok(match step {
            PageStep::Previous => page == 0,
            PageStep::Next => page + 1 >= self.page_count(screen),
        })
    }

    async fn click_page_control(
        &mut self,
        screen: Screen,
        step: PageStep,
    ) -> Result<(), DriverError> {
        let page = self.clamped_page(screen);
        let last = self.page_count(screen) - 1;
        let view = self.view_mut(screen);
        match step {
            PageStep::Previous => view.prev_clicks += 1,
            PageStep::Next => view.next_clicks += 1,
        }
        if view.broken_pagination {
            return Ok(());
        }
        view.page = match step {
            PageStep::Previous => page.saturating_sub(1),
            PageStep::Next => (page + 1).min(last),
        };
        Ok(())
    }

    async fn row_count(&self, query: &RowQuery) -> Result<usize, DriverError> {
        Ok(self.matching_rows(query).len())
    }

    async fn row_visible(&self, query: &RowQuery) -> Result<bool, DriverError> {
        Ok(self.active_screen == query.screen
            && !self.any_overlay_open()
            && !self.matching_rows(query).is_empty())
    }

    async fn click_row(&mut self, query: &RowQuery) -> Result<(), DriverError> {
        self.require_screen(query)?;
        match self.first_match(query)? {
            RowRef::Routine(i) => {
                self.routine_edit = Some(RoutineEditForm {
                    record_no: self.routines[i].record_no,
                    status: None,
                    summary: self.routines[i].summary.clone(),
                });
                Ok(())
            }
            RowRef::Parent(_) => Ok(()),
        }
    }

    async fn row_task_no(&self, query: &RowQuery) -> Result<String, DriverError> {
        match self.first_match(query)? {
            RowRef::Parent(i) => Ok(self.parents[i].task_no.to_string()),
            RowRef::Routine(_) => Err(DriverError::ElementNotFound(format!(
                "{query}: button.parent-edit-trigger"
            ))),
        }
    }

    async fn click_edit_trigger(&mut self, query: &RowQuery) -> Result<(), DriverError> {
        match self.first_match(query)? {
            RowRef::Parent(i) => {
                let parent = &self.parents[i];
                let mut fields = HashMap::new();
                fields.insert(Field::Title, parent.title.clone());
                fields.insert(Field::Summary, parent.summary.clone());
                self.creation = Some(CreationForm {
                    mode: FormMode::EditParent(parent.task_no),
                    fields,
                });
                Ok(())
            }
            RowRef::Routine(_) => Err(DriverError::ElementNotFound(format!(
                "{query}: button.parent-edit-trigger"
            ))),
        }
    }

    async fn check_completion(&mut self, query: &RowQuery) -> Result<(), DriverError> {
        match self.first_match(query)? {
            RowRef::Routine(i) => self.complete_routine(i),
            RowRef::Parent(i) => self.complete_parent(i),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_monthly(app: &mut FakeRoutineApp, title: &str) {
        let form = app.creation.as_mut().unwrap();
        form.fields.insert(Field::Title, title.to_string());
        form.fields.insert(Field::TaskKind, "0".to_string());
        form.fields.insert(Field::Frequency, "3".to_string());
        form.fields.insert(Field::StartMonth, "2026-02".to_string());
        form.fields.insert(Field::EndMonth, "2026-04".to_string());
        form.fields.insert(Field::Week, "4".to_string());
    }

    #[tokio::test]
    async fn test_create_generates_instances() {
        let mut app = FakeRoutineApp::default();
        app.trigger_create_button().await.unwrap();
        fill_monthly(&mut app, "monthly-a");
        app.select_assignee("Mori Aoi").await.unwrap();
        app.submit(Form::Creation).await.unwrap();

        assert!(!app.overlay_open(Overlay::Creation).await.unwrap());
        assert_eq!(app.parents().len(), 1);
        assert_eq!(app.routines().len(), 3);
        assert!(matches!(
            app.journal()[0],
            FakeEvent::Created { instances: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_group_without_two_assignees_is_rejected() {
        let mut app = FakeRoutineApp::default();
        app.trigger_create_button().await.unwrap();
        fill_monthly(&mut app, "group-a");
        app.select_index(Form::Creation, Field::TaskKind, 1).await.unwrap();
        app.select_assignee("Mori Aoi").await.unwrap();
        app.submit(Form::Creation).await.unwrap();

        assert!(app.overlay_open(Overlay::Creation).await.unwrap());
        assert!(matches!(app.journal()[0], FakeEvent::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_chips_survive_form_reopen() {
        let mut app = FakeRoutineApp::default();
        app.trigger_create_button().await.unwrap();
        fill_monthly(&mut app, "chips");
        app.select_assignee("Mori Aoi").await.unwrap();
        app.submit(Form::Creation).await.unwrap();

        app.trigger_create_button().await.unwrap();
        assert_eq!(app.assignee_chip_count().await.unwrap(), 1);
        assert_eq!(app.assignee_field_value().await.unwrap(), "Mori Aoi");
    }

    #[tokio::test]
    async fn test_session_redirect_without_token() {
        let mut app = FakeRoutineApp::builder().session_token("good").build();
        app.goto("https://mercury/routine_app/").await.unwrap();
        assert_eq!(app.current_url().await.unwrap(), FAKE_LOGIN_URL);
        assert!(!app.app_ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_pagination_controls() {
        let mut app = FakeRoutineApp::builder().page_size(2).build();
        for i in 0..5 {
            app.seed_routine(&format!("r{i}"));
        }
        assert!(app.page_control_disabled(Screen::Routines, PageStep::Previous).await.unwrap());
        assert!(!app.page_control_disabled(Screen::Routines, PageStep::Next).await.unwrap());
        app.click_page_control(Screen::Routines, PageStep::Next).await.unwrap();
        app.click_page_control(Screen::Routines, PageStep::Next).await.unwrap();
        app.click_page_control(Screen::Routines, PageStep::Next).await.unwrap();
        assert_eq!(app.page(Screen::Routines), 2);
        assert!(app.page_control_disabled(Screen::Routines, PageStep::Next).await.unwrap());
    }

    #[tokio::test]
    async fn test_week_disabled_for_spot() {
        let mut app = FakeRoutineApp::default();
        app.trigger_create_button().await.unwrap();
        app.select_index(Form::Creation, Field::Frequency, 1).await.unwrap();
        assert!(!app.field_enabled(Form::Creation, Field::Week).await.unwrap());
        app.select_index(Form::Creation, Field::Frequency, 2).await.unwrap();
        assert!(app.field_enabled(Form::Creation, Field::Week).await.unwrap());
    }
}
