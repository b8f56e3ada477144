//! Browser automation boundary.
//!
//! [`RoutineUi`] is the page-object contract the engine drives. It speaks in
//! terms of the application's screens, overlays, forms and list rows rather
//! than raw selectors, so the orchestration logic can run unchanged against
//! a real browser session or the in-memory [`FakeRoutineApp`].
//!
//! Queries take `&self` so they can be polled while no action is in flight;
//! actions take `&mut self`.
//!
//! [`FakeRoutineApp`]: crate::fake_app::FakeRoutineApp

use std::fmt;

use crate::error::DriverError;

/// Top-level list screens reachable through the `data-screen` tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Parents,
    Routines,
}

impl Screen {
    /// Value of the tab's `data-screen` attribute.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parents => "parents",
            Self::Routines => "routines",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modal surfaces whose visibility is signalled by a `hidden` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    /// Shared by record creation and parent editing.
    Creation,
    /// Routine-instance editor.
    RoutineEdit,
}

impl fmt::Display for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creation => f.write_str("creation overlay"),
            Self::RoutineEdit => f.write_str("routine edit overlay"),
        }
    }
}

/// Forms hosted by the overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Creation,
    RoutineEdit,
}

/// Named inputs of the forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    TaskKind,
    Frequency,
    DueDate,
    StartMonth,
    EndMonth,
    Week,
    Summary,
    Status,
}

impl Field {
    /// Value of the input's `name` attribute.
    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::TaskKind => "task_kind",
            Self::Frequency => "frequency",
            Self::DueDate => "due_date",
            Self::StartMonth => "start_month",
            Self::EndMonth => "end_month",
            Self::Week => "week",
            Self::Summary => "summary",
            Self::Status => "status",
        }
    }
}

/// Pagination controls of a list screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    Previous,
    Next,
}

/// How a row is picked out of a list screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowMatcher {
    /// Row whose text content contains the needle.
    Text(String),
    /// Row whose edit trigger carries this `data-task-no`.
    TaskNo(String),
}

/// Lazy handle to a list row; resolved against the current page on every use,
/// first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub screen: Screen,
    pub matcher: RowMatcher,
}

impl RowQuery {
    pub fn text(screen: Screen, needle: impl Into<String>) -> Self {
        Self {
            screen,
            matcher: RowMatcher::Text(needle.into()),
        }
    }

    pub fn task_no(screen: Screen, task_no: impl Into<String>) -> Self {
        Self {
            screen,
            matcher: RowMatcher::TaskNo(task_no.into()),
        }
    }
}

impl fmt::Display for RowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            RowMatcher::Text(needle) => write!(f, "{} row containing '{}'", self.screen, needle),
            RowMatcher::TaskNo(no) => write!(f, "{} row with task_no={}", self.screen, no),
        }
    }
}

/// Authenticated session cookie injected before the first navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
}

/// Page-object contract for the routine application.
#[allow(async_fn_in_trait)]
pub trait RoutineUi {
    // -- session ----------------------------------------------------------

    /// Register a handler that accepts every alert/confirm dialog.
    async fn accept_dialogs(&mut self) -> Result<(), DriverError>;

    async fn add_session_cookie(&mut self, cookie: &SessionCookie) -> Result<(), DriverError>;

    async fn goto(&mut self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Whether the create button is attached, i.e. the app shell rendered.
    async fn app_ready(&self) -> Result<bool, DriverError>;

    // -- overlays and forms -----------------------------------------------

    async fn create_button_visible(&self) -> Result<bool, DriverError>;

    async fn click_create_button(&mut self) -> Result<(), DriverError>;

    /// Fire the create button's click handler from script, for when the
    /// button is attached but scrolled or styled out of view.
    async fn trigger_create_button(&mut self) -> Result<(), DriverError>;

    async fn overlay_open(&self, overlay: Overlay) -> Result<bool, DriverError>;

    /// Type into a text input, replacing its content.
    async fn fill(&mut self, form: Form, field: Field, value: &str) -> Result<(), DriverError>;

    /// Assign a value directly and dispatch `input` and `change`; used for
    /// date and month inputs.
    async fn set_value(&mut self, form: Form, field: Field, value: &str)
    -> Result<(), DriverError>;

    async fn select_index(&mut self, form: Form, field: Field, index: usize)
    -> Result<(), DriverError>;

    async fn select_value(&mut self, form: Form, field: Field, value: &str)
    -> Result<(), DriverError>;

    async fn field_enabled(&self, form: Form, field: Field) -> Result<bool, DriverError>;

    async fn submit(&mut self, form: Form) -> Result<(), DriverError>;

    // -- assignees ----------------------------------------------------------

    async fn assignee_select_attached(&self) -> Result<bool, DriverError>;

    /// Raw option values of the assignee select, placeholders included.
    async fn assignee_options(&self) -> Result<Vec<String>, DriverError>;

    async fn assignee_chip_count(&self) -> Result<usize, DriverError>;

    async fn remove_first_assignee_chip(&mut self) -> Result<(), DriverError>;

    async fn select_assignee(&mut self, name: &str) -> Result<(), DriverError>;

    /// Current value of the form's hidden assignee field.
    async fn assignee_field_value(&self) -> Result<String, DriverError>;

    // -- navigation -------------------------------------------------------

    async fn screen_tab_visible(&self, screen: Screen) -> Result<bool, DriverError>;

    /// The tab of the active screen is rendered disabled.
    async fn screen_tab_disabled(&self, screen: Screen) -> Result<bool, DriverError>;

    async fn click_screen_tab(&mut self, screen: Screen) -> Result<(), DriverError>;

    // -- list screens -----------------------------------------------------

    /// Reset year, month and assignee filters to their empty value.
    async fn clear_filters(&mut self, screen: Screen) -> Result<(), DriverError>;

    async fn has_filter_button(&self, screen: Screen) -> Result<bool, DriverError>;

    async fn click_filter_button(&mut self, screen: Screen) -> Result<(), DriverError>;

    async fn page_control_disabled(&self, screen: Screen, step: PageStep)
    -> Result<bool, DriverError>;

    async fn click_page_control(&mut self, screen: Screen, step: PageStep)
    -> Result<(), DriverError>;

    /// Number of rows on the current page matching the query.
    async fn row_count(&self, query: &RowQuery) -> Result<usize, DriverError>;

    async fn row_visible(&self, query: &RowQuery) -> Result<bool, DriverError>;

    async fn click_row(&mut self, query: &RowQuery) -> Result<(), DriverError>;

    /// Text of the row's edit trigger, which is the task number.
    async fn row_task_no(&self, query: &RowQuery) -> Result<String, DriverError>;

    async fn click_edit_trigger(&mut self, query: &RowQuery) -> Result<(), DriverError>;

    /// Tick the row's completion checkbox, bypassing visibility checks.
    async fn check_completion(&mut self, query: &RowQuery) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_query_display() {
        let q = RowQuery::text(Screen::Routines, "routine update O-01");
        assert_eq!(q.to_string(), "routines row containing 'routine update O-01'");
        let q = RowQuery::task_no(Screen::Parents, "1042");
        assert_eq!(q.to_string(), "parents row with task_no=1042");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(Field::TaskKind.name(), "task_kind");
        assert_eq!(Field::StartMonth.name(), "start_month");
        assert_eq!(Screen::Parents.as_str(), "parents");
    }
}
