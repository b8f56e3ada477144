//! Chrome DevTools backend for [`RoutineUi`].
//!
//! Every query and action is a small DOM script evaluated in the page; the
//! selectors below are the application's markup contract.

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use routine_e2e_common::error::DriverError;
use routine_e2e_common::ui::{
    Field, Form, Overlay, PageStep, RoutineUi, RowMatcher, RowQuery, Screen, SessionCookie,
};

const CREATE_BUTTON: &str = "#open-create-btn";
const ASSIGNEE_SELECT: &str = "#creation-assignee-select";
const ASSIGNEE_CHIPS: &str = "#creation-assignee-list [data-remove-assignee]";
const ASSIGNEE_FIELD: &str = "#routine-form [name=\"assignee\"]";
const EDIT_TRIGGER: &str = "button.parent-edit-trigger";

fn cdp(err: CdpError) -> DriverError {
    DriverError::Protocol(err.to_string())
}

/// JavaScript string literal for `value`.
fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn form_selector(form: Form) -> &'static str {
    match form {
        Form::Creation => "#routine-form",
        Form::RoutineEdit => "#routine-edit-form",
    }
}

fn field_selector(form: Form, field: Field) -> String {
    format!("{} [name=\"{}\"]", form_selector(form), field.name())
}

fn overlay_selector(overlay: Overlay) -> &'static str {
    match overlay {
        Overlay::Creation => "#creation-overlay",
        Overlay::RoutineEdit => "#routine-edit-overlay",
    }
}

/// Id/name prefix of a list screen's controls.
fn screen_prefix(screen: Screen) -> &'static str {
    match screen {
        Screen::Parents => "parent",
        Screen::Routines => "routine",
    }
}

fn page_control_selector(screen: Screen, step: PageStep) -> String {
    let dir = match step {
        PageStep::Previous => "prev",
        PageStep::Next => "next",
    };
    format!("#{}-page-{dir}", screen_prefix(screen))
}

fn completion_checkbox(screen: Screen) -> &'static str {
    match screen {
        Screen::Parents => ".parent-complete-checkbox",
        Screen::Routines => ".routine-complete-checkbox",
    }
}

/// Expression evaluating to the matching rows of the current page.
fn rows_expr(query: &RowQuery) -> String {
    let body = format!("#{}-table-body tr", screen_prefix(query.screen));
    let filter = match &query.matcher {
        RowMatcher::Text(needle) => format!("r => r.textContent.includes({})", js_str(needle)),
        RowMatcher::TaskNo(no) => format!(
            "r => Array.from(r.querySelectorAll({})).some(b => b.dataset.taskNo === {})",
            js_str(EDIT_TRIGGER),
            js_str(no)
        ),
    };
    format!(
        "Array.from(document.querySelectorAll({})).filter({filter})",
        js_str(&body)
    )
}

/// Browser session driving one page.
pub struct ChromiumUi {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    dialogs: Option<JoinHandle<()>>,
}

impl ChromiumUi {
    /// Launch Chromium (certificate errors ignored) and open a blank page.
    pub async fn launch(headless: bool) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder().arg("--ignore-certificate-errors");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Protocol)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp)?;
        debug!(headless, "Browser launched");
        Ok(Self {
            browser,
            page,
            handler,
            dialogs: None,
        })
    }

    pub async fn close(mut self) {
        if let Some(dialogs) = self.dialogs.take() {
            dialogs.abort();
        }
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, DriverError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    /// Run `body` against the first element matching `selector`; `el` is
    /// bound inside `body`. Missing elements are reported as not found.
    async fn with_element(&self, selector: &str, body: &str) -> Result<(), DriverError> {
        let found: bool = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); if (!el) return false; {body}; return true; }})()",
                js_str(selector)
            ))
            .await?;
        if found {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(selector.to_string()))
        }
    }

    async fn query_element<T: DeserializeOwned>(
        &self,
        selector: &str,
        expr: &str,
        missing: &str,
    ) -> Result<T, DriverError> {
        self.eval(format!(
            "(() => {{ const el = document.querySelector({}); return el ? ({expr}) : {missing}; }})()",
            js_str(selector)
        ))
        .await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, DriverError> {
        self.query_element(
            selector,
            "!!(el.offsetWidth || el.offsetHeight || el.getClientRects().length)",
            "false",
        )
        .await
    }

    /// Run `body` against the first row matching `query` (bound as `row`).
    async fn with_row(&self, query: &RowQuery, body: &str) -> Result<(), DriverError> {
        let found: bool = self
            .eval(format!(
                "(() => {{ const row = {}[0]; if (!row) return false; {body}; return true; }})()",
                rows_expr(query)
            ))
            .await?;
        if found {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(query.to_string()))
        }
    }
}

impl RoutineUi for ChromiumUi {
    async fn accept_dialogs(&mut self) -> Result<(), DriverError> {
        let mut events = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(cdp)?;
        let page = self.page.clone();
        self.dialogs = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                debug!(message = %event.message, "Accepting dialog");
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                    warn!(error = %e, "Failed to accept dialog");
                }
            }
        }));
        Ok(())
    }

    async fn add_session_cookie(&mut self, cookie: &SessionCookie) -> Result<(), DriverError> {
        let param = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .domain(cookie.domain.clone())
            .path(cookie.path.clone())
            .http_only(cookie.http_only)
            .secure(cookie.secure)
            .same_site(CookieSameSite::Lax)
            .build()
            .map_err(DriverError::Protocol)?;
        self.page.set_cookies(vec![param]).await.map_err(cdp)?;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.page.url().await.map_err(cdp)?.unwrap_or_default())
    }

    async fn app_ready(&self) -> Result<bool, DriverError> {
        self.query_element(CREATE_BUTTON, "true", "false").await
    }

    async fn create_button_visible(&self) -> Result<bool, DriverError> {
        self.is_visible(CREATE_BUTTON).await
    }

    async fn click_create_button(&mut self) -> Result<(), DriverError> {
        self.with_element(CREATE_BUTTON, "el.scrollIntoView(); el.click()")
            .await
    }

    async fn trigger_create_button(&mut self) -> Result<(), DriverError> {
        self.with_element(CREATE_BUTTON, "el.click()").await
    }

    async fn overlay_open(&self, overlay: Overlay) -> Result<bool, DriverError> {
        self.query_element(
            overlay_selector(overlay),
            "!el.classList.contains('hidden')",
            "false",
        )
        .await
    }

    async fn fill(&mut self, form: Form, field: Field, value: &str) -> Result<(), DriverError> {
        let body = format!(
            "el.focus(); el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}))",
            js_str(value)
        );
        self.with_element(&field_selector(form, field), &body).await
    }

    async fn set_value(
        &mut self,
        form: Form,
        field: Field,
        value: &str,
    ) -> Result<(), DriverError> {
        let body = format!(
            "el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}))",
            js_str(value)
        );
        self.with_element(&field_selector(form, field), &body).await
    }

    async fn select_index(
        &mut self,
        form: Form,
        field: Field,
        index: usize,
    ) -> Result<(), DriverError> {
        let body = format!(
            "el.selectedIndex = {index}; el.dispatchEvent(new Event('change', {{ bubbles: true }}))"
        );
        self.with_element(&field_selector(form, field), &body).await
    }

    async fn select_value(
        &mut self,
        form: Form,
        field: Field,
        value: &str,
    ) -> Result<(), DriverError> {
        let body = format!(
            "el.value = {}; el.dispatchEvent(new Event('change', {{ bubbles: true }}))",
            js_str(value)
        );
        self.with_element(&field_selector(form, field), &body).await
    }

    async fn field_enabled(&self, form: Form, field: Field) -> Result<bool, DriverError> {
        self.query_element(&field_selector(form, field), "!el.disabled", "false")
            .await
    }

    async fn submit(&mut self, form: Form) -> Result<(), DriverError> {
        let selector = format!("{} button[type=\"submit\"]", form_selector(form));
        self.with_element(&selector, "el.click()").await
    }

    async fn assignee_select_attached(&self) -> Result<bool, DriverError> {
        self.query_element(ASSIGNEE_SELECT, "true", "false").await
    }

    async fn assignee_options(&self) -> Result<Vec<String>, DriverError> {
        self.query_element(
            ASSIGNEE_SELECT,
            "Array.from(el.options).map(o => o.value)",
            "[]",
        )
        .await
    }

    async fn assignee_chip_count(&self) -> Result<usize, DriverError> {
        self.eval(format!(
            "document.querySelectorAll({}).length",
            js_str(ASSIGNEE_CHIPS)
        ))
        .await
    }

    async fn remove_first_assignee_chip(&mut self) -> Result<(), DriverError> {
        self.with_element(ASSIGNEE_CHIPS, "el.click()").await
    }

    async fn select_assignee(&mut self, name: &str) -> Result<(), DriverError> {
        let body = format!(
            "el.value = {}; el.dispatchEvent(new Event('change', {{ bubbles: true }}))",
            js_str(name)
        );
        self.with_element(ASSIGNEE_SELECT, &body).await
    }

    async fn assignee_field_value(&self) -> Result<String, DriverError> {
        self.query_element(ASSIGNEE_FIELD, "el.value", "''").await
    }

    async fn screen_tab_visible(&self, screen: Screen) -> Result<bool, DriverError> {
        self.is_visible(&format!("[data-screen=\"{screen}\"]")).await
    }

    async fn screen_tab_disabled(&self, screen: Screen) -> Result<bool, DriverError> {
        self.query_element(&format!("[data-screen=\"{screen}\"]"), "!!el.disabled", "false")
            .await
    }

    async fn click_screen_tab(&mut self, screen: Screen) -> Result<(), DriverError> {
        self.with_element(&format!("[data-screen=\"{screen}\"]"), "el.click()")
            .await
    }

    async fn clear_filters(&mut self, screen: Screen) -> Result<(), DriverError> {
        let prefix = screen_prefix(screen);
        let script = format!(
            "(() => {{ ['year', 'month', 'assignee'].forEach((k) => {{ \
               const el = document.querySelector(`[name=\"filter-{prefix}-${{k}}\"]`); \
               if (!el) return; el.value = ''; \
               el.dispatchEvent(new Event('change', {{ bubbles: true }})); }}); return true; }})()"
        );
        let _: bool = self.eval(script).await?;
        Ok(())
    }

    async fn has_filter_button(&self, screen: Screen) -> Result<bool, DriverError> {
        let selector = format!("#{}-filter-btn", screen_prefix(screen));
        self.query_element(&selector, "true", "false").await
    }

    async fn click_filter_button(&mut self, screen: Screen) -> Result<(), DriverError> {
        let selector = format!("#{}-filter-btn", screen_prefix(screen));
        self.with_element(&selector, "el.click()").await
    }

    async fn page_control_disabled(
        &self,
        screen: Screen,
        step: PageStep,
    ) -> Result<bool, DriverError> {
        // A missing control counts as disabled so scans terminate.
        self.query_element(&page_control_selector(screen, step), "!!el.disabled", "true")
            .await
    }

    async fn click_page_control(
        &mut self,
        screen: Screen,
        step: PageStep,
    ) -> Result<(), DriverError> {
        self.with_element(&page_control_selector(screen, step), "el.click()")
            .await
    }

    async fn row_count(&self, query: &RowQuery) -> Result<usize, DriverError> {
        self.eval(format!("{}.length", rows_expr(query))).await
    }

    async fn row_visible(&self, query: &RowQuery) -> Result<bool, DriverError> {
        self.eval(format!(
            "(() => {{ const row = {}[0]; return !!row && !!(row.offsetWidth || row.offsetHeight || row.getClientRects().length); }})()",
            rows_expr(query)
        ))
        .await
    }

    async fn click_row(&mut self, query: &RowQuery) -> Result<(), DriverError> {
        self.with_row(query, "row.scrollIntoView(); row.click()").await
    }

    async fn row_task_no(&self, query: &RowQuery) -> Result<String, DriverError> {
        let text: Option<String> = self
            .eval(format!(
                "(() => {{ const row = {}[0]; const b = row && row.querySelector({}); return b ? b.innerText.trim() : null; }})()",
                rows_expr(query),
                js_str(EDIT_TRIGGER)
            ))
            .await?;
        text.ok_or_else(|| DriverError::ElementNotFound(format!("{query}: {EDIT_TRIGGER}")))
    }

    async fn click_edit_trigger(&mut self, query: &RowQuery) -> Result<(), DriverError> {
        let body = format!(
            "const b = row.querySelector({}); if (!b) return false; b.click()",
            js_str(EDIT_TRIGGER)
        );
        self.with_row(query, &body).await
    }

    async fn check_completion(&mut self, query: &RowQuery) -> Result<(), DriverError> {
        let body = format!(
            "const cb = row.querySelector({}); if (!cb) return false; if (!cb.checked) cb.click()",
            js_str(completion_checkbox(query.screen))
        );
        self.with_row(query, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_str_escapes() {
        assert_eq!(js_str("a\"b"), "\"a\\\"b\"");
        assert_eq!(js_str("社員"), "\"社員\"");
    }

    #[test]
    fn test_selectors() {
        assert_eq!(field_selector(Form::Creation, Field::StartMonth), "#routine-form [name=\"start_month\"]");
        assert_eq!(page_control_selector(Screen::Routines, PageStep::Next), "#routine-page-next");
        let rows = rows_expr(&RowQuery::task_no(Screen::Parents, "1042"));
        assert!(rows.contains("#parent-table-body tr"));
        assert!(rows.contains("b.dataset.taskNo === \"1042\""));
    }
}
