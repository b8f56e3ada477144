//! Session bootstrap: cookie injection, first navigation, redirect check.
//!
//! Authentication itself happens outside the tool. A run either carries a
//! pre-issued session cookie or is skipped.

use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::poll::{Timeouts, wait_until};
use crate::ui::{RoutineUi, SessionCookie};

/// Cookie carrying the application session.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Host the application redirects to when the session is not accepted.
pub const LOGIN_REDIRECT_MARKER: &str = "login.microsoftonline.com";

/// Whether a run can proceed with the configured session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPlan {
    /// No usable cookie; the run is skipped, not failed.
    Skip { reason: String },
    Inject(SessionCookie),
}

/// Host part of an `http(s)://host[:port]/path` URL.
pub fn host_of(base_url: &str) -> E2eResult<String> {
    let rest = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| E2eError::Config(format!("base URL '{base_url}' has no scheme")))?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host_port
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map_or(host_port, |(host, _)| host);
    if host.is_empty() {
        return Err(E2eError::Config(format!("base URL '{base_url}' has no host")));
    }
    Ok(host.to_string())
}

/// Decide how to authenticate against `base_url` with an optional cookie value.
pub fn plan_session(base_url: &str, cookie_value: Option<&str>) -> E2eResult<SessionPlan> {
    let Some(value) = cookie_value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(SessionPlan::Skip {
            reason: "ROUTINE_SESSION_COOKIE is not set".to_string(),
        });
    };
    Ok(SessionPlan::Inject(SessionCookie {
        name: SESSION_COOKIE_NAME.to_string(),
        value: value.to_string(),
        domain: host_of(base_url)?,
        path: "/".to_string(),
        http_only: true,
        secure: true,
    }))
}

/// Inject the cookie, open the app and wait for its shell.
///
/// Dialogs are auto-accepted from here on.
pub async fn establish<U: RoutineUi>(
    ui: &mut U,
    base_url: &str,
    cookie: &SessionCookie,
    timeouts: &Timeouts,
) -> E2eResult<()> {
    ui.accept_dialogs().await?;
    ui.add_session_cookie(cookie).await?;
    debug!(domain = %cookie.domain, "Session cookie injected");

    tokio::time::timeout(timeouts.navigation, ui.goto(base_url))
        .await
        .map_err(|_| E2eError::Timeout {
            what: format!("navigation to {base_url}"),
            after: timeouts.navigation,
        })??;

    let url = ui.current_url().await?;
    if url.contains(LOGIN_REDIRECT_MARKER) {
        return Err(E2eError::InvalidSession { url });
    }

    let view: &U = ui;
    let policy = timeouts.attach();
    wait_until("app shell to render", policy, move || view.app_ready()).await?;
    info!(url = %url, "Session established");
    Ok(())
}
