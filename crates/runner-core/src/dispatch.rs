//! Mapping resolved actions onto driver commands.
//!
//! Dispatch never aborts a task: every driver-level failure is converted
//! into the action's `result` string and the step loop carries on.

use std::time::Duration;

use action_protocol::{Action, ActionKind, Bounds};
use perceiver_source::wait_for_ready;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uiscout_core_types::Platform;
use wd_adapter::{AdapterError, DriverSession};

use crate::apps::AppAliases;

/// Dispatch timing knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Settle time after activating an app.
    pub activate_settle: Duration,
    /// Readiness budget for a window a web click just opened.
    pub post_click_ready: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            activate_settle: Duration::from_millis(600),
            post_click_ready: Duration::from_secs(8),
        }
    }
}

enum Outcome {
    Success,
    /// Non-exception failure with its own wording.
    Failure(String),
    /// Terminal kinds carry no execution result.
    Recorded,
}

/// Execute a resolved action against its target session, attaching the
/// outcome to the action's `result` field.
pub async fn execute_action(
    session: &dyn DriverSession,
    action: &mut Action,
    apps: &AppAliases,
    config: &DispatchConfig,
) {
    let kind = action.kind.clone();
    match run_kind(session, &kind, apps, config).await {
        Ok(Outcome::Success) => action.set_result("success"),
        Ok(Outcome::Failure(message)) => action.set_result(message),
        Ok(Outcome::Recorded) => {}
        Err(err) => action.set_result(format!("exception: {err}")),
    }
}

async fn run_kind(
    session: &dyn DriverSession,
    kind: &ActionKind,
    apps: &AppAliases,
    config: &DispatchConfig,
) -> Result<Outcome, AdapterError> {
    match kind {
        ActionKind::Tap { bounds, xpath } => {
            let before = window_snapshot(session).await;
            let outcome = tap(session, bounds.as_deref(), xpath.as_deref()).await?;
            if matches!(outcome, Outcome::Success) {
                follow_new_window(session, before, config.post_click_ready).await;
            }
            Ok(outcome)
        }
        ActionKind::Input {
            value,
            bounds,
            xpath,
        } => input(session, value, bounds.as_deref(), xpath.as_deref()).await,
        ActionKind::Swipe {
            swipe_start_x,
            swipe_start_y,
            swipe_end_x,
            swipe_end_y,
            duration,
        } => {
            session
                .swipe(
                    *swipe_start_x,
                    *swipe_start_y,
                    *swipe_end_x,
                    *swipe_end_y,
                    *duration,
                )
                .await?;
            // Let the gesture and any triggered animation play out.
            sleep(Duration::from_millis(*duration)).await;
            Ok(Outcome::Success)
        }
        ActionKind::Navigate { url } => match url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                session.navigate(url).await?;
                Ok(Outcome::Success)
            }
            _ => Ok(Outcome::Failure(
                "exception: navigate requires a url".to_string(),
            )),
        },
        ActionKind::ActivateApp { .. } => match kind.app_id() {
            Some(raw) => {
                let app_id = apps.resolve(session.platform(), raw);
                debug!(%app_id, "activating app");
                session.activate_app(&app_id).await?;
                sleep(config.activate_settle).await;
                Ok(Outcome::Success)
            }
            None => Ok(Outcome::Failure(
                "exception: activate_app requires an app id".to_string(),
            )),
        },
        ActionKind::TerminateApp { .. } => match kind.app_id() {
            Some(raw) => {
                let app_id = apps.resolve(session.platform(), raw);
                session.terminate_app(&app_id).await?;
                Ok(Outcome::Success)
            }
            None => Ok(Outcome::Failure(
                "exception: terminate_app requires an app id".to_string(),
            )),
        },
        ActionKind::Wait { timeout } => {
            sleep(Duration::from_millis(*timeout)).await;
            Ok(Outcome::Success)
        }
        ActionKind::Finish | ActionKind::Error => Ok(Outcome::Recorded),
        ActionKind::Unknown { name } => {
            warn!(action = %name, "unknown action proposed");
            Ok(Outcome::Failure("unknown action".to_string()))
        }
    }
}

/// Handle set before a web click, `None` on native targets.
async fn window_snapshot(session: &dyn DriverSession) -> Option<Vec<String>> {
    if session.platform() != Platform::Web {
        return None;
    }
    match session.window_handles().await {
        Ok(handles) => Some(handles),
        Err(err) => {
            debug!(error = %err, "window handle snapshot failed");
            None
        }
    }
}

/// A web click may open a new window or tab while the session stays attached
/// to the old one. Switch to any handle that appeared so the next capture
/// sees the page the click produced.
async fn follow_new_window(
    session: &dyn DriverSession,
    before: Option<Vec<String>>,
    ready_budget: Duration,
) {
    let Some(before) = before else {
        return;
    };
    let after = match session.window_handles().await {
        Ok(handles) => handles,
        Err(err) => {
            debug!(error = %err, "window handle check failed after click");
            return;
        }
    };
    let Some(opened) = after.iter().find(|handle| !before.contains(handle)) else {
        return;
    };
    info!(handle = %opened, "click opened a new window, following it");
    if let Err(err) = session.switch_to_window(opened).await {
        warn!(error = %err, "could not switch to the new window");
        return;
    }
    wait_for_ready(session, ready_budget).await;
}

async fn tap(
    session: &dyn DriverSession,
    bounds: Option<&str>,
    xpath: Option<&str>,
) -> Result<Outcome, AdapterError> {
    if let Some(bounds) = bounds {
        let parsed: Bounds = bounds
            .parse()
            .map_err(|err| AdapterError::protocol(format!("{err}")))?;
        let (x, y) = parsed.midpoint();
        session.tap(x, y).await?;
        return Ok(Outcome::Success);
    }
    if let Some(xpath) = xpath {
        let elements = session.find_elements(xpath).await?;
        return match elements.first() {
            Some(id) => {
                session.click_element(id).await?;
                Ok(Outcome::Success)
            }
            None => Ok(Outcome::Failure(format!("can't find element {xpath}"))),
        };
    }
    Ok(Outcome::Failure(
        "exception: tap requires bounds or xpath".to_string(),
    ))
}

async fn input(
    session: &dyn DriverSession,
    value: &str,
    bounds: Option<&str>,
    xpath: Option<&str>,
) -> Result<Outcome, AdapterError> {
    if let Some(xpath) = xpath {
        let elements = session.find_elements(xpath).await?;
        let Some(id) = elements.first() else {
            return Ok(Outcome::Failure(format!("can't find element {xpath}")));
        };
        session.click_element(id).await?;
        session.send_keys(id, value).await?;
        dismiss_keyboard(session).await;
        return Ok(Outcome::Success);
    }

    // No locator: focus by tapping the bounds midpoint if given, then type
    // into whatever element holds focus.
    if let Some(bounds) = bounds {
        let parsed: Bounds = bounds
            .parse()
            .map_err(|err| AdapterError::protocol(format!("{err}")))?;
        let (x, y) = parsed.midpoint();
        session.tap(x, y).await?;
    }
    match session.active_element().await? {
        Some(id) => {
            session.send_keys(&id, value).await?;
            dismiss_keyboard(session).await;
            Ok(Outcome::Success)
        }
        None => Ok(Outcome::Failure(
            "exception: no focused element to type into".to_string(),
        )),
    }
}

/// The keyboard may not be up at all; failures here are expected noise.
async fn dismiss_keyboard(session: &dyn DriverSession) {
    if let Err(err) = session.hide_keyboard().await {
        debug!(error = %err, "hide_keyboard failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_protocol::parse_action;
    use serde_json::json;
    use std::time::Instant;
    use uiscout_core_types::Platform;
    use wd_adapter::MockSession;

    async fn dispatch(session: &MockSession, raw: serde_json::Value) -> Action {
        let mut action = Action::from_value(raw);
        execute_action(
            session,
            &mut action,
            &AppAliases::builtin(),
            &DispatchConfig {
                activate_settle: Duration::from_millis(1),
                ..DispatchConfig::default()
            },
        )
        .await;
        action
    }

    #[tokio::test]
    async fn tap_by_bounds_hits_the_midpoint() {
        let session = MockSession::new(Platform::Android);
        let action = dispatch(&session, json!({"action": "tap", "bounds": "[0,0][100,50]"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(session.calls().contains(&"tap 50,25".to_string()));
    }

    #[tokio::test]
    async fn tap_by_xpath_clicks_first_match() {
        let session = MockSession::new(Platform::Web);
        session.set_elements("//button", vec!["el-1", "el-2"]);
        let action = dispatch(&session, json!({"action": "tap", "xpath": "//button"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(session.calls().contains(&"click el-1".to_string()));
    }

    #[tokio::test]
    async fn web_click_follows_a_newly_opened_window() {
        let session = MockSession::new(Platform::Web);
        session.set_elements("//a[@id='open']", vec!["link"]);
        session.open_window_on_next_click("w1");
        let action = dispatch(&session, json!({"action": "tap", "xpath": "//a[@id='open']"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(session
            .calls()
            .contains(&"switch_to_window w1".to_string()));
    }

    #[tokio::test]
    async fn web_click_without_a_new_window_stays_put() {
        let session = MockSession::new(Platform::Web);
        session.set_elements("//a", vec!["link"]);
        let action = dispatch(&session, json!({"action": "tap", "xpath": "//a"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(!session
            .calls()
            .iter()
            .any(|call| call.starts_with("switch_to_window")));
    }

    #[tokio::test]
    async fn native_taps_skip_window_tracking() {
        let session = MockSession::new(Platform::Android);
        let action = dispatch(&session, json!({"action": "tap", "bounds": "[0,0][10,10]"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(!session.calls().contains(&"window_handles".to_string()));
    }

    #[tokio::test]
    async fn tap_with_no_match_reports_missing_element() {
        let session = MockSession::new(Platform::Web);
        let action = dispatch(&session, json!({"action": "tap", "xpath": "//missing"})).await;
        assert_eq!(action.result(), Some("can't find element //missing"));
    }

    #[tokio::test]
    async fn driver_failure_becomes_exception_result() {
        let session = MockSession::new(Platform::Android);
        session.fail_next_command("invalid element state", "not interactable");
        let action = dispatch(&session, json!({"action": "tap", "bounds": "[0,0][10,10]"})).await;
        let result = action.result().unwrap();
        assert!(result.starts_with("exception: "), "got: {result}");
        assert!(result.contains("not interactable"));
    }

    #[tokio::test]
    async fn input_focuses_then_types_then_hides_keyboard() {
        let session = MockSession::new(Platform::Android);
        session.set_elements("//input", vec!["field"]);
        let action = dispatch(
            &session,
            json!({"action": "input", "value": "hello", "xpath": "//input"}),
        )
        .await;
        assert_eq!(action.result(), Some("success"));
        let calls = session.calls();
        assert!(calls.contains(&"click field".to_string()));
        assert!(calls.contains(&"send_keys field hello".to_string()));
        assert!(calls.contains(&"hide_keyboard".to_string()));
    }

    #[tokio::test]
    async fn input_without_locator_uses_focused_element() {
        let session = MockSession::new(Platform::Ios);
        session.set_active_element(Some("focused"));
        let action = dispatch(&session, json!({"action": "input", "value": "abc"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(session
            .calls()
            .contains(&"send_keys focused abc".to_string()));
    }

    #[tokio::test]
    async fn wait_sleeps_at_least_its_timeout() {
        let session = MockSession::new(Platform::Web);
        let started = Instant::now();
        let action = dispatch(&session, json!({"action": "wait", "timeout": 500})).await;
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(action.result(), Some("success"));
    }

    #[tokio::test]
    async fn activate_app_resolves_friendly_names() {
        let session = MockSession::new(Platform::Android);
        let action = dispatch(&session, json!({"action": "activate_app", "app": "settings"})).await;
        assert_eq!(action.result(), Some("success"));
        assert!(session
            .calls()
            .contains(&"activate_app com.android.settings".to_string()));
    }

    #[tokio::test]
    async fn unknown_action_records_without_driver_calls() {
        let session = MockSession::new(Platform::Web);
        let action = dispatch(&session, json!({"action": "somersault"})).await;
        assert_eq!(action.result(), Some("unknown action"));
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn parsed_terminal_action_gets_no_result() {
        let session = MockSession::new(Platform::Web);
        let mut action = parse_action(r#"{"action": "finish"}"#);
        execute_action(
            &session,
            &mut action,
            &AppAliases::builtin(),
            &DispatchConfig::default(),
        )
        .await;
        assert_eq!(action.result(), None);
    }
}
