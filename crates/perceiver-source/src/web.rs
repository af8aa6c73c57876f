//! Web-target helpers: document readiness and window re-attachment.

use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;
use wd_adapter::{AdapterError, DriverSession};

const READY_POLL: Duration = Duration::from_millis(250);

/// Poll `document.readyState` until the page is interactive or the budget
/// runs out. Timing out is not an error; slow pages are still captured.
pub async fn wait_for_ready(session: &dyn DriverSession, budget: Duration) {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        match session
            .execute_script("return document.readyState", Vec::new())
            .await
        {
            Ok(Value::String(state)) if state == "complete" || state == "interactive" => return,
            Ok(state) => debug!(?state, "page not ready yet"),
            Err(err) => debug!(error = %err, "readiness probe failed"),
        }
        if tokio::time::Instant::now() >= deadline {
            debug!("readiness budget exhausted, continuing anyway");
            return;
        }
        sleep(READY_POLL).await;
    }
}

/// Attach the session to its newest window, used after the current window
/// was closed by the page under test.
pub async fn switch_to_newest_window(session: &dyn DriverSession) -> Result<(), AdapterError> {
    let handles = session.window_handles().await?;
    match handles.last() {
        Some(handle) => session.switch_to_window(handle).await,
        None => Err(AdapterError::protocol("no windows left to attach to")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uiscout_core_types::Platform;
    use wd_adapter::MockSession;

    #[tokio::test]
    async fn switches_to_last_handle() {
        let session = MockSession::new(Platform::Web);
        session.set_window_handles(vec!["a", "b", "c"]);
        switch_to_newest_window(&session).await.unwrap();
        assert!(session.calls().contains(&"switch_to_window c".to_string()));
    }

    #[tokio::test]
    async fn no_windows_is_an_error() {
        let session = MockSession::new(Platform::Web);
        session.set_window_handles(vec![]);
        assert!(switch_to_newest_window(&session).await.is_err());
    }
}
