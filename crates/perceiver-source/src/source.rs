//! Page-source capture with bounded retries.

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;
use wd_adapter::DriverSession;

/// Retry knobs for source capture.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub attempts: u32,
    pub backoff: Duration,
    /// Web readiness polling budget, see [`crate::wait_for_ready`].
    pub web_ready_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(300),
            web_ready_timeout: Duration::from_secs(8),
        }
    }
}

/// Fetch the page source, retrying on transient failures.
///
/// A `no such window` error means the window the session was attached to
/// went away; the capture re-attaches to the newest window and tries again.
/// After the retry budget the function returns an empty string so the step
/// loop can decide how to proceed, it never propagates an error.
pub async fn safe_page_source(session: &dyn DriverSession, config: &CaptureConfig) -> String {
    for attempt in 1..=config.attempts {
        match session.page_source().await {
            Ok(source) => return source,
            Err(err) if err.is_no_such_window() => {
                warn!(attempt, "window gone during capture, re-attaching");
                if let Err(err) = crate::web::switch_to_newest_window(session).await {
                    warn!(error = %err, "failed to re-attach to a window");
                }
            }
            Err(err) => {
                warn!(attempt, error = %err, "page source capture failed");
            }
        }
        if attempt < config.attempts {
            sleep(config.backoff).await;
        }
    }
    warn!(attempts = config.attempts, "page source unavailable, continuing with empty source");
    String::new()
}
