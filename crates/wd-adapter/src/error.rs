use thiserror::Error;

/// Errors emitted by the session adapter.
///
/// Open-time failures (`InvalidServer`, `NotReady`, handshake `Driver`
/// errors) abort a run; command-time failures are caught by the dispatcher
/// and recorded as step results instead of propagating.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The automation server address could not be used.
    #[error("invalid automation server: {0}")]
    InvalidServer(String),

    /// Transport-level failure talking to the remote end.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote end answered outside the WebDriver envelope.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A WebDriver-level error payload (`error` + `message`).
    #[error("driver error [{code}]: {message}")]
    Driver { code: String, message: String },

    /// The browser pool never reported a ready instance.
    #[error("browser pool instance not ready after {attempts} attempts")]
    NotReady { attempts: u32 },
}

impl AdapterError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn driver(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True when the failure looks like an Appium base-path mismatch, the
    /// one case where the factory retries with `/wd/hub` appended.
    pub fn needs_base_path_retry(&self) -> bool {
        let message = match self {
            AdapterError::Driver { message, .. } => message.clone(),
            AdapterError::Protocol(message) => message.clone(),
            AdapterError::Transport(err) => err.to_string(),
            _ => return false,
        };
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("requested resource could not be found") {
            return true;
        }
        lowered.contains("404") && lowered.contains("wd/hub")
    }

    /// True for the window-churn error raised while a page is replaced.
    pub fn is_no_such_window(&self) -> bool {
        matches!(self, AdapterError::Driver { code, .. } if code == "no such window")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_retry_detection() {
        let err = AdapterError::driver(
            "unknown command",
            "The requested resource could not be found, or a request was received using an HTTP method that is not supported",
        );
        assert!(err.needs_base_path_retry());

        let err = AdapterError::protocol("HTTP 404 returned for http://host/wd/hub/session");
        assert!(err.needs_base_path_retry());

        let err = AdapterError::driver("session not created", "capabilities rejected");
        assert!(!err.needs_base_path_retry());
    }

    #[test]
    fn no_such_window_detection() {
        assert!(AdapterError::driver("no such window", "window already closed").is_no_such_window());
        assert!(!AdapterError::driver("stale element reference", "gone").is_no_such_window());
    }
}
