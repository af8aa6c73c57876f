//! Driver session port and its WebDriver-backed implementation.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uiscout_core_types::Platform;

use crate::error::AdapterError;
use crate::transport::{Verb, WdTransport};

/// W3C element identifier key, with the legacy JSON-wire fallback.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// One live automation session against a device or browser.
///
/// The step dispatcher talks to targets exclusively through this trait;
/// [`crate::mock::MockSession`] implements it for tests.
#[async_trait]
pub trait DriverSession: Send + Sync {
    fn platform(&self) -> Platform;

    /// Capabilities the session was opened with.
    fn capabilities(&self) -> &Value;

    async fn page_source(&self) -> Result<String, AdapterError>;

    /// Raw PNG bytes of the current screen.
    async fn screenshot_png(&self) -> Result<Vec<u8>, AdapterError>;

    /// Coordinate tap via W3C pointer actions.
    async fn tap(&self, x: i64, y: i64) -> Result<(), AdapterError>;

    /// Element ids matching an XPath query, in document order.
    async fn find_elements(&self, xpath: &str) -> Result<Vec<String>, AdapterError>;

    async fn click_element(&self, element_id: &str) -> Result<(), AdapterError>;

    async fn send_keys(&self, element_id: &str, text: &str) -> Result<(), AdapterError>;

    async fn clear_element(&self, element_id: &str) -> Result<(), AdapterError>;

    async fn swipe(
        &self,
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
        duration_ms: u64,
    ) -> Result<(), AdapterError>;

    async fn navigate(&self, url: &str) -> Result<(), AdapterError>;

    async fn activate_app(&self, app_id: &str) -> Result<(), AdapterError>;

    async fn terminate_app(&self, app_id: &str) -> Result<(), AdapterError>;

    /// Best-effort keyboard dismissal on mobile; a no-op elsewhere.
    async fn hide_keyboard(&self) -> Result<(), AdapterError>;

    async fn execute_script(&self, script: &str, args: Vec<Value>)
        -> Result<Value, AdapterError>;

    async fn window_handles(&self) -> Result<Vec<String>, AdapterError>;

    async fn switch_to_window(&self, handle: &str) -> Result<(), AdapterError>;

    /// Currently focused element, if the driver reports one.
    async fn active_element(&self) -> Result<Option<String>, AdapterError>;

    async fn quit(&self) -> Result<(), AdapterError>;
}

/// [`DriverSession`] backed by a WebDriver/Appium remote end.
pub struct WdSession {
    transport: Box<dyn WdTransport>,
    session_id: String,
    platform: Platform,
    capabilities: Value,
    keepalive: CancellationToken,
}

impl std::fmt::Debug for WdSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WdSession")
            .field("session_id", &self.session_id)
            .field("platform", &self.platform)
            .finish()
    }
}

impl WdSession {
    pub fn new(
        transport: Box<dyn WdTransport>,
        session_id: String,
        platform: Platform,
        capabilities: Value,
    ) -> Self {
        Self {
            transport,
            session_id,
            platform,
            capabilities,
            keepalive: CancellationToken::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Token the factory's keep-alive probe watches; cancelled on quit/drop.
    pub fn keepalive_token(&self) -> CancellationToken {
        self.keepalive.clone()
    }

    async fn command(
        &self,
        verb: Verb,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Value, AdapterError> {
        let suffix = suffix.trim_matches('/');
        let path = if suffix.is_empty() {
            format!("session/{}", self.session_id)
        } else {
            format!("session/{}/{}", self.session_id, suffix)
        };
        self.transport.execute(verb, &path, body).await
    }

    fn pointer_actions(steps: Value) -> Value {
        json!({
            "actions": [{
                "type": "pointer",
                "id": "finger",
                "parameters": {"pointerType": "touch"},
                "actions": steps,
            }]
        })
    }
}

/// Pull the element id out of a `{"element-...": id}` object.
pub fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl DriverSession for WdSession {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    async fn page_source(&self) -> Result<String, AdapterError> {
        let value = self.command(Verb::Get, "source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::protocol("page source was not a string"))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, AdapterError> {
        let value = self.command(Verb::Get, "screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| AdapterError::protocol("screenshot was not a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| AdapterError::protocol(format!("screenshot decode failed: {err}")))
    }

    async fn tap(&self, x: i64, y: i64) -> Result<(), AdapterError> {
        let body = Self::pointer_actions(json!([
            {"type": "pointerMove", "duration": 0, "x": x, "y": y},
            {"type": "pointerDown", "button": 0},
            {"type": "pause", "duration": 100},
            {"type": "pointerUp", "button": 0},
        ]));
        self.command(Verb::Post, "actions", Some(body)).await?;
        Ok(())
    }

    async fn find_elements(&self, xpath: &str) -> Result<Vec<String>, AdapterError> {
        let body = json!({"using": "xpath", "value": xpath});
        let value = self.command(Verb::Post, "elements", Some(body)).await?;
        let entries = value
            .as_array()
            .ok_or_else(|| AdapterError::protocol("element list was not an array"))?;
        Ok(entries.iter().filter_map(element_id).collect())
    }

    async fn click_element(&self, element_id: &str) -> Result<(), AdapterError> {
        self.command(Verb::Post, &format!("element/{element_id}/click"), None)
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element_id: &str, text: &str) -> Result<(), AdapterError> {
        let body = json!({"text": text});
        self.command(
            Verb::Post,
            &format!("element/{element_id}/value"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn clear_element(&self, element_id: &str) -> Result<(), AdapterError> {
        self.command(Verb::Post, &format!("element/{element_id}/clear"), None)
            .await?;
        Ok(())
    }

    async fn swipe(
        &self,
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
        duration_ms: u64,
    ) -> Result<(), AdapterError> {
        let body = Self::pointer_actions(json!([
            {"type": "pointerMove", "duration": 0, "x": start_x, "y": start_y},
            {"type": "pointerDown", "button": 0},
            {"type": "pointerMove", "duration": duration_ms, "x": end_x, "y": end_y},
            {"type": "pointerUp", "button": 0},
        ]));
        self.command(Verb::Post, "actions", Some(body)).await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        self.command(Verb::Post, "url", Some(json!({"url": url})))
            .await?;
        Ok(())
    }

    async fn activate_app(&self, app_id: &str) -> Result<(), AdapterError> {
        let body = json!({"appId": app_id, "bundleId": app_id});
        self.command(Verb::Post, "appium/device/activate_app", Some(body))
            .await?;
        Ok(())
    }

    async fn terminate_app(&self, app_id: &str) -> Result<(), AdapterError> {
        let body = json!({"appId": app_id, "bundleId": app_id});
        self.command(Verb::Post, "appium/device/terminate_app", Some(body))
            .await?;
        Ok(())
    }

    async fn hide_keyboard(&self) -> Result<(), AdapterError> {
        if !self.platform.is_mobile() {
            return Ok(());
        }
        // Keyboard may already be hidden; callers treat failure as benign.
        self.command(Verb::Post, "appium/device/hide_keyboard", None)
            .await?;
        Ok(())
    }

    async fn execute_script(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, AdapterError> {
        let body = json!({"script": script, "args": args});
        self.command(Verb::Post, "execute/sync", Some(body)).await
    }

    async fn window_handles(&self) -> Result<Vec<String>, AdapterError> {
        let value = self.command(Verb::Get, "window/handles", None).await?;
        let handles = value
            .as_array()
            .ok_or_else(|| AdapterError::protocol("window handles was not an array"))?;
        Ok(handles
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), AdapterError> {
        self.command(Verb::Post, "window", Some(json!({"handle": handle})))
            .await?;
        Ok(())
    }

    async fn active_element(&self) -> Result<Option<String>, AdapterError> {
        match self.command(Verb::Get, "element/active", None).await {
            Ok(value) => Ok(element_id(&value)),
            Err(AdapterError::Driver { code, .. }) if code == "no such element" => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn quit(&self) -> Result<(), AdapterError> {
        self.keepalive.cancel();
        debug!(session_id = %self.session_id, "closing session");
        self.command(Verb::Delete, "", None).await?;
        Ok(())
    }
}

impl Drop for WdSession {
    fn drop(&mut self) {
        self.keepalive.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_id_prefers_w3c_key() {
        let value = json!({
            (ELEMENT_KEY): "w3c-id",
            (LEGACY_ELEMENT_KEY): "legacy-id",
        });
        assert_eq!(element_id(&value).as_deref(), Some("w3c-id"));

        let legacy = json!({(LEGACY_ELEMENT_KEY): "legacy-id"});
        assert_eq!(element_id(&legacy).as_deref(), Some("legacy-id"));

        assert_eq!(element_id(&json!({})), None);
    }
}
