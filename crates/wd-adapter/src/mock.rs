//! Scripted in-memory session for tests.
//!
//! Records every command it receives and replays configured responses, so
//! dispatch and capture logic can be exercised without a remote end.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use uiscout_core_types::Platform;

use crate::error::AdapterError;
use crate::session::DriverSession;

/// A scripted failure, converted into [`AdapterError::Driver`] when replayed.
#[derive(Debug, Clone)]
pub struct ScriptedError {
    pub code: String,
    pub message: String,
}

impl ScriptedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    fn raise(&self) -> AdapterError {
        AdapterError::driver(self.code.clone(), self.message.clone())
    }
}

pub struct MockSession {
    platform: Platform,
    capabilities: Value,
    calls: Mutex<Vec<String>>,
    page_sources: Mutex<VecDeque<Result<String, ScriptedError>>>,
    default_source: Mutex<String>,
    elements: Mutex<HashMap<String, Vec<String>>>,
    active: Mutex<Option<String>>,
    handles: Mutex<Vec<String>>,
    opens_window: Mutex<Option<String>>,
    screenshot: Mutex<Vec<u8>>,
    fail_next: Mutex<Option<ScriptedError>>,
    quit_count: AtomicUsize,
}

impl MockSession {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            capabilities: json!({"platformName": platform.as_str()}),
            calls: Mutex::new(Vec::new()),
            page_sources: Mutex::new(VecDeque::new()),
            default_source: Mutex::new("<hierarchy/>".to_string()),
            elements: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            handles: Mutex::new(vec!["w0".to_string()]),
            opens_window: Mutex::new(None),
            screenshot: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            quit_count: AtomicUsize::new(0),
        }
    }

    pub fn with_default_source(self, source: impl Into<String>) -> Self {
        *self.default_source.lock().unwrap() = source.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Value) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queue one page-source response; once drained the default is replayed.
    pub fn push_page_source(&self, response: Result<String, ScriptedError>) {
        self.page_sources.lock().unwrap().push_back(response);
    }

    pub fn set_elements(&self, xpath: impl Into<String>, ids: Vec<&str>) {
        self.elements
            .lock()
            .unwrap()
            .insert(xpath.into(), ids.into_iter().map(str::to_string).collect());
    }

    pub fn set_active_element(&self, id: Option<&str>) {
        *self.active.lock().unwrap() = id.map(str::to_string);
    }

    pub fn set_window_handles(&self, handles: Vec<&str>) {
        *self.handles.lock().unwrap() = handles.into_iter().map(str::to_string).collect();
    }

    /// The next successful tap or element click adds this window handle, as
    /// if the click had opened a new tab.
    pub fn open_window_on_next_click(&self, handle: &str) {
        *self.opens_window.lock().unwrap() = Some(handle.to_string());
    }

    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        *self.screenshot.lock().unwrap() = bytes;
    }

    /// Make the next command (not capture) fail with the given driver error.
    pub fn fail_next_command(&self, code: &str, message: &str) {
        *self.fail_next.lock().unwrap() = Some(ScriptedError::new(code, message));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn quit_count(&self) -> usize {
        self.quit_count.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn take_failure(&self) -> Result<(), AdapterError> {
        match self.fail_next.lock().unwrap().take() {
            Some(scripted) => Err(scripted.raise()),
            None => Ok(()),
        }
    }

    fn maybe_open_window(&self) {
        if let Some(handle) = self.opens_window.lock().unwrap().take() {
            self.handles.lock().unwrap().push(handle);
        }
    }
}

#[async_trait]
impl DriverSession for MockSession {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    async fn page_source(&self) -> Result<String, AdapterError> {
        self.record("page_source");
        match self.page_sources.lock().unwrap().pop_front() {
            Some(Ok(source)) => Ok(source),
            Some(Err(scripted)) => Err(scripted.raise()),
            None => Ok(self.default_source.lock().unwrap().clone()),
        }
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, AdapterError> {
        self.record("screenshot");
        Ok(self.screenshot.lock().unwrap().clone())
    }

    async fn tap(&self, x: i64, y: i64) -> Result<(), AdapterError> {
        self.record(format!("tap {x},{y}"));
        self.take_failure()?;
        self.maybe_open_window();
        Ok(())
    }

    async fn find_elements(&self, xpath: &str) -> Result<Vec<String>, AdapterError> {
        self.record(format!("find {xpath}"));
        self.take_failure()?;
        Ok(self
            .elements
            .lock()
            .unwrap()
            .get(xpath)
            .cloned()
            .unwrap_or_default())
    }

    async fn click_element(&self, element_id: &str) -> Result<(), AdapterError> {
        self.record(format!("click {element_id}"));
        self.take_failure()?;
        self.maybe_open_window();
        Ok(())
    }

    async fn send_keys(&self, element_id: &str, text: &str) -> Result<(), AdapterError> {
        self.record(format!("send_keys {element_id} {text}"));
        self.take_failure()
    }

    async fn clear_element(&self, element_id: &str) -> Result<(), AdapterError> {
        self.record(format!("clear {element_id}"));
        self.take_failure()
    }

    async fn swipe(
        &self,
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
        duration_ms: u64,
    ) -> Result<(), AdapterError> {
        self.record(format!(
            "swipe {start_x},{start_y} -> {end_x},{end_y} in {duration_ms}ms"
        ));
        self.take_failure()
    }

    async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        self.record(format!("navigate {url}"));
        self.take_failure()
    }

    async fn activate_app(&self, app_id: &str) -> Result<(), AdapterError> {
        self.record(format!("activate_app {app_id}"));
        self.take_failure()
    }

    async fn terminate_app(&self, app_id: &str) -> Result<(), AdapterError> {
        self.record(format!("terminate_app {app_id}"));
        self.take_failure()
    }

    async fn hide_keyboard(&self) -> Result<(), AdapterError> {
        self.record("hide_keyboard");
        Ok(())
    }

    async fn execute_script(
        &self,
        script: &str,
        _args: Vec<Value>,
    ) -> Result<Value, AdapterError> {
        self.record(format!("execute {script}"));
        self.take_failure()?;
        if script.contains("readyState") {
            return Ok(Value::String("complete".to_string()));
        }
        Ok(Value::Null)
    }

    async fn window_handles(&self) -> Result<Vec<String>, AdapterError> {
        self.record("window_handles");
        Ok(self.handles.lock().unwrap().clone())
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), AdapterError> {
        self.record(format!("switch_to_window {handle}"));
        Ok(())
    }

    async fn active_element(&self) -> Result<Option<String>, AdapterError> {
        self.record("active_element");
        Ok(self.active.lock().unwrap().clone())
    }

    async fn quit(&self) -> Result<(), AdapterError> {
        self.record("quit");
        self.quit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_page_sources_replay_in_order() {
        let session = MockSession::new(Platform::Android).with_default_source("<d/>");
        session.push_page_source(Ok("<a/>".to_string()));
        session.push_page_source(Err(ScriptedError::new("no such window", "gone")));

        assert_eq!(session.page_source().await.unwrap(), "<a/>");
        assert!(session.page_source().await.unwrap_err().is_no_such_window());
        assert_eq!(session.page_source().await.unwrap(), "<d/>");
    }

    #[tokio::test]
    async fn fail_next_applies_to_one_command() {
        let session = MockSession::new(Platform::Web);
        session.fail_next_command("stale element reference", "gone");
        assert!(session.tap(1, 2).await.is_err());
        assert!(session.tap(1, 2).await.is_ok());
        assert_eq!(session.calls(), vec!["tap 1,2", "tap 1,2"]);
    }
}
