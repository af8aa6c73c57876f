//! Platform detection from session capabilities or raw markup.

use serde_json::Value;
use uiscout_core_types::Platform;

/// Work out which platform produced a page source.
///
/// Capabilities are authoritative when they name a platform; otherwise the
/// markup itself is fingerprinted. Used to pick the attribute whitelist for
/// outlining when a session's platform is not already known.
pub fn detect_platform(capabilities: &Value, markup: &str) -> Option<Platform> {
    if let Some(name) = capabilities.get("platformName").and_then(Value::as_str) {
        if let Ok(platform) = name.parse() {
            return Some(platform);
        }
    }

    let trimmed = markup.trim_start();
    let lowered = trimmed
        .get(..64.min(trimmed.len()))
        .unwrap_or("")
        .to_ascii_lowercase();

    if trimmed.starts_with("<hierarchy") || trimmed.contains("android.widget") {
        return Some(Platform::Android);
    }
    if trimmed.contains("XCUIElementType") || trimmed.starts_with("<AppiumAUT") {
        return Some(Platform::Ios);
    }
    if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
        return Some(Platform::Web);
    }
    None
}
