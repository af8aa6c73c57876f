//! Adapter configuration.
//!
//! Everything that used to be an environment lookup or a hard-coded constant
//! in earlier tooling is an explicit field here so runs can override it and
//! tests stay deterministic.

use std::time::Duration;

use serde_json::{json, Value};
use uiscout_core_types::Platform;

/// Connection and retry knobs for the session factory.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Scheme injected when the server address omits one.
    pub default_scheme: String,
    /// Upgrade `http` server addresses to `https`.
    pub force_tls: bool,
    /// Optional HTTP client timeout for driver commands.
    pub client_timeout: Option<Duration>,
    /// Interval between keep-alive probes.
    pub keepalive_interval: Duration,
    /// Browser-pool readiness polling: attempt count and fixed backoff.
    pub pool_ready_attempts: u32,
    pub pool_ready_backoff: Duration,
    /// Per-platform default capabilities, merged under caller overrides.
    pub capabilities: CapabilityProfiles,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            default_scheme: "http".to_string(),
            force_tls: false,
            client_timeout: None,
            keepalive_interval: Duration::from_secs(10),
            pool_ready_attempts: 20,
            pool_ready_backoff: Duration::from_secs(3),
            capabilities: CapabilityProfiles::default(),
        }
    }
}

/// Default capability maps per platform.
///
/// These are starting points, not policy: the factory merges caller-supplied
/// capabilities over them, so any field can be overridden per run.
#[derive(Debug, Clone)]
pub struct CapabilityProfiles {
    pub android: Value,
    pub ios: Value,
    pub web: Value,
}

impl Default for CapabilityProfiles {
    fn default() -> Self {
        Self {
            android: json!({
                "platformName": "Android",
                "appium:automationName": "uiautomator2",
                "appium:deviceName": "Android",
                "appium:language": "en",
                "appium:locale": "US",
                "appium:newCommandTimeout": 0,
                "appium:noReset": true,
            }),
            ios: json!({
                "platformName": "iOS",
                "appium:automationName": "XCUITest",
                "appium:autoLaunch": false,
                "appium:noReset": true,
            }),
            web: json!({
                "browserName": "chrome",
                "acceptInsecureCerts": true,
                "goog:chromeOptions": {
                    "args": [
                        "--no-sandbox",
                        "--ignore-certificate-errors",
                        "--disable-dev-shm-usage",
                        "--disable-gpu",
                    ],
                },
            }),
        }
    }
}

impl CapabilityProfiles {
    pub fn for_platform(&self, platform: Platform) -> &Value {
        match platform {
            Platform::Android => &self.android,
            Platform::Ios => &self.ios,
            Platform::Web => &self.web,
        }
    }
}

/// Merge `overrides` on top of `base`, object-by-object at the top level.
pub fn merge_capabilities(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(extra)) => {
            let mut merged = base_map.clone();
            for (key, value) in extra {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, overrides) => overrides.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_profile_defaults() {
        let profiles = CapabilityProfiles::default();
        let merged = merge_capabilities(
            profiles.for_platform(Platform::Android),
            &json!({"appium:deviceName": "pixel_7", "appium:udid": "abc"}),
        );
        assert_eq!(merged["appium:deviceName"], "pixel_7");
        assert_eq!(merged["appium:udid"], "abc");
        assert_eq!(merged["platformName"], "Android");
    }

    #[test]
    fn null_overrides_keep_base() {
        let base = json!({"a": 1});
        assert_eq!(merge_capabilities(&base, &Value::Null), base);
    }
}
