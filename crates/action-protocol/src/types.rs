//! Typed action objects exchanged with the decision service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Screen rectangle in the `[left,top][right,bottom]` notation used by the
/// Android UI tree (and mirrored by the decision-service prompt contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Bounds {
    /// Midpoint used for coordinate taps.
    pub fn midpoint(&self) -> (i64, i64) {
        (
            self.left + (self.right - self.left) / 2,
            self.top + (self.bottom - self.top) / 2,
        )
    }
}

#[derive(Debug, Error)]
#[error("malformed bounds '{0}', expected [left,top][right,bottom]")]
pub struct BoundsParseError(pub String);

impl FromStr for Bounds {
    type Err = BoundsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BoundsParseError(s.to_string());
        let (left_top, right_bottom) = s.split_once("][").ok_or_else(err)?;
        let left_top = left_top.strip_prefix('[').ok_or_else(err)?;
        let right_bottom = right_bottom.strip_suffix(']').ok_or_else(err)?;

        let parse_pair = |pair: &str| -> Option<(i64, i64)> {
            let (a, b) = pair.split_once(',')?;
            Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
        };
        let (left, top) = parse_pair(left_top).ok_or_else(err)?;
        let (right, bottom) = parse_pair(right_bottom).ok_or_else(err)?;
        Ok(Bounds {
            left,
            top,
            right,
            bottom,
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Discriminated action kinds understood by the dispatcher.
///
/// `Unknown` is deliberately part of the model: a proposal with an
/// unrecognised `action` value is recorded as evidence and ends the task,
/// it is never an error that could crash the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(rename = "tap", alias = "click")]
    Tap {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bounds: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        xpath: Option<String>,
    },
    Input {
        #[serde(default)]
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bounds: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        xpath: Option<String>,
    },
    Swipe {
        swipe_start_x: i64,
        swipe_start_y: i64,
        swipe_end_x: i64,
        swipe_end_y: i64,
        /// Gesture duration in milliseconds; the dispatcher also sleeps this long.
        duration: u64,
    },
    Navigate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    #[serde(rename = "activate_app", alias = "activate")]
    ActivateApp {
        #[serde(default, rename = "bundleId", skip_serializing_if = "Option::is_none")]
        bundle_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app: Option<String>,
    },
    #[serde(rename = "terminate_app", alias = "terminate")]
    TerminateApp {
        #[serde(default, rename = "bundleId", skip_serializing_if = "Option::is_none")]
        bundle_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app: Option<String>,
    },
    Wait {
        /// Milliseconds to sleep.
        timeout: u64,
    },
    Finish,
    Error,
    /// Unrecognised `action` value, preserved verbatim.
    #[serde(skip)]
    Unknown { name: String },
}

impl ActionKind {
    /// Terminal kinds end the step loop; a final capture still happens.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionKind::Finish | ActionKind::Error)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ActionKind::Unknown { .. })
    }

    /// App identifier for activate/terminate, first of bundleId/package/app.
    pub fn app_id(&self) -> Option<&str> {
        match self {
            ActionKind::ActivateApp {
                bundle_id,
                package,
                app,
            }
            | ActionKind::TerminateApp {
                bundle_id,
                package,
                app,
            } => bundle_id
                .as_deref()
                .or(package.as_deref())
                .or(app.as_deref()),
            _ => None,
        }
    }
}

/// One structured instruction plus the raw payload it was recovered from.
///
/// The raw object is kept so step records preserve every field the proposal
/// carried; the typed kind drives dispatch. `result` is attached exactly once
/// after execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    payload: Map<String, Value>,
}

impl Action {
    /// Build from an already-decoded JSON value (authored script steps).
    /// Non-objects and unrecognised kinds degrade instead of failing.
    pub fn from_value(value: Value) -> Action {
        let Value::Object(payload) = value else {
            return Action::synthetic_error("invalid action format");
        };
        let kind = match payload.get("action").and_then(Value::as_str) {
            None => {
                let mut action = Action::synthetic_error("missing 'action' field");
                action.merge_payload(payload);
                return action;
            }
            Some(name) => {
                match serde_json::from_value::<ActionKind>(Value::Object(payload.clone())) {
                    Ok(kind) => kind,
                    Err(_) => ActionKind::Unknown {
                        name: name.to_string(),
                    },
                }
            }
        };
        Action { kind, payload }
    }

    /// Terminal `error` action fabricated by the engine itself.
    pub fn synthetic_error(message: impl Into<String>) -> Action {
        let mut payload = Map::new();
        payload.insert("action".to_string(), Value::String("error".to_string()));
        payload.insert("message".to_string(), Value::String(message.into()));
        Action {
            kind: ActionKind::Error,
            payload,
        }
    }

    fn merge_payload(&mut self, extra: Map<String, Value>) {
        for (k, v) in extra {
            self.payload.entry(k).or_insert(v);
        }
    }

    /// Desired target alias, honouring the `target`/`device`/`session` spellings.
    pub fn desired_target(&self) -> Option<&str> {
        ["target", "device", "session"]
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_str))
    }

    /// Platform hint, honouring the `platform`/`platformName`/`platform_name` spellings.
    pub fn platform_hint(&self) -> Option<&str> {
        ["platform", "platformName", "platform_name"]
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_str))
    }

    /// Record which target actually executed the action.
    pub fn set_target(&mut self, alias: &str) {
        self.payload
            .insert("target".to_string(), Value::String(alias.to_string()));
    }

    /// Record the executing platform unless the proposal already named one.
    pub fn set_platform_default(&mut self, platform: &str) {
        self.payload
            .entry("platform".to_string())
            .or_insert_with(|| Value::String(platform.to_string()));
    }

    pub fn set_result(&mut self, result: impl Into<String>) {
        self.payload
            .insert("result".to_string(), Value::String(result.into()));
    }

    pub fn result(&self) -> Option<&str> {
        self.payload.get("result").and_then(Value::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Full step record: raw payload with target/platform/result merged in.
    pub fn to_record(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bounds_parse_and_midpoint() {
        let bounds: Bounds = "[0,0][100,200]".parse().unwrap();
        assert_eq!(bounds.midpoint(), (50, 100));
        assert_eq!(bounds.to_string(), "[0,0][100,200]");
        assert!("[0,0][100]".parse::<Bounds>().is_err());
        assert!("0,0,100,200".parse::<Bounds>().is_err());
    }

    #[test]
    fn click_is_an_alias_for_tap() {
        let action = Action::from_value(json!({"action": "click", "xpath": "//button"}));
        assert_eq!(
            action.kind,
            ActionKind::Tap {
                bounds: None,
                xpath: Some("//button".to_string())
            }
        );
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let action = Action::from_value(json!({"action": "teleport", "x": 3}));
        assert_eq!(
            action.kind,
            ActionKind::Unknown {
                name: "teleport".to_string()
            }
        );
        assert!(!action.is_terminal());
    }

    #[test]
    fn target_and_platform_spellings() {
        let action = Action::from_value(json!({
            "action": "finish",
            "device": "phone",
            "platformName": "ios"
        }));
        assert_eq!(action.desired_target(), Some("phone"));
        assert_eq!(action.platform_hint(), Some("ios"));
    }

    #[test]
    fn record_carries_result_once_set() {
        let mut action = Action::from_value(json!({"action": "wait", "timeout": 500}));
        action.set_target("tablet");
        action.set_result("success");
        let record = action.to_record();
        assert_eq!(record["action"], "wait");
        assert_eq!(record["timeout"], 500);
        assert_eq!(record["target"], "tablet");
        assert_eq!(record["result"], "success");
    }

    #[test]
    fn app_id_prefers_bundle_id() {
        let action = Action::from_value(json!({
            "action": "activate_app",
            "bundleId": "com.apple.Preferences",
            "app": "settings"
        }));
        assert_eq!(action.kind.app_id(), Some("com.apple.Preferences"));
    }

    #[test]
    fn non_object_degrades_to_error_action() {
        let action = Action::from_value(json!([1, 2, 3]));
        assert_eq!(action.kind, ActionKind::Error);
        assert!(action
            .to_record()
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap()
            .contains("invalid action format"));
    }
}
