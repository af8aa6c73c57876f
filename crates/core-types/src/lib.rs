//! Shared data model for the uiscout execution engine.
//!
//! Everything here is plain data exchanged between the engine crates:
//! platforms, run/task identifiers, task definitions and aggregated results.
//! Behaviour lives in the crates that own it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when parsing one of the shared enums from text.
#[derive(Debug, Error)]
#[error("unsupported platform: {0}")]
pub struct UnknownPlatform(pub String);

/// Automation platform a target session runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
        }
    }

    /// Mobile platforms share the Appium capability/connection handling.
    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Android | Platform::Ios)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Identifier for one run invocation.
///
/// Either supplied by the caller (queue task id) or derived from the wall
/// clock, so artifact folders sort chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn from_timestamp() -> Self {
        Self(chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Preferred decision-service mode for a run or task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    /// Pick `Vision` when the task text mentions visual work, else `Text`.
    #[default]
    Auto,
    Text,
    Vision,
}

impl FromStr for LlmMode {
    type Err = ();

    /// Unknown values fall back to `Auto`; the caller logs, never fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "text" => LlmMode::Text,
            "vision" => LlmMode::Vision,
            _ => LlmMode::Auto,
        })
    }
}

/// Configuration of one automation target requested for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Stable alias; generated (`target<N>`) when omitted.
    #[serde(default, alias = "name", alias = "id")]
    pub alias: Option<String>,
    /// Platform override; falls back to the run-level platform.
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Automation server override; falls back to the run-level server.
    #[serde(default)]
    pub server: Option<String>,
    /// Marks this target as the default dispatch destination.
    #[serde(default, alias = "is_default")]
    pub default: bool,
}

/// One named scenario within a run.
///
/// A task is scripted when `steps` is present (the executor replays the
/// authored actions) and exploratory otherwise (the decision service is
/// consulted each step until a terminal action).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// Free-text goal handed to the decision service.
    #[serde(default)]
    pub details: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub skip: bool,
    /// Pre-authored action objects; parsed by the protocol crate at dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<serde_json::Value>>,
    /// Preferred target alias for the first step.
    #[serde(default, alias = "default_target", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Platform preference used when no alias is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Apps to activate, in order, before the step loop starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,
}

fn default_scope() -> String {
    "functional".to_string()
}

impl Task {
    pub fn is_scripted(&self) -> bool {
        self.steps.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Result of one executed task: the ordered action records plus the
/// artifact-folder coordinates external consumers use to locate evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub name: String,
    pub scope: String,
    /// Executed actions with their `result` fields attached, in order.
    pub steps: Vec<serde_json::Value>,
    /// Forward-slash normalised `reportsRoot/taskName/runId` path.
    pub reports_path: String,
    /// Run identifier the artifacts are keyed by.
    pub task_id: String,
}

/// Aggregate output of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub tasks: Vec<TaskResult>,
    /// Path of the written `summary.json`, when the task loop completed.
    pub summary_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trip() {
        for p in [Platform::Android, Platform::Ios, Platform::Web] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert!("Android".parse::<Platform>().is_ok());
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn llm_mode_defaults_to_auto() {
        assert_eq!("vision".parse::<LlmMode>().unwrap(), LlmMode::Vision);
        assert_eq!("nonsense".parse::<LlmMode>().unwrap(), LlmMode::Auto);
    }

    #[test]
    fn task_deserialises_with_aliases() {
        let task: Task = serde_json::from_str(
            r#"{
                "name": "login",
                "details": "log into the app",
                "skip": false,
                "default_target": "phone",
                "apps": ["settings"]
            }"#,
        )
        .unwrap();
        assert_eq!(task.target.as_deref(), Some("phone"));
        assert_eq!(task.scope, "functional");
        assert!(!task.is_scripted());
    }

    #[test]
    fn scripted_task_detection() {
        let task: Task = serde_json::from_str(
            r#"{"name": "t", "details": "", "steps": [{"action": "wait", "timeout": 100}]}"#,
        )
        .unwrap();
        assert!(task.is_scripted());
    }
}
