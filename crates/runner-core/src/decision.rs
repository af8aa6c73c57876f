//! Decision service port: who decides the next action.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uiscout_core_types::LlmMode;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision service failure: {0}")]
    Service(String),
}

impl DecisionError {
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }
}

/// Everything the decision service gets to see for one step.
#[derive(Debug, Clone)]
pub struct ProposalContext {
    /// Task goal text.
    pub goal: String,
    /// 1-based step number.
    pub step: u32,
    /// Records of previously executed actions, in order.
    pub history: Vec<Value>,
    /// YAML outline of the current screen.
    pub outline: String,
    /// Vision description of the screenshot, when the mode produced one.
    pub screen_description: Option<String>,
    /// Metadata of every open target, so proposals can address by alias.
    pub targets: Vec<Value>,
    /// Alias the next action will run on unless it says otherwise.
    pub active_target: String,
}

/// Proposes the next action for an exploratory task. Implemented by the
/// CLI over an OpenAI-compatible chat API, and by a stdin oracle in debug
/// mode; responses are raw text handed to the proposal parser.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn propose(&self, context: &ProposalContext) -> Result<String, DecisionError>;
}

/// Replays scripted proposals in order; proposes `finish` once drained.
pub struct MockDecisionService {
    proposals: Mutex<VecDeque<String>>,
    contexts: Mutex<Vec<ProposalContext>>,
}

impl MockDecisionService {
    pub fn new(proposals: Vec<&str>) -> Self {
        Self {
            proposals: Mutex::new(proposals.into_iter().map(str::to_string).collect()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Contexts received so far, for asserting on prompt content.
    pub fn seen(&self) -> Vec<ProposalContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionService for MockDecisionService {
    async fn propose(&self, context: &ProposalContext) -> Result<String, DecisionError> {
        self.contexts.lock().unwrap().push(context.clone());
        Ok(self
            .proposals
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| r#"{"action": "finish"}"#.to_string()))
    }
}

/// Task text that suggests the screen's look matters, not just its tree.
const VISION_KEYWORDS: &[&str] = &[
    "visual",
    "screenshot",
    "image",
    "appearance",
    "layout",
    "color",
    "colour",
    "style",
    "render",
];

/// Collapse `auto` into a concrete mode based on the task text.
pub fn effective_llm_mode(mode: LlmMode, task_text: &str) -> LlmMode {
    match mode {
        LlmMode::Auto => {
            let lowered = task_text.to_lowercase();
            if VISION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
                LlmMode::Vision
            } else {
                LlmMode::Text
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_picks_vision_on_keywords() {
        assert_eq!(
            effective_llm_mode(LlmMode::Auto, "Check the layout of the login page"),
            LlmMode::Vision
        );
        assert_eq!(
            effective_llm_mode(LlmMode::Auto, "Log in and verify the greeting text"),
            LlmMode::Text
        );
        assert_eq!(
            effective_llm_mode(LlmMode::Text, "check the Screenshot"),
            LlmMode::Text
        );
    }

    #[tokio::test]
    async fn mock_drains_then_finishes() {
        let service = MockDecisionService::new(vec![r#"{"action": "wait", "timeout": 1}"#]);
        let ctx = ProposalContext {
            goal: "g".into(),
            step: 1,
            history: Vec::new(),
            outline: String::new(),
            screen_description: None,
            targets: Vec::new(),
            active_target: "t".into(),
        };
        assert!(service.propose(&ctx).await.unwrap().contains("wait"));
        assert!(service.propose(&ctx).await.unwrap().contains("finish"));
        assert_eq!(service.seen().len(), 2);
    }
}
