//! OpenAI-compatible decision and vision services.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;
use perceiver_source::{CaptureError, VisionDescriber};
use reqwest::Client;
use runner_core::{render_prompt, DecisionError, DecisionService, ProposalContext};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiServiceConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub vision_model: Option<String>,
    pub temperature: f32,
    pub timeout: Duration,
}

const SYSTEM_PROMPT: &str = "You are a UI testing agent driving a live device or browser. \
You receive the task goal, the executed actions so far and a YAML outline of the current \
screen. Respond with exactly one JSON object describing the next action and nothing else. \
Supported actions: tap (bounds or xpath), input (value plus bounds or xpath), swipe \
(swipe_start_x/y, swipe_end_x/y, duration), navigate (url), activate_app / terminate_app \
(bundleId, package or app), wait (timeout in ms), finish, error (message).";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

async fn chat(
    client: &Client,
    config: &OpenAiServiceConfig,
    model: &str,
    messages: Value,
) -> Result<String, String> {
    let url = format!("{}/chat/completions", config.api_base.trim_end_matches('/'));
    let body = json!({
        "model": model,
        "temperature": config.temperature,
        "messages": messages,
    });

    let response = client
        .post(&url)
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .await
        .map_err(|err| format!("request failed: {err}"))?;

    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<response unavailable>".to_string());
        return Err(format!("service returned {status}: {text}"));
    }

    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|err| format!("response invalid: {err}"))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| "response missing content".to_string())
}

/// Decision service over an OpenAI-compatible chat completions API.
pub struct OpenAiDecisionService {
    client: Client,
    config: OpenAiServiceConfig,
}

impl OpenAiDecisionService {
    pub fn new(config: OpenAiServiceConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DecisionService for OpenAiDecisionService {
    async fn propose(&self, context: &ProposalContext) -> Result<String, DecisionError> {
        let messages = json!([
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": render_prompt(context)},
        ]);
        debug!(step = context.step, model = %self.config.model, "requesting proposal");
        chat(&self.client, &self.config, &self.config.model, messages)
            .await
            .map_err(DecisionError::service)
    }
}

/// Screenshot describer over the same API, using image-capable messages.
pub struct OpenAiVisionDescriber {
    client: Client,
    config: OpenAiServiceConfig,
}

impl OpenAiVisionDescriber {
    pub fn new(config: OpenAiServiceConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl VisionDescriber for OpenAiVisionDescriber {
    async fn describe(&self, jpeg: &[u8], goal: &str) -> Result<String, CaptureError> {
        let model = self
            .config
            .vision_model
            .as_deref()
            .unwrap_or(&self.config.model);
        let data_url = format!("data:image/jpeg;base64,{}", Base64.encode(jpeg));
        let messages = json!([
            {"role": "user", "content": [
                {"type": "text", "text": format!(
                    "Describe this app screen for a tester working on: {goal}. \
                     List the visible interactive elements and any notable state."
                )},
                {"type": "image_url", "image_url": {"url": data_url}},
            ]},
        ]);
        chat(&self.client, &self.config, model, messages)
            .await
            .map_err(CaptureError::Vision)
    }
}
