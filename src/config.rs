//! Layered application configuration.
//!
//! Precedence, lowest to highest: built-in defaults, an optional config
//! file, `UISCOUT__`-prefixed environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use uiscout_core_types::TargetConfig;
use wd_adapter::AdapterConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default automation server for targets that name none.
    pub server: Option<String>,
    /// Default platform (`android` | `ios` | `web`).
    pub platform: Option<String>,
    pub reports_root: PathBuf,
    /// Browser pool service base URL; unset means direct web sessions.
    pub pool_url: Option<String>,
    /// Parallel run ceiling for hosts that submit several runs.
    pub run_limit: usize,
    pub llm: LlmConfig,
    pub adapter: AdapterSettings,
    pub executor: ExecutorSettings,
    /// Pre-configured targets, overridable per task file.
    pub targets: Vec<TargetConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: None,
            platform: None,
            reports_root: PathBuf::from("reports"),
            pool_url: None,
            run_limit: 4,
            llm: LlmConfig::default(),
            adapter: AdapterSettings::default(),
            executor: ExecutorSettings::default(),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Model used for screenshot description; falls back to `model`.
    pub vision_model: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// `auto` | `text` | `vision`.
    pub mode: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            vision_model: None,
            temperature: 0.2,
            timeout_secs: 120,
            mode: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    pub default_scheme: String,
    pub force_tls: bool,
    pub client_timeout_secs: Option<u64>,
    pub keepalive_secs: u64,
    pub pool_ready_attempts: u32,
    pub pool_ready_backoff_secs: u64,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        let defaults = AdapterConfig::default();
        Self {
            default_scheme: defaults.default_scheme,
            force_tls: defaults.force_tls,
            client_timeout_secs: None,
            keepalive_secs: defaults.keepalive_interval.as_secs(),
            pool_ready_attempts: defaults.pool_ready_attempts,
            pool_ready_backoff_secs: defaults.pool_ready_backoff.as_secs(),
        }
    }
}

impl AdapterSettings {
    pub fn to_adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            default_scheme: self.default_scheme.clone(),
            force_tls: self.force_tls,
            client_timeout: self.client_timeout_secs.map(Duration::from_secs),
            keepalive_interval: Duration::from_secs(self.keepalive_secs),
            pool_ready_attempts: self.pool_ready_attempts,
            pool_ready_backoff: Duration::from_secs(self.pool_ready_backoff_secs),
            ..AdapterConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Optional exploratory step ceiling; unset leaves exploration to end
    /// on terminal actions only.
    pub max_steps: Option<u32>,
    pub capture_attempts: u32,
    pub capture_backoff_ms: u64,
    pub web_ready_timeout_secs: u64,
    pub activate_settle_ms: u64,
    pub post_click_ready_secs: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_steps: None,
            capture_attempts: 3,
            capture_backoff_ms: 300,
            web_ready_timeout_secs: 8,
            activate_settle_ms: 600,
            post_click_ready_secs: 8,
        }
    }
}

impl AppConfig {
    /// Load configuration, optionally merging a file on top of defaults.
    /// Every field carries a serde default, so partial sources are fine.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }
        let settings = builder
            .add_source(Environment::with_prefix("UISCOUT").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
