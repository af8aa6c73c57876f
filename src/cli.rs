//! Command-line entry point and engine wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use perceiver_source::{CaptureConfig, VisionDescriber};
use runner_core::{
    DecisionService, DispatchConfig, ExecutorConfig, RunConfig, RunPool, RunRequest, Runner,
};
use target_registry::PooledOpener;
use uiscout_core_types::{LlmMode, Platform, RunId, Task, TargetConfig};
use wd_adapter::{BrowserPool, HttpBrowserPool, HttpTransportFactory, SessionFactory};

use crate::config::AppConfig;
use crate::llm::{HumanDecisionService, OpenAiDecisionService, OpenAiServiceConfig, OpenAiVisionDescriber};

#[derive(Debug, Parser)]
#[command(name = "uiscout", version, about = "AI-driven UI test execution engine")]
pub struct Cli {
    /// Goal text for exploratory runs, or a path to a file holding it.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Task definition file (JSON: a task array, or {"tasks": [...], "targets": [...]}).
    #[arg(long)]
    pub tasks: Option<PathBuf>,

    /// Automation server address (e.g. device-farm:4723).
    #[arg(long)]
    pub server: Option<String>,

    /// Default platform: android, ios or web.
    #[arg(long)]
    pub platform: Option<String>,

    /// Reports root directory.
    #[arg(long)]
    pub reports: Option<PathBuf>,

    /// Config file merged over built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Decision mode: auto, text or vision.
    #[arg(long)]
    pub llm_mode: Option<String>,

    /// Externally assigned run identifier.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Read actions from stdin instead of the decision service.
    #[arg(long)]
    pub debug: bool,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log: String,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing(&cli.log);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server = Some(server);
    }
    if let Some(platform) = cli.platform {
        config.platform = Some(platform);
    }
    if let Some(reports) = cli.reports {
        config.reports_root = reports;
    }
    if let Some(mode) = cli.llm_mode {
        config.llm.mode = mode;
    }

    let prompt = load_prompt(cli.prompt.as_deref())?;
    let task_file = cli
        .tasks
        .as_deref()
        .map(load_task_file)
        .transpose()?
        .unwrap_or_default();
    let tasks = if task_file.tasks.is_empty() {
        if prompt.trim().is_empty() {
            bail!("nothing to run: provide --tasks or --prompt");
        }
        vec![exploratory_task(&prompt)]
    } else {
        task_file.tasks
    };
    let mut targets = task_file.targets;
    if targets.is_empty() {
        targets = config.targets.clone();
    }
    if targets.is_empty() {
        // Single implicit target from the run-level server/platform.
        targets.push(TargetConfig::default());
    }

    let platform = config
        .platform
        .as_deref()
        .map(str::parse::<Platform>)
        .transpose()?;
    let llm_mode: LlmMode = config.llm.mode.parse().unwrap_or_default();

    // Session plumbing.
    let adapter = config.adapter.to_adapter_config();
    let client_timeout = adapter.client_timeout;
    let factory = SessionFactory::new(
        adapter,
        Box::new(HttpTransportFactory {
            timeout: client_timeout,
        }),
    );
    let pool: Option<Arc<dyn BrowserPool>> = match &config.pool_url {
        Some(raw) => {
            let base = Url::parse(raw).with_context(|| format!("bad pool url: {raw}"))?;
            Some(Arc::new(HttpBrowserPool::new(base)?))
        }
        None => None,
    };
    let opener = PooledOpener::new(factory, pool);

    // Decision and vision services.
    let llm = build_llm_config(&config)?;
    let decisions: Box<dyn DecisionService> = if cli.debug {
        Box::new(HumanDecisionService)
    } else {
        match &llm {
            Some(llm) => Box::new(OpenAiDecisionService::new(llm.clone())?),
            None => bail!("no decision service: set llm.api_key or pass --debug"),
        }
    };
    let vision = match &llm {
        Some(llm) => Some(OpenAiVisionDescriber::new(llm.clone())?),
        None => None,
    };
    let vision_ref = vision.as_ref().map(|v| v as &dyn VisionDescriber);

    let runner = Runner::new(RunConfig {
        reports_root: config.reports_root.clone(),
        executor: ExecutorConfig {
            max_steps: config.executor.max_steps,
            capture: CaptureConfig {
                attempts: config.executor.capture_attempts,
                backoff: Duration::from_millis(config.executor.capture_backoff_ms),
                web_ready_timeout: Duration::from_secs(config.executor.web_ready_timeout_secs),
            },
            dispatch: DispatchConfig {
                activate_settle: Duration::from_millis(config.executor.activate_settle_ms),
                post_click_ready: Duration::from_secs(config.executor.post_click_ready_secs),
            },
            llm_mode,
        },
        ..RunConfig::new(&config.reports_root)
    });

    let request = RunRequest {
        prompt,
        tasks,
        targets,
        platform,
        server: config.server.clone(),
        run_id: cli.run_id.map(RunId),
    };

    let run_pool = RunPool::new(config.run_limit);
    let summary = run_pool
        .run(runner.run(&opener, decisions.as_ref(), vision_ref, &request))
        .await?;

    info!(tasks = summary.tasks.len(), "run complete");
    if let Some(path) = &summary.summary_path {
        println!("summary: {}", path.display());
    }
    for task in &summary.tasks {
        println!("{}: {} step(s) -> {}", task.name, task.steps.len(), task.reports_path);
    }
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// `--prompt` accepts a file path or literal text.
fn load_prompt(prompt: Option<&str>) -> anyhow::Result<String> {
    let Some(prompt) = prompt else {
        return Ok(String::new());
    };
    let path = Path::new(prompt);
    if path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt file {}", path.display()));
    }
    Ok(prompt.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    targets: Vec<TargetConfig>,
}

/// Accepts `{"tasks": [...], "targets": [...]}` or a bare task array.
fn load_task_file(path: &Path) -> anyhow::Result<TaskFile> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read task file {}", path.display()))?;
    if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(&body) {
        return Ok(TaskFile {
            tasks,
            targets: Vec::new(),
        });
    }
    serde_json::from_str(&body)
        .with_context(|| format!("malformed task file {}", path.display()))
}

fn exploratory_task(prompt: &str) -> Task {
    Task {
        name: "task1".to_string(),
        details: prompt.to_string(),
        scope: "functional".to_string(),
        skip: false,
        steps: None,
        target: None,
        platform: None,
        apps: Vec::new(),
    }
}

fn build_llm_config(config: &AppConfig) -> anyhow::Result<Option<OpenAiServiceConfig>> {
    let Some(api_key) = &config.llm.api_key else {
        return Ok(None);
    };
    Ok(Some(OpenAiServiceConfig {
        api_base: config.llm.api_base.clone(),
        api_key: api_key.clone(),
        model: config.llm.model.clone(),
        vision_model: config.llm.vision_model.clone(),
        temperature: config.llm.temperature,
        timeout: Duration::from_secs(config.llm.timeout_secs),
    }))
}
