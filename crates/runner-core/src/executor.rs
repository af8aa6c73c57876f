//! The per-task step state machine.
//!
//! One executor instance drives one task: capture state, obtain the next
//! action (authored or proposed), resolve its target, dispatch, record.
//! The executor owns the step sequence, so artifact names stay
//! collision-free across targets.

use action_protocol::{parse_action, Action};
use perceiver_source::{
    detect_platform, jpeg_derivative, markup_outline, safe_page_source, wait_for_ready,
    CaptureConfig, VisionDescriber,
};
use serde_json::Value;
use target_registry::{TargetHandle, TargetRegistry};
use tracing::{info, warn};
use uiscout_core_types::{LlmMode, Platform, Task};

use crate::apps::AppAliases;
use crate::artifacts::ArtifactStore;
use crate::decision::{effective_llm_mode, DecisionService, ProposalContext};
use crate::dispatch::{execute_action, DispatchConfig};
use crate::error::RunError;
use crate::prompt::render_prompt;

/// Knobs for one task execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Optional exploratory step ceiling. Exploration is otherwise ended
    /// only by terminal actions; scripted tasks run all authored steps.
    pub max_steps: Option<u32>,
    pub capture: CaptureConfig,
    pub dispatch: DispatchConfig,
    pub llm_mode: LlmMode,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            capture: CaptureConfig::default(),
            dispatch: DispatchConfig::default(),
            llm_mode: LlmMode::Auto,
        }
    }
}

struct Captured {
    source: String,
    outline: String,
    png: Vec<u8>,
    /// Platform the source actually came from, see [`detect_platform`].
    platform: Platform,
}

pub struct StepExecutor<'a> {
    registry: &'a TargetRegistry,
    decisions: &'a dyn DecisionService,
    vision: Option<&'a dyn VisionDescriber>,
    apps: &'a AppAliases,
    config: &'a ExecutorConfig,
    store: ArtifactStore,
    step: u32,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        registry: &'a TargetRegistry,
        decisions: &'a dyn DecisionService,
        vision: Option<&'a dyn VisionDescriber>,
        apps: &'a AppAliases,
        config: &'a ExecutorConfig,
        store: ArtifactStore,
    ) -> Self {
        Self {
            registry,
            decisions,
            vision,
            apps,
            config,
            store,
            step: 0,
        }
    }

    /// Run one task to completion, returning the ordered step records.
    pub async fn run_task(&mut self, task: &Task, goal: &str) -> Result<Vec<Value>, RunError> {
        let initial = self.registry.resolve(
            task.target.as_deref(),
            task.platform.map(|p| p.as_str().to_string()).as_deref(),
            None,
        );
        if let Some(warning) = &initial.warning {
            warn!(task = %task.name, warning, "task target preference not honoured");
        }
        let current = initial.alias;

        self.activate_apps(task, &current).await;

        if task.is_scripted() {
            self.run_scripted(task, current).await
        } else {
            self.run_exploratory(task, goal, current).await
        }
    }

    async fn run_scripted(
        &mut self,
        task: &Task,
        mut current: String,
    ) -> Result<Vec<Value>, RunError> {
        let steps = task.steps.clone().unwrap_or_default();
        let mut records = Vec::with_capacity(steps.len());

        for raw in steps {
            let step = self.next_step();
            let mut action = Action::from_value(raw);
            let resolution = self.registry.resolve(
                action.desired_target(),
                action.platform_hint(),
                Some(&current),
            );
            action.set_target(&resolution.alias);

            match resolution.warning {
                // The authored step named a target this run does not have:
                // keep the record, skip the dispatch.
                Some(warning) => action.set_result(warning),
                None => {
                    current = resolution.alias.clone();
                    if let Some(target) = self.registry.get(&current) {
                        action.set_platform_default(target.platform.as_str());
                        execute_action(
                            target.session.as_ref(),
                            &mut action,
                            self.apps,
                            &self.config.dispatch,
                        )
                        .await;
                    }
                }
            }

            self.capture_and_store(step, &resolution.alias).await?;
            let record = action.to_record();
            self.store.write_record(step, &record).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn run_exploratory(
        &mut self,
        task: &Task,
        goal: &str,
        mut current: String,
    ) -> Result<Vec<Value>, RunError> {
        let mode = effective_llm_mode(
            self.config.llm_mode,
            &format!("{} {}", task.name, goal),
        );
        let mut history: Vec<Value> = Vec::new();

        loop {
            let step = self.next_step();
            let captured = self.capture_and_store(step, &current).await?;
            if captured.source.is_empty() {
                warn!(task = %task.name, step, "empty page source, ending task");
                break;
            }

            // A configured ceiling ends the task with its own terminal
            // record so the truncation is visible in the transcript.
            if let Some(limit) = self.config.max_steps.filter(|limit| step > *limit) {
                warn!(task = %task.name, limit, "step limit reached before a terminal action");
                let mut action = Action::synthetic_error("step limit reached");
                action.set_target(&current);
                let record = action.to_record();
                self.store.write_record(step, &record).await?;
                history.push(record);
                break;
            }

            let screen_description = if mode == LlmMode::Vision {
                self.describe_screen(&captured.png, goal).await
            } else {
                None
            };
            let context = ProposalContext {
                goal: goal.to_string(),
                step,
                history: history.clone(),
                outline: captured.outline,
                screen_description,
                targets: self.registry.describe(),
                active_target: current.clone(),
            };
            let prompt = render_prompt(&context);
            self.store.write_prompt(step, &prompt).await?;

            let mut action = match self.decisions.propose(&context).await {
                Ok(raw) => parse_action(&raw),
                Err(err) => Action::synthetic_error(err.to_string()),
            };

            let resolution = self.registry.resolve(
                action.desired_target(),
                action.platform_hint(),
                Some(&current),
            );
            action.set_target(&resolution.alias);
            if let Some(warning) = resolution.warning {
                action.set_result(warning);
                let record = action.to_record();
                self.store.write_record(step, &record).await?;
                history.push(record);
                self.final_capture(&resolution.alias).await?;
                break;
            }
            current = resolution.alias;

            let terminal = action.is_terminal() || action.kind.is_unknown();
            if let Some(target) = self.registry.get(&current) {
                action.set_platform_default(target.platform.as_str());
                execute_action(
                    target.session.as_ref(),
                    &mut action,
                    self.apps,
                    &self.config.dispatch,
                )
                .await;
            }

            let record = action.to_record();
            self.store.write_record(step, &record).await?;
            history.push(record);

            if terminal {
                self.final_capture(&current).await?;
                break;
            }
        }
        Ok(history)
    }

    /// Activate the task's apps, in order, before the first step. Failures
    /// here are logged; the step loop still runs.
    async fn activate_apps(&self, task: &Task, alias: &str) {
        let Some(target) = self.registry.get(alias) else {
            return;
        };
        for app in &task.apps {
            let app_id = self.apps.resolve(target.platform, app);
            info!(app = %app_id, "activating app for task");
            if let Err(err) = target.session.activate_app(&app_id).await {
                warn!(app = %app_id, error = %err, "app activation failed");
            }
            tokio::time::sleep(self.config.dispatch.activate_settle).await;
        }
    }

    fn next_step(&mut self) -> u32 {
        self.step += 1;
        self.step
    }

    /// Capture page source and screenshot for one step and persist the
    /// page, outline and screenshot artifacts.
    async fn capture_and_store(&self, step: u32, alias: &str) -> Result<Captured, RunError> {
        let Some(target) = self.registry.get(alias) else {
            warn!(alias, "capture requested for unknown target");
            return Ok(Captured {
                source: String::new(),
                outline: String::new(),
                png: Vec::new(),
                platform: Platform::Web,
            });
        };
        let captured = self.capture(target).await;

        self.store
            .write_page(step, alias, captured.platform, &captured.source)
            .await?;
        self.store
            .write_outline(step, alias, &captured.outline)
            .await?;
        self.store
            .write_screenshot(step, alias, &captured.png)
            .await?;
        Ok(captured)
    }

    async fn capture(&self, target: &TargetHandle) -> Captured {
        let session = target.session.as_ref();
        if target.platform == Platform::Web {
            wait_for_ready(session, self.config.capture.web_ready_timeout).await;
        }
        let source = safe_page_source(session, &self.config.capture).await;
        // Sessions can surface markup from a different layer than the one
        // they were opened for, a webview inside a native app for instance.
        // The whitelist follows what the source actually looks like.
        let platform =
            detect_platform(session.capabilities(), &source).unwrap_or(target.platform);
        let outline = match markup_outline(platform, &source) {
            Ok(outline) => outline,
            Err(err) => {
                warn!(alias = %target.alias, error = %err, "source outline failed");
                String::new()
            }
        };
        let png = match session.screenshot_png().await {
            Ok(png) => png,
            Err(err) => {
                warn!(alias = %target.alias, error = %err, "screenshot failed");
                Vec::new()
            }
        };
        Captured {
            source,
            outline,
            png,
            platform,
        }
    }

    /// Terminal states still get evidence attached.
    async fn final_capture(&mut self, alias: &str) -> Result<(), RunError> {
        let step = self.next_step();
        self.capture_and_store(step, alias).await?;
        Ok(())
    }

    async fn describe_screen(&self, png: &[u8], goal: &str) -> Option<String> {
        let vision = self.vision?;
        if png.is_empty() {
            return None;
        }
        let jpeg = jpeg_derivative(png)?;
        match vision.describe(&jpeg, goal).await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(error = %err, "screen description unavailable");
                None
            }
        }
    }
}
