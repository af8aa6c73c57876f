//! The run aggregator: task loop, artifact folders, summary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use perceiver_source::VisionDescriber;
use serde_json::{json, Value};
use target_registry::{SessionOpener, TargetRegistry};
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uiscout_core_types::{Platform, RunId, RunSummary, Task, TargetConfig, TaskResult};

use crate::apps::AppAliases;
use crate::artifacts::ArtifactStore;
use crate::decision::DecisionService;
use crate::error::RunError;
use crate::executor::{ExecutorConfig, StepExecutor};

/// Run-level configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub reports_root: PathBuf,
    pub executor: ExecutorConfig,
    pub apps: AppAliases,
    /// Extra capabilities merged over the per-platform profiles.
    pub capabilities: Value,
}

impl RunConfig {
    pub fn new(reports_root: impl Into<PathBuf>) -> Self {
        Self {
            reports_root: reports_root.into(),
            executor: ExecutorConfig::default(),
            apps: AppAliases::builtin(),
            capabilities: Value::Null,
        }
    }
}

/// One run request: the tasks plus the run-level target defaults.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Run-level goal text, used when a task has no `details` of its own.
    pub prompt: String,
    pub tasks: Vec<Task>,
    pub targets: Vec<TargetConfig>,
    pub platform: Option<Platform>,
    pub server: Option<String>,
    /// Externally supplied identifier; a timestamp is derived when absent.
    pub run_id: Option<RunId>,
}

pub struct Runner {
    config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Execute a run: prepare targets, run the task loop, write the summary,
    /// and close every session no matter how the loop ended.
    pub async fn run(
        &self,
        opener: &dyn SessionOpener,
        decisions: &dyn DecisionService,
        vision: Option<&dyn VisionDescriber>,
        request: &RunRequest,
    ) -> Result<RunSummary, RunError> {
        fs::create_dir_all(&self.config.reports_root).await?;
        let run_id = request
            .run_id
            .clone()
            .unwrap_or_else(RunId::from_timestamp);
        info!(run_id = %run_id.as_str(), tasks = request.tasks.len(), "starting run");

        let registry = TargetRegistry::prepare(
            opener,
            &request.targets,
            request.platform,
            request.server.as_deref(),
            &self.config.capabilities,
        )
        .await?;

        let outcome = self
            .run_tasks(&registry, decisions, vision, request, &run_id)
            .await;

        // Sessions close on every path, success or abort.
        registry.close_all().await;
        info!(run_id = %run_id.as_str(), "run finished");
        outcome
    }

    async fn run_tasks(
        &self,
        registry: &TargetRegistry,
        decisions: &dyn DecisionService,
        vision: Option<&dyn VisionDescriber>,
        request: &RunRequest,
        run_id: &RunId,
    ) -> Result<RunSummary, RunError> {
        let mut completed: Vec<TaskResult> = Vec::new();
        let mut first_folder: Option<PathBuf> = None;

        for task in &request.tasks {
            if task.skip {
                info!(task = %task.name, "task skipped");
                continue;
            }
            match self
                .run_one(registry, decisions, vision, request, run_id, task)
                .await
            {
                Ok(result) => {
                    if first_folder.is_none() {
                        first_folder = Some(PathBuf::from(&result.reports_path));
                    }
                    completed.push(result);
                }
                Err(err) => {
                    warn!(task = %task.name, error = %err, "run aborted");
                    return Err(RunError::Aborted {
                        completed,
                        source: Box::new(err),
                    });
                }
            }
        }

        // One summary per run, in the first executed task's folder.
        let summary_path = match &first_folder {
            Some(folder) => {
                let path = folder.join("summary.json");
                let body = serde_json::to_vec_pretty(&json!({ "tasks": completed }))?;
                fs::write(&path, body).await?;
                Some(path)
            }
            None => None,
        };
        Ok(RunSummary {
            tasks: completed,
            summary_path,
        })
    }

    async fn run_one(
        &self,
        registry: &TargetRegistry,
        decisions: &dyn DecisionService,
        vision: Option<&dyn VisionDescriber>,
        request: &RunRequest,
        run_id: &RunId,
        task: &Task,
    ) -> Result<TaskResult, RunError> {
        let folder = self
            .config
            .reports_root
            .join(&task.name)
            .join(run_id.as_str());
        fs::create_dir_all(&folder).await?;
        fs::write(folder.join("task.json"), serde_json::to_vec_pretty(task)?).await?;
        info!(task = %task.name, folder = %folder.display(), "task started");

        let store = ArtifactStore::new(&folder, registry.len() > 1);
        let mut executor = StepExecutor::new(
            registry,
            decisions,
            vision,
            &self.config.apps,
            &self.config.executor,
            store,
        );
        let goal = if task.details.trim().is_empty() {
            request.prompt.clone()
        } else {
            task.details.clone()
        };
        let steps = executor.run_task(task, &goal).await?;

        Ok(TaskResult {
            name: task.name.clone(),
            scope: task.scope.clone(),
            steps,
            reports_path: normalize_path(&folder),
            task_id: run_id.as_str().to_string(),
        })
    }
}

/// Forward-slash form external consumers key artifacts by.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Bounds how many runs execute in parallel. One run is sequential inside;
/// hosts that accept multiple run requests push each through the pool.
pub struct RunPool {
    permits: Arc<Semaphore>,
}

impl RunPool {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Run a future once a slot frees up.
    pub async fn run<F>(&self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        // The semaphore is never closed, so acquisition only waits.
        let _permit = self.permits.acquire().await.ok();
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn pool_bounds_parallelism() {
        let pool = Arc::new(RunPool::new(2));
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let live = live.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(async {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
