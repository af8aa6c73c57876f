use target_registry::RegistryError;
use thiserror::Error;
use uiscout_core_types::TaskResult;

/// Run-fatal failures.
///
/// Only configuration and session-open problems abort a run; per-step and
/// per-task failures are recorded inside the step records instead.
#[derive(Debug, Error)]
pub enum RunError {
    /// Target preparation failed before any task ran.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An artifact could not be written.
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    /// An artifact could not be serialised.
    #[error("artifact serialisation error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The run aborted mid-loop. Task results collected before the abort
    /// are carried along; no summary artifact is written on this path.
    #[error("run aborted after {} completed task(s): {source}", completed.len())]
    Aborted {
        completed: Vec<TaskResult>,
        #[source]
        source: Box<RunError>,
    },
}
