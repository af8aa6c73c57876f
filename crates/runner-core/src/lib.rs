//! Task execution engine: the step state machine and the run aggregator.
//!
//! A run prepares a set of automation targets, then walks its task list.
//! Scripted tasks replay authored actions; exploratory tasks loop through
//! capture, decision-service proposal, parse, resolve and dispatch until a
//! terminal action. Everything a step does leaves an artifact in the task
//! folder.

mod apps;
mod artifacts;
mod decision;
mod dispatch;
mod error;
mod executor;
mod prompt;
mod run;

pub use apps::AppAliases;
pub use artifacts::ArtifactStore;
pub use decision::{
    effective_llm_mode, DecisionError, DecisionService, MockDecisionService, ProposalContext,
};
pub use dispatch::{execute_action, DispatchConfig};
pub use error::RunError;
pub use executor::{ExecutorConfig, StepExecutor};
pub use prompt::render_prompt;
pub use run::{RunConfig, RunPool, RunRequest, Runner};
