//! uiscout CLI: wiring of the execution engine.
//!
//! The engine crates are transport- and service-agnostic; this crate binds
//! them to the real world: command-line arguments, layered configuration,
//! tracing bootstrap, the OpenAI-compatible decision/vision services and
//! the human stdin oracle for debug runs.

pub mod cli;
pub mod config;
pub mod llm;

pub use cli::Cli;
pub use config::AppConfig;
