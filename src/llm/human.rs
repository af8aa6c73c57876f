//! Debug-mode oracle: the next action comes from whoever runs the CLI.

use async_trait::async_trait;
use runner_core::{render_prompt, DecisionError, DecisionService, ProposalContext};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

/// Prints the step context to stdout and reads one action line from stdin.
///
/// Used with `--debug` to step through a task by hand, typing proposals
/// like `{"action": "tap", "xpath": "//button"}`.
pub struct HumanDecisionService;

#[async_trait]
impl DecisionService for HumanDecisionService {
    async fn propose(&self, context: &ProposalContext) -> Result<String, DecisionError> {
        println!("{}", render_prompt(context));
        println!("next action> ");

        let mut line = String::new();
        let mut reader = BufReader::new(stdin());
        reader
            .read_line(&mut line)
            .await
            .map_err(|err| DecisionError::service(format!("stdin read failed: {err}")))?;
        if line.trim().is_empty() {
            // An empty line means the operator is done.
            return Ok(r#"{"action": "finish"}"#.to_string());
        }
        Ok(line)
    }
}
