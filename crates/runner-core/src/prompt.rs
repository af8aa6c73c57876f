//! Rendering the proposal context into the prompt text.
//!
//! The same rendering is sent to the decision service and archived as
//! `step<N>_prompt.md`, so what the service saw is always reconstructable.

use std::fmt::Write;

use crate::decision::ProposalContext;

pub fn render_prompt(context: &ProposalContext) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Task\n\n{}\n", context.goal.trim());
    let _ = writeln!(out, "## Step\n\n{}\n", context.step);

    let _ = writeln!(out, "## Targets\n");
    for target in &context.targets {
        let _ = writeln!(out, "- {target}");
    }
    let _ = writeln!(out, "\nActive target: `{}`\n", context.active_target);

    if !context.history.is_empty() {
        let _ = writeln!(out, "## Executed actions\n");
        for record in &context.history {
            let _ = writeln!(out, "- {record}");
        }
        let _ = writeln!(out);
    }

    if let Some(description) = &context.screen_description {
        let _ = writeln!(out, "## Screen description\n\n{}\n", description.trim());
    }

    let _ = writeln!(out, "## Current screen\n\n```yaml\n{}```\n", context.outline);
    let _ = writeln!(
        out,
        "Respond with exactly one JSON object for the next action, e.g. \
         {{\"action\": \"tap\", \"bounds\": \"[0,0][100,50]\"}}. \
         Use {{\"action\": \"finish\"}} when the task is complete."
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_carries_all_sections() {
        let context = ProposalContext {
            goal: "Log in".to_string(),
            step: 3,
            history: vec![json!({"action": "tap", "result": "success"})],
            outline: "tag: hierarchy\n".to_string(),
            screen_description: Some("A login form".to_string()),
            targets: vec![json!({"alias": "phone", "platform": "android"})],
            active_target: "phone".to_string(),
        };
        let prompt = render_prompt(&context);
        assert!(prompt.contains("# Task"));
        assert!(prompt.contains("Log in"));
        assert!(prompt.contains("\"alias\":\"phone\""));
        assert!(prompt.contains("Active target: `phone`"));
        assert!(prompt.contains("\"result\":\"success\""));
        assert!(prompt.contains("A login form"));
        assert!(prompt.contains("tag: hierarchy"));
    }

    #[test]
    fn empty_history_and_description_are_omitted() {
        let context = ProposalContext {
            goal: "g".to_string(),
            step: 1,
            history: Vec::new(),
            outline: String::new(),
            screen_description: None,
            targets: Vec::new(),
            active_target: "t".to_string(),
        };
        let prompt = render_prompt(&context);
        assert!(!prompt.contains("## Executed actions"));
        assert!(!prompt.contains("## Screen description"));
    }
}
