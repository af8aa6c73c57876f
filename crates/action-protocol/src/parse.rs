//! Recovery-oriented parsing of decision-service proposals.
//!
//! Model output is messy: wrapping quotes, Markdown code fences, leading
//! prose, trailing chatter after the JSON object. [`parse_action`] peels
//! those layers off and, when direct decoding still fails, clips the text to
//! the first balanced top-level object/array before retrying.

use serde_json::Value;
use thiserror::Error;

use crate::types::Action;

/// Errors surfaced by [`try_parse`]. The step loop never sees these;
/// [`parse_action`] converts them into a terminal `error` action.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No `{` or `[` anywhere in the proposal.
    #[error("no JSON payload found in proposal")]
    NoPayload,

    /// The payload could not be decoded even after balanced clipping.
    #[error("undecodable proposal: {0}")]
    Undecodable(#[from] serde_json::Error),
}

/// Parse a proposal, degrading to a synthetic `error` action on failure.
pub fn parse_action(raw: &str) -> Action {
    match try_parse(raw) {
        Ok(action) => action,
        Err(err) => Action::synthetic_error(format!("unparseable proposal: {err}")),
    }
}

/// Parse a proposal, surfacing the failure cause (used by tests and callers
/// that want to log the diagnostic separately).
pub fn try_parse(raw: &str) -> Result<Action, ProtocolError> {
    let cleaned = strip_wrapping(raw);
    let payload = clip_to_payload(&cleaned).ok_or(ProtocolError::NoPayload)?;

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(first_err) => {
            let clipped = clip_balanced(payload);
            if clipped.len() == payload.len() {
                return Err(first_err.into());
            }
            serde_json::from_str(clipped)?
        }
    };
    Ok(Action::from_value(value))
}

/// Drop BOM, one pair of wrapping quotes and Markdown code fences.
fn strip_wrapping(raw: &str) -> String {
    let mut s = raw.trim().trim_start_matches('\u{feff}').trim();

    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            s = s[1..s.len() - 1].trim();
            break;
        }
    }

    if let Some(rest) = s.strip_prefix("```") {
        // Opening fence may carry a language tag on the same line.
        s = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_' || c == '-'),
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

/// Cut leading chatter: everything before the first `{` or `[`.
fn clip_to_payload(s: &str) -> Option<&str> {
    let start = match (s.find('{'), s.find('[')) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some(&s[start..])
}

/// Clip to the first balanced top-level object/array, respecting strings and
/// escapes. Returns the input unchanged when no balanced prefix exists, so
/// the caller can surface the original decode error.
fn clip_balanced(text: &str) -> &str {
    let mut chars = text.char_indices();
    let open = match chars.next() {
        Some((_, c @ ('{' | '['))) => c,
        _ => return text,
    };
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 1usize;
    let mut in_str = false;
    let mut escaped = false;
    for (idx, ch) in chars {
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return &text[..idx + ch.len_utf8()];
                }
            }
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;

    #[test]
    fn plain_json_parses() {
        let action = parse_action(r#"{"action": "finish"}"#);
        assert_eq!(action.kind, ActionKind::Finish);
    }

    #[test]
    fn fenced_json_parses_like_unwrapped() {
        let plain = parse_action(r#"{"action":"wait","timeout":500}"#);
        let fenced = parse_action("```json\n{\"action\":\"wait\",\"timeout\":500}\n```");
        assert_eq!(plain, fenced);
    }

    #[test]
    fn fence_without_language_tag() {
        let action = parse_action("```\n{\"action\": \"finish\"}\n```");
        assert_eq!(action.kind, ActionKind::Finish);
    }

    #[test]
    fn wrapping_quotes_are_stripped() {
        let action = parse_action(r#""{\"action\": \"finish\"}""#);
        // One quote layer off; inner escaped quotes are literal JSON.
        assert_eq!(
            parse_action(r#"'{"action": "finish"}'"#).kind,
            ActionKind::Finish
        );
        // The escaped variant is undecodable and must degrade, not panic.
        assert!(matches!(
            action.kind,
            ActionKind::Finish | ActionKind::Error
        ));
    }

    #[test]
    fn leading_prose_is_cut() {
        let action =
            parse_action("Sure! The next step should be:\n{\"action\": \"tap\", \"bounds\": \"[0,0][10,10]\"}");
        assert_eq!(
            action.kind,
            ActionKind::Tap {
                bounds: Some("[0,0][10,10]".to_string()),
                xpath: None
            }
        );
    }

    #[test]
    fn trailing_chatter_is_clipped_by_balance_scan() {
        let action = parse_action("{\"action\": \"finish\"} and that completes the task.");
        assert_eq!(action.kind, ActionKind::Finish);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let raw = r#"{"action": "input", "value": "curly {brace} and \"quote\"", "xpath": "//x"} trailing"#;
        let action = parse_action(raw);
        match action.kind {
            ActionKind::Input { value, .. } => {
                assert_eq!(value, "curly {brace} and \"quote\"");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn malformed_input_degrades_to_error_action() {
        for raw in [
            "",
            "no json here at all",
            "{\"action\": \"tap\"",
            "{{{{",
            "```json\nnot json\n```",
        ] {
            let action = parse_action(raw);
            assert_eq!(action.kind, ActionKind::Error, "input: {raw:?}");
            assert!(action.to_record().get("message").is_some());
        }
    }

    #[test]
    fn unknown_action_is_not_an_error() {
        let action = parse_action(r#"{"action": "somersault"}"#);
        assert_eq!(
            action.kind,
            ActionKind::Unknown {
                name: "somersault".to_string()
            }
        );
    }

    #[test]
    fn try_parse_reports_missing_payload() {
        assert!(matches!(
            try_parse("nothing structured"),
            Err(ProtocolError::NoPayload)
        ));
    }
}
