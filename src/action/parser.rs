/// Extraction of the reasoning text and the action object from a raw model
/// response.
///
/// The expected shape is
///
/// ```text
/// Reason: <why>
/// Action: {"action_type": ...}
/// ```
///
/// The `Action:`-tagged object always wins. When it is missing or does not
/// decode, the lenient mode scans for the first balanced `{...}` object that
/// carries an `action_type` key; strict mode fails instead.
use std::sync::OnceLock;

use regex::Regex;

use crate::action::model::Action;
use crate::action::wire::decode_action;
use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub reason: String,
    pub action: Action,
}

fn reason_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)Reason:\s*(.*?)\s*(?:\n\s*\**Action\**:|\z)").expect("valid reason regex")
    })
}

fn action_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\**Action\**:").expect("valid action tag regex"))
}

pub fn parse_response(text: &str, strict: bool) -> DeskPilotResult<ParsedResponse> {
    let reason = reason_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let mut tagged_error = None;
    for tag in action_tag_re().find_iter(text) {
        let Some(object) = object_after(text, tag.end()) else {
            continue;
        };
        match decode_object(object) {
            Ok(action) => return Ok(ParsedResponse { reason, action }),
            Err(e) => {
                tracing::debug!(error = %e, "tagged action block did not decode");
                tagged_error = Some(e);
            }
        }
    }

    if strict {
        return Err(tagged_error.unwrap_or_else(|| {
            DeskPilotError::MalformedResponse(format!("no 'Action:' block in response: {}", preview(text)))
        }));
    }

    for candidate in balanced_objects(text) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) else {
            continue;
        };
        if value.get("action_type").is_none() {
            continue;
        }
        tracing::debug!(candidate, "using untagged action object");
        let action = decode_action(value)?;
        return Ok(ParsedResponse { reason, action });
    }

    Err(tagged_error.unwrap_or_else(|| {
        DeskPilotError::MalformedResponse(format!("no action JSON in response: {}", preview(text)))
    }))
}

fn decode_object(object: &str) -> DeskPilotResult<Action> {
    let value: serde_json::Value = serde_json::from_str(object)
        .map_err(|e| DeskPilotError::MalformedResponse(format!("action JSON: {e}")))?;
    decode_action(value)
}

/// The balanced object starting right after `pos`, skipping whitespace and
/// an optional markdown code fence.
fn object_after(text: &str, pos: usize) -> Option<&str> {
    let rest = text[pos..].trim_start();
    let rest = rest
        .strip_prefix("```json")
        .or_else(|| rest.strip_prefix("```"))
        .unwrap_or(rest)
        .trim_start();
    let rest = rest.strip_prefix('`').unwrap_or(rest);
    if !rest.starts_with('{') {
        return None;
    }
    balanced_end(rest).map(|end| &rest[..end])
}

/// Byte length of the balanced `{...}` at the start of `s`. Braces inside
/// JSON string literals are ignored.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every top-level balanced object in `text`, in order of appearance.
fn balanced_objects(text: &str) -> impl Iterator<Item = &str> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[pos..].find('{') {
            let start = pos + offset;
            match balanced_end(&text[start..]) {
                Some(len) => {
                    pos = start + len;
                    return Some(&text[start..start + len]);
                }
                None => pos = start + 1,
            }
        }
        None
    })
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::model::{ActionKind, GoalStatus, Target};

    #[test]
    fn reason_and_tagged_action() {
        let text = "Reason: The Settings icon is element 2.\nAction: {\"action_type\": \"click\", \"index\": 2}";
        let parsed = parse_response(text, false).unwrap();
        assert_eq!(parsed.reason, "The Settings icon is element 2.");
        assert_eq!(parsed.action.kind, ActionKind::Click(Target::index(2)));
    }

    #[test]
    fn tagged_block_wins_over_stray_object() {
        let text = "Reason: the dialog shows {\"action_type\": \"wait\"} as sample text\n\
                    Action: {\"action_type\": \"status\", \"goal_status\": \"complete\"}";
        let parsed = parse_response(text, false).unwrap();
        assert_eq!(parsed.action.goal_status(), Some(GoalStatus::Complete));
    }

    #[test]
    fn tagged_block_inside_code_fence() {
        let text = "Reason: open menu\nAction: ```json\n{\"action_type\": \"right_click\", \"x\": 5, \"y\": 6}\n```";
        let parsed = parse_response(text, true).unwrap();
        assert_eq!(parsed.action.kind, ActionKind::RightClick(Target::point(5, 6)));
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let text = "Action: {\"action_type\": \"type\", \"text\": \"fn main() { }\"}";
        let parsed = parse_response(text, true).unwrap();
        assert_eq!(parsed.action.kind, ActionKind::Type { text: "fn main() { }".into() });
    }

    #[test]
    fn lenient_fallback_skips_objects_without_action_type() {
        let text = "I looked at {the screen} and {\"note\": 1} then decided {\"action_type\": \"wait\"}";
        let parsed = parse_response(text, false).unwrap();
        assert_eq!(parsed.action.kind, ActionKind::Wait);
        assert_eq!(parsed.reason, "");
    }

    #[test]
    fn malformed_tag_falls_back_in_lenient_mode() {
        let text = "Reason: x\nAction: {\"action_type\": \"click\", \"index\": }\n{\"action_type\": \"press_key\", \"key\": \"enter\"}";
        let parsed = parse_response(text, false).unwrap();
        assert_eq!(parsed.action.kind, ActionKind::PressKey { key: "enter".into() });
    }

    #[test]
    fn strict_mode_rejects_untagged_json() {
        let text = "Reason: done\n{\"action_type\": \"status\", \"goal_status\": \"complete\"}";
        let err = parse_response(text, true).unwrap_err();
        assert!(matches!(err, DeskPilotError::MalformedResponse(_)));
    }

    #[test]
    fn no_json_at_all_is_malformed() {
        let err = parse_response("I am not sure what to do.", false).unwrap_err();
        assert!(matches!(err, DeskPilotError::MalformedResponse(_)));
        assert!(err.is_step_local());
    }

    #[test]
    fn unknown_kind_parses_as_unrecognized() {
        let parsed = parse_response("Action: {\"action_type\": \"teleport\"}", false).unwrap();
        assert_eq!(parsed.action.action_type(), "teleport");
        assert!(matches!(parsed.action.kind, ActionKind::Unrecognized { .. }));
    }

    #[test]
    fn unbalanced_braces_are_skipped() {
        assert_eq!(balanced_objects("{ {\"a\":1}").collect::<Vec<_>>(), vec!["{\"a\":1}"]);
        assert_eq!(balanced_end("{\"a\":\"}\"}"), Some(9));
        assert_eq!(balanced_end("{"), None);
    }
}
