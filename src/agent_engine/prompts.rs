use crate::perception::types::UIElement;

const ELEMENT_CONTENT_CHARS: usize = 50;

const SYSTEM_PROMPT: &str = "\
You operate a desktop computer on behalf of a user.
Depending on the user's goal you either answer a question directly or carry out a task
on the computer one action at a time.

Each step you receive:
1. A screenshot of the current screen with UI elements marked by numeric indexes
2. The list of detected UI elements
3. A summary of the steps taken so far
4. The screen you are operating on

Choose exactly ONE action from this list:

- Click an element: {\"action_type\": \"click\", \"index\": <index>}
- Click a point: {\"action_type\": \"click\", \"x\": <x>, \"y\": <y>}
- Double click: {\"action_type\": \"double_click\", \"index\": <index>}
- Right click: {\"action_type\": \"right_click\", \"index\": <index>}
- Click an element, then type: {\"action_type\": \"input_text\", \"text\": \"<text>\", \"index\": <index>}
- Type at the current focus: {\"action_type\": \"type\", \"text\": \"<text>\"}
- Press a key: {\"action_type\": \"press_key\", \"key\": \"<key name>\"}
- Key combination: {\"action_type\": \"hotkey\", \"keys\": [\"ctrl\", \"c\"]}
- Scroll: {\"action_type\": \"scroll\", \"direction\": \"<up|down|left|right>\", \"index\": <optional index>}
- Drag an element to a point: {\"action_type\": \"drag\", \"index\": <from index>, \"x\": <to x>, \"y\": <to y>}
- Wait for the screen to change: {\"action_type\": \"wait\"}
- Answer the user's question: {\"action_type\": \"answer\", \"text\": \"<answer>\"}
- Ask the user something: {\"action_type\": \"ask_user\", \"question\": \"<question>\"}
- Tell the user something: {\"action_type\": \"talk_to_user\", \"text\": \"<message>\"}
- Goal achieved: {\"action_type\": \"status\", \"goal_status\": \"complete\"}
- Goal impossible: {\"action_type\": \"status\", \"goal_status\": \"infeasible\"}

SCREENS:
- You are operating on screen {screen} (0 is the primary screen).
- Coordinates and element indexes refer to this screen.
- To act on another screen add \"screen\": <screen index> to the action,
  e.g. {\"action_type\": \"click\", \"x\": 100, \"y\": 200, \"screen\": 1}.
- Without \"screen\" the action runs on screen {screen}.

GUIDELINES:
- Prefer the simplest way to reach the goal
- If an action had no effect, try a different approach
- Only use indexes that are visible in the current screenshot
- Scroll to reveal more content when needed
- If the goal is already satisfied, report status complete
- Use ask_user when you need clarification and talk_to_user to report progress

OUTPUT FORMAT:
Reason: <one or two sentences on why this action>
Action: <one action JSON object>";

const SUMMARY_INSTRUCTIONS: &str = "\
Compare the before and after screenshots and summarize this step in under 50 words:
what the action was meant to do, whether it worked, and what should happen next if relevant.";

/// One line per element; content is shortened for display only.
pub fn format_elements(elements: &[UIElement]) -> String {
    if elements.is_empty() {
        return "(No elements detected)".to_string();
    }
    elements
        .iter()
        .map(|e| {
            format!(
                "Element {}: type={}, content=\"{}\", center=({}, {})",
                e.index,
                e.kind,
                e.display_content(ELEMENT_CONTENT_CHARS),
                e.center[0],
                e.center[1]
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_decision_prompt(
    goal: &str,
    history_digest: &str,
    elements: &[UIElement],
    screen: u32,
    guidelines: &str,
) -> String {
    let system = SYSTEM_PROMPT.replace("{screen}", &screen.to_string());
    let mut prompt = format!(
        "{system}\n\nCURRENT GOAL: {goal}\n\nHISTORY:\n{history_digest}\n\nDETECTED UI ELEMENTS:\n{}\n",
        format_elements(elements)
    );
    if !guidelines.trim().is_empty() {
        prompt.push_str(&format!("\nADDITIONAL GUIDELINES:\n{}\n", guidelines.trim()));
    }
    prompt.push_str("\nAnalyze the screenshot and choose an action.\nYour Answer:\n");
    prompt
}

/// Model text is inserted verbatim; braces inside it are never expanded.
pub fn build_summary_prompt(action_json: &str, reason: &str) -> String {
    format!("{SUMMARY_INSTRUCTIONS}\n\nAction performed: {action_json}\nReason: {reason}\n\nSummary:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::ElementKind;

    fn element(index: usize, content: &str) -> UIElement {
        UIElement {
            index,
            kind: ElementKind::Text,
            content: content.into(),
            bbox: [0, 0, 10, 10],
            center: [5, 5],
            is_clickable: true,
        }
    }

    #[test]
    fn decision_prompt_carries_goal_history_elements_and_screen() {
        let prompt = build_decision_prompt(
            "Open Settings",
            "Step 1: Opened the start menu.",
            &[element(0, "Settings")],
            1,
            "Never close unsaved documents.",
        );
        assert!(prompt.contains("operating on screen 1"));
        assert!(!prompt.contains("{screen}"));
        assert!(prompt.contains("CURRENT GOAL: Open Settings"));
        assert!(prompt.contains("Step 1: Opened the start menu."));
        assert!(prompt.contains("Element 0: type=text, content=\"Settings\", center=(5, 5)"));
        assert!(prompt.contains("Never close unsaved documents."));
        assert!(prompt.contains("Reason:"));
        assert!(prompt.contains("Action:"));
    }

    #[test]
    fn long_element_content_is_shortened_for_display() {
        let long = "x".repeat(80);
        let listing = format_elements(&[element(3, &long)]);
        assert!(listing.contains(&format!("content=\"{}...\"", "x".repeat(50))));
    }

    #[test]
    fn summary_prompt_embeds_action_and_reason() {
        let prompt = build_summary_prompt(r#"{"action_type":"wait"}"#, "page loading");
        assert!(prompt.contains(r#"Action performed: {"action_type":"wait"}"#));
        assert!(prompt.contains("Reason: page loading"));
    }

    #[test]
    fn placeholder_text_from_the_model_is_left_alone() {
        let action = r#"{"action_type":"type","text":"{reason}"}"#;
        let prompt = build_summary_prompt(action, "fill {action} field");
        assert!(prompt.contains(&format!("Action performed: {action}\n")));
        assert!(prompt.contains("Reason: fill {action} field\n"));
        assert!(prompt.ends_with("Summary:"));
    }
}
