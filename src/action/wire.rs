//! JSON wire adapter: the loose one-object-per-action shape the model emits,
//! converted to and from [`Action`].
use serde::{Deserialize, Serialize};

use crate::action::model::{Action, ActionKind, GoalStatus, ScrollDirection, Target};
use crate::errors::{DeskPilotError, DeskPilotResult};

const KNOWN_KINDS: &[&str] = &[
    "click",
    "double_click",
    "right_click",
    "input_text",
    "type",
    "press_key",
    "hotkey",
    "scroll",
    "drag",
    "wait",
    "answer",
    "ask_user",
    "talk_to_user",
    "status",
];

const DEFAULT_QUESTION: &str = "Agent needs input";

/// `keys` arrives either as a list or as a "ctrl+c" combo string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeysField {
    List(Vec<String>),
    Combo(String),
}

impl KeysField {
    fn into_keys(self) -> Vec<String> {
        match self {
            KeysField::List(keys) => keys,
            KeysField::Combo(combo) => combo
                .split('+')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeysField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<u32>,
}

fn require(field: Option<String>, name: &str, kind: &str) -> DeskPilotResult<String> {
    field.ok_or_else(|| DeskPilotError::MalformedResponse(format!("'{kind}' action is missing '{name}'")))
}

impl RawAction {
    fn target(&self) -> Target {
        Target {
            index: self.index,
            x: self.x,
            y: self.y,
        }
    }
}

impl TryFrom<RawAction> for Action {
    type Error = DeskPilotError;

    fn try_from(raw: RawAction) -> DeskPilotResult<Action> {
        let target = raw.target();
        let kind_name = raw.action_type.clone();
        let kind = match kind_name.as_str() {
            "click" => ActionKind::Click(target),
            "double_click" => ActionKind::DoubleClick(target),
            "right_click" => ActionKind::RightClick(target),
            "input_text" => ActionKind::InputText {
                text: require(raw.text, "text", &kind_name)?,
                target,
            },
            "type" => ActionKind::Type {
                text: require(raw.text, "text", &kind_name)?,
            },
            "press_key" => ActionKind::PressKey {
                key: require(raw.key, "key", &kind_name)?,
            },
            "hotkey" => {
                let keys = raw.keys.map(KeysField::into_keys).unwrap_or_default();
                if keys.is_empty() {
                    return Err(DeskPilotError::MalformedResponse(
                        "'hotkey' action has no keys".into(),
                    ));
                }
                ActionKind::Hotkey { keys }
            }
            "scroll" => {
                let direction = require(raw.direction, "direction", &kind_name)?;
                let direction = ScrollDirection::parse(&direction).ok_or_else(|| {
                    DeskPilotError::MalformedResponse(format!("unknown scroll direction '{direction}'"))
                })?;
                ActionKind::Scroll { direction, target }
            }
            "drag" => ActionKind::Drag { target },
            "wait" => ActionKind::Wait,
            "answer" => ActionKind::Answer {
                text: require(raw.text, "text", &kind_name)?,
            },
            "ask_user" => ActionKind::AskUser {
                question: raw.question.unwrap_or_else(|| DEFAULT_QUESTION.to_string()),
                user_response: raw.user_response,
            },
            "talk_to_user" => ActionKind::TalkToUser {
                text: require(raw.text, "text", &kind_name)?,
            },
            "status" => {
                let status = require(raw.goal_status, "goal_status", &kind_name)?;
                let goal_status = GoalStatus::parse(&status).ok_or_else(|| {
                    DeskPilotError::MalformedResponse(format!("unknown goal_status '{status}'"))
                })?;
                ActionKind::Status { goal_status }
            }
            other => {
                return Err(DeskPilotError::MalformedResponse(format!(
                    "'{other}' is not a structured action kind"
                )))
            }
        };
        Ok(Action {
            kind,
            screen: raw.screen,
        })
    }
}

impl From<&Action> for RawAction {
    fn from(action: &Action) -> RawAction {
        let mut raw = RawAction {
            action_type: action.action_type().to_string(),
            screen: action.screen,
            ..RawAction::default()
        };
        let put_target = |raw: &mut RawAction, t: &Target| {
            raw.index = t.index;
            raw.x = t.x;
            raw.y = t.y;
        };
        match &action.kind {
            ActionKind::Click(t) | ActionKind::DoubleClick(t) | ActionKind::RightClick(t) => {
                put_target(&mut raw, t)
            }
            ActionKind::Drag { target } => put_target(&mut raw, target),
            ActionKind::InputText { text, target } => {
                raw.text = Some(text.clone());
                put_target(&mut raw, target);
            }
            ActionKind::Type { text } | ActionKind::Answer { text } | ActionKind::TalkToUser { text } => {
                raw.text = Some(text.clone())
            }
            ActionKind::PressKey { key } => raw.key = Some(key.clone()),
            ActionKind::Hotkey { keys } => raw.keys = Some(KeysField::List(keys.clone())),
            ActionKind::Scroll { direction, target } => {
                raw.direction = Some(direction.as_str().to_string());
                put_target(&mut raw, target);
            }
            ActionKind::AskUser { question, user_response } => {
                raw.question = Some(question.clone());
                raw.user_response = user_response.clone();
            }
            ActionKind::Status { goal_status } => {
                raw.goal_status = Some(goal_status.as_str().to_string())
            }
            ActionKind::Wait | ActionKind::Unrecognized { .. } => {}
        }
        raw
    }
}

/// Decode one JSON object into an action. Kinds outside the known set become
/// [`ActionKind::Unrecognized`] rather than an error.
pub fn decode_action(value: serde_json::Value) -> DeskPilotResult<Action> {
    let Some(obj) = value.as_object() else {
        return Err(DeskPilotError::MalformedResponse("action is not a JSON object".into()));
    };
    let Some(action_type) = obj.get("action_type").and_then(|v| v.as_str()) else {
        return Err(DeskPilotError::MalformedResponse("action has no 'action_type'".into()));
    };
    let action_type = action_type.trim().to_lowercase();

    if !KNOWN_KINDS.contains(&action_type.as_str()) {
        let screen = obj
            .get("screen")
            .and_then(|v| v.as_u64())
            .and_then(|s| u32::try_from(s).ok());
        return Ok(Action {
            kind: ActionKind::Unrecognized {
                action_type,
                fields: value,
            },
            screen,
        });
    }

    let mut raw: RawAction = serde_json::from_value(value)
        .map_err(|e| DeskPilotError::MalformedResponse(format!("bad '{action_type}' fields: {e}")))?;
    raw.action_type = action_type;
    Action::try_from(raw)
}

/// Wire JSON for prompts, summaries and event payloads.
pub fn encode_action(action: &Action) -> serde_json::Value {
    if let ActionKind::Unrecognized { fields, .. } = &action.kind {
        return fields.clone();
    }
    serde_json::to_value(RawAction::from(action)).unwrap_or_default()
}
