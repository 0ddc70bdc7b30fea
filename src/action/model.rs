use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// `(dx, dy)` scroll delta for `amount` notches; positive `dy` is down.
    pub fn delta(&self, amount: i32) -> (i32, i32) {
        match self {
            Self::Up => (0, -amount),
            Self::Down => (0, amount),
            Self::Left => (-amount, 0),
            Self::Right => (amount, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Complete,
    Infeasible,
}

impl GoalStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "complete" | "completed" => Some(Self::Complete),
            "infeasible" => Some(Self::Infeasible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Infeasible => "infeasible",
        }
    }
}

/// Where a pointer action lands: an element index from the current
/// perception, or explicit monitor-local coordinates. Presence is checked
/// by the executor, not at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub index: Option<i64>,
    pub x: Option<i32>,
    pub y: Option<i32>,
}

impl Target {
    pub fn index(index: i64) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn point(x: i32, y: i32) -> Self {
        Self {
            index: None,
            x: Some(x),
            y: Some(y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.x.is_none() && self.y.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Click(Target),
    DoubleClick(Target),
    RightClick(Target),
    /// Clicks `target` first when one is given, then types.
    InputText { text: String, target: Target },
    Type { text: String },
    PressKey { key: String },
    Hotkey { keys: Vec<String> },
    Scroll { direction: ScrollDirection, target: Target },
    /// Source is `target` (index, else x/y); destination is `target.x/y`.
    Drag { target: Target },
    Wait,
    Answer { text: String },
    AskUser { question: String, user_response: Option<String> },
    TalkToUser { text: String },
    Status { goal_status: GoalStatus },
    /// Kind the model invented; kept verbatim so it can be logged.
    Unrecognized { action_type: String, fields: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Monitor override; `None` means the executor's default monitor.
    pub screen: Option<u32>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, screen: None }
    }

    pub fn on_screen(mut self, screen: u32) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn action_type(&self) -> &str {
        match &self.kind {
            ActionKind::Click(_) => "click",
            ActionKind::DoubleClick(_) => "double_click",
            ActionKind::RightClick(_) => "right_click",
            ActionKind::InputText { .. } => "input_text",
            ActionKind::Type { .. } => "type",
            ActionKind::PressKey { .. } => "press_key",
            ActionKind::Hotkey { .. } => "hotkey",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Drag { .. } => "drag",
            ActionKind::Wait => "wait",
            ActionKind::Answer { .. } => "answer",
            ActionKind::AskUser { .. } => "ask_user",
            ActionKind::TalkToUser { .. } => "talk_to_user",
            ActionKind::Status { .. } => "status",
            ActionKind::Unrecognized { action_type, .. } => action_type,
        }
    }

    pub fn is_status(&self) -> bool {
        matches!(self.kind, ActionKind::Status { .. })
    }

    pub fn goal_status(&self) -> Option<GoalStatus> {
        match self.kind {
            ActionKind::Status { goal_status } => Some(goal_status),
            _ => None,
        }
    }

    pub fn user_response(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::AskUser { user_response, .. } => user_response.as_deref(),
            _ => None,
        }
    }
}
