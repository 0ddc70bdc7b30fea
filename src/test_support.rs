//! In-memory stand-ins for the desktop, the models, and the operator.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::agent_engine::operator::Operator;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::input::{InputDevice, MouseButton};
use crate::llm::provider::DecisionPort;
use crate::llm::types::Prediction;
use crate::perception::screenshot::{RawMonitor, ScreenSource};
use crate::perception::traits::PerceptionPort;
use crate::perception::types::{ElementKind, Perception, Rect, UIElement};

pub(crate) struct FakeScreen {
    monitors: Vec<RawMonitor>,
    captured: Mutex<Vec<Rect>>,
}

impl FakeScreen {
    pub(crate) fn new(monitors: Vec<RawMonitor>) -> Self {
        Self {
            monitors,
            captured: Mutex::new(Vec::new()),
        }
    }

    /// A 1280x1024 secondary at (1920, -200), listed before the 1920x1080
    /// primary at the origin.
    pub(crate) fn dual() -> Self {
        Self::new(vec![
            Self::monitor("SIDE", 1920, -200, 1280, 1024, false),
            Self::monitor("MAIN", 0, 0, 1920, 1080, true),
        ])
    }

    pub(crate) fn monitor(name: &str, x: i32, y: i32, width: u32, height: u32, primary: bool) -> RawMonitor {
        RawMonitor {
            name: name.to_string(),
            x,
            y,
            width,
            height,
            is_primary: primary,
        }
    }

    pub(crate) fn captured(&self) -> Vec<Rect> {
        self.captured.lock().unwrap().clone()
    }
}

impl ScreenSource for FakeScreen {
    fn monitors(&self) -> DeskPilotResult<Vec<RawMonitor>> {
        Ok(self.monitors.clone())
    }

    fn capture(&self, region: Rect) -> DeskPilotResult<RgbaImage> {
        self.captured.lock().unwrap().push(region);
        Ok(RgbaImage::from_pixel(region.width, region.height, Rgba([40, 40, 40, 255])))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputEvent {
    Move(i32, i32),
    Click(MouseButton, u32),
    Down(MouseButton),
    Up(MouseButton),
    KeyDown(String),
    KeyUp(String),
    KeyTap(String),
    Type(String),
    Scroll(i32, i32),
}

pub(crate) struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
    position: Mutex<(i32, i32)>,
    failing_key: Option<String>,
}

impl RecordingInput {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            position: Mutex::new((0, 0)),
            failing_key: None,
        }
    }

    /// Pressing `key` fails and records nothing.
    pub(crate) fn fail_on_key(mut self, key: &str) -> Self {
        self.failing_key = Some(key.to_string());
        self
    }

    pub(crate) fn at(self, x: i32, y: i32) -> Self {
        *self.position.lock().unwrap() = (x, y);
        self
    }

    pub(crate) fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn record(&self, event: InputEvent) -> DeskPilotResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    fn check_key(&self, key: &str) -> DeskPilotResult<()> {
        match &self.failing_key {
            Some(bad) if bad == key => Err(DeskPilotError::Input(format!("unknown key '{key}'"))),
            _ => Ok(()),
        }
    }
}

impl InputDevice for RecordingInput {
    fn move_to(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        *self.position.lock().unwrap() = (x, y);
        self.record(InputEvent::Move(x, y))
    }

    fn position(&self) -> DeskPilotResult<(i32, i32)> {
        Ok(*self.position.lock().unwrap())
    }

    fn click(&self, button: MouseButton, count: u32) -> DeskPilotResult<()> {
        self.record(InputEvent::Click(button, count))
    }

    fn button_down(&self, button: MouseButton) -> DeskPilotResult<()> {
        self.record(InputEvent::Down(button))
    }

    fn button_up(&self, button: MouseButton) -> DeskPilotResult<()> {
        self.record(InputEvent::Up(button))
    }

    fn key_down(&self, key: &str) -> DeskPilotResult<()> {
        self.check_key(key)?;
        self.record(InputEvent::KeyDown(key.to_string()))
    }

    fn key_up(&self, key: &str) -> DeskPilotResult<()> {
        self.record(InputEvent::KeyUp(key.to_string()))
    }

    fn key_tap(&self, key: &str) -> DeskPilotResult<()> {
        self.check_key(key)?;
        self.record(InputEvent::KeyTap(key.to_string()))
    }

    fn type_text(&self, text: &str) -> DeskPilotResult<()> {
        self.record(InputEvent::Type(text.to_string()))
    }

    fn scroll(&self, dx: i32, dy: i32) -> DeskPilotResult<()> {
        self.record(InputEvent::Scroll(dx, dy))
    }
}

/// A 20x20 icon centred on `(cx, cy)`.
pub(crate) fn element(index: usize, cx: i32, cy: i32) -> UIElement {
    UIElement {
        index,
        kind: ElementKind::Icon,
        content: format!("element {index}"),
        bbox: [cx - 10, cy - 10, 20, 20],
        center: [cx, cy],
        is_clickable: true,
    }
}

/// Replies from a fixed script, recording every prompt it was asked.
pub(crate) struct ScriptedDecision {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    image_counts: Mutex<Vec<usize>>,
}

impl ScriptedDecision {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            image_counts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every prompt with `reply`.
    pub(crate) fn repeating(reply: &str) -> Self {
        let mut scripted = Self::new(&[]);
        scripted.fallback = Some(reply.to_string());
        scripted
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn image_counts(&self) -> Vec<usize> {
        self.image_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionPort for ScriptedDecision {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn predict(&self, prompt: &str, images: &[&RgbaImage]) -> DeskPilotResult<Prediction> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.image_counts.lock().unwrap().push(images.len());
        let next = self.replies.lock().unwrap().pop_front();
        let text = next
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| DeskPilotError::Decision("script exhausted".into()))?;
        Ok(Prediction {
            raw: serde_json::json!({ "text": text }),
            text,
        })
    }
}

/// Returns the same elements for every screenshot, which doubles as the
/// labeled image.
pub(crate) struct FixedPerception {
    elements: Vec<UIElement>,
}

impl FixedPerception {
    pub(crate) fn new(elements: Vec<UIElement>) -> Self {
        Self { elements }
    }
}

#[async_trait]
impl PerceptionPort for FixedPerception {
    async fn parse(&self, image: &RgbaImage) -> DeskPilotResult<Perception> {
        Ok(Perception {
            labeled_image: image.clone(),
            elements: self.elements.clone(),
        })
    }
}

/// Every parse fails, as when the detection server is down.
pub(crate) struct FailingPerception;

#[async_trait]
impl PerceptionPort for FailingPerception {
    async fn parse(&self, _image: &RgbaImage) -> DeskPilotResult<Perception> {
        Err(DeskPilotError::Perception("server unavailable".into()))
    }
}

/// Answers every question with a fixed reply and records all traffic.
pub(crate) struct ImmediateOperator {
    reply: String,
    questions: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
}

impl ImmediateOperator {
    pub(crate) fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            questions: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for ImmediateOperator {
    async fn ask(&self, question: &str) -> DeskPilotResult<String> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self.reply.clone())
    }

    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
