//! Action dispatch: target resolution plus the primitive input sequence for
//! every action kind.
use std::sync::Arc;
use std::time::Duration;

use crate::action::model::{Action, ActionKind, Target};
use crate::agent_engine::operator::Operator;
use crate::config::AgentConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::CoordinateSystem;
use crate::executor::input::{InputDevice, MouseButton};
use crate::perception::types::UIElement;

/// Fixed pauses and magnitudes used while acting.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorTiming {
    pub focus_settle: Duration,
    pub wait: Duration,
    pub drag_duration: Duration,
    pub drag_steps: u32,
    pub scroll_amount: i32,
}

impl From<&AgentConfig> for ExecutorTiming {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            focus_settle: Duration::from_millis(cfg.focus_settle_ms),
            wait: Duration::from_millis(cfg.wait_ms),
            drag_duration: Duration::from_millis(cfg.drag_duration_ms),
            drag_steps: cfg.drag_steps.max(1),
            scroll_amount: cfg.scroll_amount,
        }
    }
}

impl Default for ExecutorTiming {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

#[cfg(test)]
impl ExecutorTiming {
    /// No pauses; two-step drags; five-notch scrolls.
    pub(crate) fn immediate() -> Self {
        Self {
            focus_settle: Duration::ZERO,
            wait: Duration::ZERO,
            drag_duration: Duration::ZERO,
            drag_steps: 2,
            scroll_amount: 5,
        }
    }
}

pub struct ActionExecutor {
    coords: CoordinateSystem,
    input: Arc<dyn InputDevice>,
    screen: u32,
    timing: ExecutorTiming,
    operator: Option<Arc<dyn Operator>>,
}

impl ActionExecutor {
    pub fn new(
        coords: CoordinateSystem,
        input: Arc<dyn InputDevice>,
        screen: u32,
        timing: ExecutorTiming,
    ) -> Self {
        Self {
            coords,
            input,
            screen,
            timing,
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Default monitor for actions without a `screen` override.
    pub fn screen(&self) -> u32 {
        self.screen
    }

    pub fn coords(&self) -> &CoordinateSystem {
        &self.coords
    }

    /// Pointer location local to `screen`, or global for `None`.
    pub fn position(&self, screen: Option<u32>) -> DeskPilotResult<(i32, i32)> {
        let (gx, gy) = self.input.position()?;
        self.coords.to_local(gx, gy, screen)
    }

    /// Perform one action against the element list from the same perception
    /// pass. Returns whether the run should continue.
    ///
    /// Targets and screens are resolved before any input is injected, so an
    /// `InvalidIndex`, `MissingTarget`, `ScreenOutOfRange` or
    /// `CoordinateOverflow` leaves the desktop untouched.
    pub async fn execute(&self, action: &mut Action, elements: &[UIElement]) -> DeskPilotResult<bool> {
        let screen = action.screen.unwrap_or(self.screen);
        let action_type = action.action_type().to_string();
        tracing::info!(action = %action_type, screen, "executing action");

        match &mut action.kind {
            ActionKind::Status { goal_status } => {
                tracing::info!(status = goal_status.as_str(), "goal status reported");
                return Ok(false);
            }
            ActionKind::Answer { text } => {
                tracing::info!(answer = %text, "agent answered");
                self.notify(text).await;
                return Ok(false);
            }
            ActionKind::TalkToUser { text } => {
                tracing::info!(message = %text, "agent message");
                self.notify(text).await;
            }
            ActionKind::AskUser { question, user_response } => {
                tracing::info!(question = %question, "agent asks the operator");
                match &self.operator {
                    Some(op) => {
                        let reply = op.ask(question).await?;
                        tracing::info!(reply = %reply, "operator replied");
                        *user_response = Some(reply);
                    }
                    None => tracing::warn!("no operator attached; ask_user left unanswered"),
                }
            }
            ActionKind::Wait => tokio::time::sleep(self.timing.wait).await,

            ActionKind::Click(target) => {
                let (x, y) = resolve(target, elements, &action_type)?;
                self.click_at(x, y, screen, MouseButton::Left, 1)?;
            }
            ActionKind::DoubleClick(target) => {
                let (x, y) = resolve(target, elements, &action_type)?;
                self.click_at(x, y, screen, MouseButton::Left, 2)?;
            }
            ActionKind::RightClick(target) => {
                let (x, y) = resolve(target, elements, &action_type)?;
                self.click_at(x, y, screen, MouseButton::Right, 1)?;
            }
            ActionKind::InputText { text, target } => {
                if !target.is_empty() {
                    let (x, y) = resolve(target, elements, &action_type)?;
                    self.click_at(x, y, screen, MouseButton::Left, 1)?;
                    tokio::time::sleep(self.timing.focus_settle).await;
                }
                self.input.type_text(text)?;
            }
            ActionKind::Type { text } => self.input.type_text(text)?,
            ActionKind::PressKey { key } => self.input.key_tap(key)?,
            ActionKind::Hotkey { keys } => self.hotkey(keys)?,
            ActionKind::Scroll { direction, target } => {
                if !target.is_empty() {
                    let (x, y) = resolve(target, elements, &action_type)?;
                    self.move_to(x, y, screen)?;
                }
                let (dx, dy) = direction.delta(self.timing.scroll_amount);
                self.input.scroll(dx, dy)?;
            }
            ActionKind::Drag { target } => self.drag(target, elements, screen, &action_type).await?,
            ActionKind::Unrecognized { action_type, fields } => {
                tracing::warn!(action = %action_type, fields = %fields, "unrecognized action ignored");
            }
        }
        Ok(true)
    }

    async fn notify(&self, text: &str) {
        if let Some(op) = &self.operator {
            op.notify(text).await;
        }
    }

    fn move_to(&self, x: i32, y: i32, screen: u32) -> DeskPilotResult<()> {
        let (gx, gy) = self.coords.to_global(x, y, Some(screen))?;
        tracing::debug!(x, y, gx, gy, screen, "pointer move");
        self.input.move_to(gx, gy)
    }

    fn click_at(&self, x: i32, y: i32, screen: u32, button: MouseButton, count: u32) -> DeskPilotResult<()> {
        self.move_to(x, y, screen)?;
        self.input.click(button, count)
    }

    /// Press in order, release in reverse. Keys already held are released
    /// even when a later press fails.
    fn hotkey(&self, keys: &[String]) -> DeskPilotResult<()> {
        let mut held = Vec::with_capacity(keys.len());
        let mut result = Ok(());
        for key in keys {
            if let Err(e) = self.input.key_down(key) {
                result = Err(e);
                break;
            }
            held.push(key);
        }
        for key in held.iter().rev() {
            let released = self.input.key_up(key);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    /// Source is the element at `target.index`, or the current pointer
    /// location without one. Destination is `target.x/y` on the same monitor.
    async fn drag(
        &self,
        target: &Target,
        elements: &[UIElement],
        screen: u32,
        action_type: &str,
    ) -> DeskPilotResult<()> {
        let (Some(to_x), Some(to_y)) = (target.x, target.y) else {
            return Err(DeskPilotError::MissingTarget {
                action_type: action_type.to_string(),
            });
        };
        let (from_x, from_y) = match target.index {
            Some(index) => element_center(index, elements)?,
            None => self.position(Some(screen))?,
        };
        let (fx, fy) = self.coords.to_global(from_x, from_y, Some(screen))?;
        let (tx, ty) = self.coords.to_global(to_x, to_y, Some(screen))?;

        self.input.move_to(fx, fy)?;
        self.input.button_down(MouseButton::Left)?;
        let steps = self.timing.drag_steps.max(1);
        let pause = self.timing.drag_duration / steps;
        for i in 1..=steps {
            // Interpolate in f64; the result stays between the endpoints.
            let t = f64::from(i) / f64::from(steps);
            let x = (f64::from(fx) + (f64::from(tx) - f64::from(fx)) * t).round() as i32;
            let y = (f64::from(fy) + (f64::from(ty) - f64::from(fy)) * t).round() as i32;
            if let Err(e) = self.input.move_to(x, y) {
                let _ = self.input.button_up(MouseButton::Left);
                return Err(e);
            }
            tokio::time::sleep(pause).await;
        }
        self.input.button_up(MouseButton::Left)
    }
}

/// Monitor-local point for a pointer action: the element center for an
/// index, else explicit x/y.
fn resolve(target: &Target, elements: &[UIElement], action_type: &str) -> DeskPilotResult<(i32, i32)> {
    if let Some(index) = target.index {
        return element_center(index, elements);
    }
    match (target.x, target.y) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(DeskPilotError::MissingTarget {
            action_type: action_type.to_string(),
        }),
    }
}

fn element_center(index: i64, elements: &[UIElement]) -> DeskPilotResult<(i32, i32)> {
    elements
        .iter()
        .find(|e| e.index as i64 == index)
        .map(UIElement::center_point)
        .ok_or_else(|| DeskPilotError::InvalidIndex {
            index,
            available: available_indices(elements),
        })
}

fn available_indices(elements: &[UIElement]) -> String {
    if elements.is_empty() {
        return "none".to_string();
    }
    elements
        .iter()
        .map(|e| e.index.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
