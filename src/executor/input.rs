// Physical input injection. All coordinates here are global virtual-desktop pixels.
use std::sync::Mutex;

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Low-level input primitives. Scroll deltas follow screen orientation:
/// positive `dy` scrolls down, positive `dx` scrolls right.
pub trait InputDevice: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> DeskPilotResult<()>;
    fn position(&self) -> DeskPilotResult<(i32, i32)>;
    fn click(&self, button: MouseButton, count: u32) -> DeskPilotResult<()>;
    fn button_down(&self, button: MouseButton) -> DeskPilotResult<()>;
    fn button_up(&self, button: MouseButton) -> DeskPilotResult<()>;
    fn key_down(&self, key: &str) -> DeskPilotResult<()>;
    fn key_up(&self, key: &str) -> DeskPilotResult<()>;
    fn key_tap(&self, key: &str) -> DeskPilotResult<()>;
    fn type_text(&self, text: &str) -> DeskPilotResult<()>;
    fn scroll(&self, dx: i32, dy: i32) -> DeskPilotResult<()>;
}

/// `enigo`-backed input device. One connection is held for the device's
/// lifetime so held buttons and keys survive between calls.
pub struct EnigoInput {
    enigo: Mutex<Enigo>,
}

impl EnigoInput {
    pub fn new() -> DeskPilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| DeskPilotError::Input(format!("connect: {e}")))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut Enigo) -> Result<T, enigo::InputError>) -> DeskPilotResult<T> {
        let mut enigo = self
            .enigo
            .lock()
            .map_err(|_| DeskPilotError::Input("input device lock poisoned".into()))?;
        f(&mut enigo).map_err(|e| DeskPilotError::Input(e.to_string()))
    }
}

fn enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

impl InputDevice for EnigoInput {
    fn move_to(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        self.with(|e| e.move_mouse(x, y, Coordinate::Abs))
    }

    fn position(&self) -> DeskPilotResult<(i32, i32)> {
        self.with(|e| e.location())
    }

    fn click(&self, button: MouseButton, count: u32) -> DeskPilotResult<()> {
        let button = enigo_button(button);
        self.with(|e| {
            for _ in 0..count {
                e.button(button, Direction::Click)?;
            }
            Ok(())
        })
    }

    fn button_down(&self, button: MouseButton) -> DeskPilotResult<()> {
        self.with(|e| e.button(enigo_button(button), Direction::Press))
    }

    fn button_up(&self, button: MouseButton) -> DeskPilotResult<()> {
        self.with(|e| e.button(enigo_button(button), Direction::Release))
    }

    fn key_down(&self, key: &str) -> DeskPilotResult<()> {
        let key = parse_key(key)?;
        self.with(|e| e.key(key, Direction::Press))
    }

    fn key_up(&self, key: &str) -> DeskPilotResult<()> {
        let key = parse_key(key)?;
        self.with(|e| e.key(key, Direction::Release))
    }

    fn key_tap(&self, key: &str) -> DeskPilotResult<()> {
        let key = parse_key(key)?;
        self.with(|e| e.key(key, Direction::Click))
    }

    fn type_text(&self, text: &str) -> DeskPilotResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.with(|e| e.text(text))
    }

    fn scroll(&self, dx: i32, dy: i32) -> DeskPilotResult<()> {
        self.with(|e| {
            if dy != 0 {
                e.scroll(dy, Axis::Vertical)?;
            }
            if dx != 0 {
                e.scroll(dx, Axis::Horizontal)?;
            }
            Ok(())
        })
    }
}

/// Map a model-supplied key name ("ctrl", "Enter", "f5", "a") to an enigo key.
pub fn parse_key(name: &str) -> DeskPilotResult<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" | "ctrl_l" | "ctrl_r" => Key::Control,
        "shift" | "shift_l" | "shift_r" => Key::Shift,
        "alt" | "alt_l" | "alt_r" | "option" => Key::Alt,
        "cmd" | "command" | "win" | "windows" | "super" | "meta" => Key::Meta,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "space" | "spacebar" => Key::Space,
        "up" | "arrowup" => Key::UpArrow,
        "down" | "arrowdown" => Key::DownArrow,
        "left" | "arrowleft" => Key::LeftArrow,
        "right" | "arrowright" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" => Key::PageUp,
        "pagedown" | "page_down" => Key::PageDown,
        "capslock" | "caps_lock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = name.trim().chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c.to_ascii_lowercase()),
                _ => return Err(DeskPilotError::Input(format!("unknown key: {name}"))),
            }
        }
    };
    Ok(key)
}
