use image::RgbaImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Icon,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Text => f.write_str("text"),
            ElementKind::Icon => f.write_str("icon"),
        }
    }
}

/// One detected region on the observed screen. All geometry is local to the
/// monitor the screenshot was taken on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub content: String,
    /// `[x, y, width, height]` in pixels.
    pub bbox: [i32; 4],
    pub center: [i32; 2],
    #[serde(default = "default_clickable")]
    pub is_clickable: bool,
}

fn default_clickable() -> bool {
    true
}

impl UIElement {
    pub fn center_point(&self) -> (i32, i32) {
        (self.center[0], self.center[1])
    }

    /// Content cut to `max_chars` for prompt display. Matching always uses
    /// the full `content`.
    pub fn display_content(&self, max_chars: usize) -> String {
        if self.content.chars().count() > max_chars {
            let cut: String = self.content.chars().take(max_chars).collect();
            format!("{cut}...")
        } else {
            self.content.clone()
        }
    }
}

/// A physical monitor in virtual-desktop coordinates. `id` 0 is always the
/// primary monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
    #[serde(default)]
    pub name: String,
}

impl ScreenInfo {
    pub fn bounds(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Display for ScreenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let primary = if self.is_primary { " (primary)" } else { "" };
        write!(
            f,
            "Screen {}{primary}: {}x{} at ({}, {}) {}",
            self.id, self.width, self.height, self.x, self.y, self.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
    }

    /// Smallest rectangle covering every rect in `rects`.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        rects.into_iter().fold(None, |acc: Option<Rect>, r| {
            Some(match acc {
                None => *r,
                Some(a) => {
                    let x1 = a.x.min(r.x);
                    let y1 = a.y.min(r.y);
                    let x2 = a.right().max(r.right());
                    let y2 = a.bottom().max(r.bottom());
                    Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32)
                }
            })
        })
    }
}

/// Output of one perception call. Element indices are only meaningful
/// against this element list.
#[derive(Debug, Clone)]
pub struct Perception {
    pub labeled_image: RgbaImage,
    pub elements: Vec<UIElement>,
}
