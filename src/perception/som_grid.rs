/// Numbered-grid perception (set-of-mark over a fixed grid).
///
/// Draws an N×N grid on the screenshot and prints each cell's index in its
/// top-left corner. Every cell is reported as one clickable element:
///   - index  = row · N + col, row-major from the top-left cell
///   - bbox   = the cell rectangle
///   - center = the cell center
///
/// Needs no parsing server, at the cost of coarse targeting.
use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::errors::DeskPilotResult;
use crate::perception::traits::PerceptionPort;
use crate::perception::types::{ElementKind, Perception, UIElement};

// 5×5 digit glyphs; bit4 is the leftmost pixel of each row.
const DIGITS_5X5: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
];

const LINE_COLOR: Rgba<u8> = Rgba([0, 200, 255, 130]);
const LABEL_COLOR: Rgba<u8> = Rgba([255, 220, 0, 255]);
const LABEL_PAD: u32 = 4;

#[derive(Debug, Clone)]
pub struct GridPerception {
    grid_n: u32,
}

impl GridPerception {
    pub fn new(grid_n: u32) -> Self {
        Self {
            grid_n: grid_n.max(1),
        }
    }

    pub fn grid_n(&self) -> u32 {
        self.grid_n
    }

    /// Cell elements for an image of `width × height`.
    pub fn cells(&self, width: u32, height: u32) -> Vec<UIElement> {
        let n = self.grid_n;
        let mut cells = Vec::with_capacity((n * n) as usize);
        for row in 0..n {
            for col in 0..n {
                let (x0, x1) = span(col, n, width);
                let (y0, y1) = span(row, n, height);
                let index = (row * n + col) as usize;
                cells.push(UIElement {
                    index,
                    kind: ElementKind::Icon,
                    content: format!("grid cell row {} col {}", row + 1, col + 1),
                    bbox: [x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32],
                    center: [((x0 + x1) / 2) as i32, ((y0 + y1) / 2) as i32],
                    is_clickable: true,
                });
            }
        }
        cells
    }

    pub fn draw(&self, image: &RgbaImage) -> RgbaImage {
        let mut canvas = image.clone();
        let (w, h) = canvas.dimensions();
        let n = self.grid_n;

        for i in 1..n {
            let x = span(i, n, w).0;
            for y in 0..h {
                for dx in 0..2 {
                    if x + dx < w {
                        blend_pixel(canvas.get_pixel_mut(x + dx, y), LINE_COLOR);
                    }
                }
            }
            let y = span(i, n, h).0;
            for x in 0..w {
                for dy in 0..2 {
                    if y + dy < h {
                        blend_pixel(canvas.get_pixel_mut(x, y + dy), LINE_COLOR);
                    }
                }
            }
        }

        let scale = if w / n >= 80 { 2 } else { 1 };
        for cell in self.cells(w, h) {
            let lx = cell.bbox[0] as u32 + LABEL_PAD;
            let ly = cell.bbox[1] as u32 + LABEL_PAD;
            draw_number(&mut canvas, cell.index, lx, ly, scale);
        }
        canvas
    }
}

#[async_trait]
impl PerceptionPort for GridPerception {
    async fn parse(&self, image: &RgbaImage) -> DeskPilotResult<Perception> {
        let elements = self.cells(image.width(), image.height());
        let labeled_image = self.draw(image);
        tracing::debug!(grid_n = self.grid_n, cells = elements.len(), "grid overlay drawn");
        Ok(Perception {
            labeled_image,
            elements,
        })
    }
}

/// Pixel range `[start, end)` covered by cell `i` of `n` along a `len`-pixel axis.
fn span(i: u32, n: u32, len: u32) -> (u32, u32) {
    let at = |k: u32| ((k as u64 * len as u64) / n as u64) as u32;
    (at(i), at(i + 1))
}

fn blend_pixel(pixel: &mut Rgba<u8>, color: Rgba<u8>) {
    let alpha = color[3] as f32 / 255.0;
    for c in 0..3 {
        pixel[c] = (pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha).round() as u8;
    }
}

fn draw_number(canvas: &mut RgbaImage, number: usize, px: u32, py: u32, scale: u32) {
    let step = 5 * scale + 1;
    for (i, c) in number.to_string().chars().enumerate() {
        if let Some(d) = c.to_digit(10) {
            draw_digit(canvas, d as usize, px + i as u32 * step, py, scale);
        }
    }
}

/// One glyph on a darkened backing box so it stays readable on any background.
fn draw_digit(canvas: &mut RgbaImage, digit: usize, px: u32, py: u32, scale: u32) {
    let (w, h) = canvas.dimensions();
    let size = 5 * scale;

    for y in py.saturating_sub(1)..(py + size + 1).min(h) {
        for x in px.saturating_sub(1)..(px + size + 1).min(w) {
            let p = canvas.get_pixel_mut(x, y);
            for c in 0..3 {
                p[c] /= 4;
            }
            p[3] = 255;
        }
    }

    for (row, bits) in DIGITS_5X5[digit].iter().enumerate() {
        for col in 0..5u32 {
            if (bits >> (4 - col)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + col * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        canvas.put_pixel(x, y, LABEL_COLOR);
                    }
                }
            }
        }
    }
}
