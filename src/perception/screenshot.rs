use base64::Engine as _;
use image::RgbaImage;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::Rect;

/// A monitor as reported by the capture backend, before id assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMonitor {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl RawMonitor {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Screen capture primitive. Implementations are blocking and are driven from
/// `spawn_blocking` by the coordinate system.
pub trait ScreenSource: Send + Sync {
    /// Every connected monitor, in backend order.
    fn monitors(&self) -> DeskPilotResult<Vec<RawMonitor>>;

    /// Pixels of `region`, given in global virtual-desktop coordinates. Areas
    /// not covered by any monitor are left transparent black.
    fn capture(&self, region: Rect) -> DeskPilotResult<RgbaImage>;
}

/// Capture backend built on `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenSource for XcapScreen {
    fn monitors(&self) -> DeskPilotResult<Vec<RawMonitor>> {
        let monitors = xcap::Monitor::all().map_err(|e| DeskPilotError::Capture(e.to_string()))?;
        Ok(monitors
            .iter()
            .map(|m| RawMonitor {
                name: m.name().to_string(),
                x: m.x(),
                y: m.y(),
                width: m.width(),
                height: m.height(),
                is_primary: m.is_primary(),
            })
            .collect())
    }

    fn capture(&self, region: Rect) -> DeskPilotResult<RgbaImage> {
        let monitors = xcap::Monitor::all().map_err(|e| DeskPilotError::Capture(e.to_string()))?;
        let mut canvas = RgbaImage::new(region.width, region.height);
        let mut covered = false;

        for monitor in &monitors {
            let bounds = Rect::new(monitor.x(), monitor.y(), monitor.width(), monitor.height());
            let Some(overlap) = bounds.intersect(&region) else {
                continue;
            };
            let shot = monitor
                .capture_image()
                .map_err(|e| DeskPilotError::Capture(format!("{}: {e}", monitor.name())))?;
            // Rebuild through raw bytes so the buffer type is this crate's `image` version.
            let (w, h) = (shot.width(), shot.height());
            let shot = RgbaImage::from_raw(w, h, shot.into_raw()).ok_or_else(|| {
                DeskPilotError::Capture(format!("{}: bad frame buffer", monitor.name()))
            })?;
            blit(&mut canvas, &shot, bounds, overlap, region);
            covered = true;
        }

        if !covered {
            return Err(DeskPilotError::Capture(format!(
                "region {}x{} at ({}, {}) is outside every monitor",
                region.width, region.height, region.x, region.y
            )));
        }
        tracing::debug!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "region captured"
        );
        Ok(canvas)
    }
}

/// Copy the `overlap` area of a monitor frame (whose origin is `frame_bounds`)
/// into `canvas`, whose origin is `canvas_bounds`.
pub(crate) fn blit(
    canvas: &mut RgbaImage,
    frame: &RgbaImage,
    frame_bounds: Rect,
    overlap: Rect,
    canvas_bounds: Rect,
) {
    let sx = (overlap.x - frame_bounds.x) as u32;
    let sy = (overlap.y - frame_bounds.y) as u32;
    let w = overlap.width.min(frame.width().saturating_sub(sx));
    let h = overlap.height.min(frame.height().saturating_sub(sy));
    let part = image::imageops::crop_imm(frame, sx, sy, w, h).to_image();
    image::imageops::replace(
        canvas,
        &part,
        (overlap.x - canvas_bounds.x) as i64,
        (overlap.y - canvas_bounds.y) as i64,
    );
}

pub fn encode_png(image: &RgbaImage) -> DeskPilotResult<Vec<u8>> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

pub fn encode_png_base64(image: &RgbaImage) -> DeskPilotResult<String> {
    let bytes = encode_png(image)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub fn decode_base64_image(data: &str) -> DeskPilotResult<RgbaImage> {
    let data = data
        .split_once("base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(data);
    let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}
