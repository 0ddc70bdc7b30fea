/// Multi-monitor coordinate mapping.
///
/// Every monitor has a local pixel space whose origin is its top-left corner.
/// The input and capture primitives work in one global virtual-desktop space.
/// Translation between the two is a pure offset, no scaling.
///
/// `screen = None` is a sentinel: for translations it means the coordinates
/// are already global, for enumeration and capture it means the union of all
/// monitors. It never means monitor 0.
use std::sync::Arc;

use image::RgbaImage;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::screenshot::ScreenSource;
use crate::perception::types::{Rect, ScreenInfo};

#[derive(Clone)]
pub struct CoordinateSystem {
    source: Arc<dyn ScreenSource>,
}

impl CoordinateSystem {
    pub fn new(source: Arc<dyn ScreenSource>) -> Self {
        Self { source }
    }

    /// Lists monitors with the primary as id 0 and the rest in backend order.
    /// Queried fresh on every call since the topology can change.
    pub fn enumerate(&self) -> DeskPilotResult<Vec<ScreenInfo>> {
        let mut raw = self.source.monitors()?;
        if raw.is_empty() {
            return Err(DeskPilotError::Capture("no monitors detected".into()));
        }
        let primary_pos = raw.iter().position(|m| m.is_primary).unwrap_or(0);
        let primary = raw.remove(primary_pos);
        raw.insert(0, primary);

        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(i, m)| ScreenInfo {
                id: i as u32,
                x: m.x,
                y: m.y,
                width: m.width,
                height: m.height,
                is_primary: i == 0,
                name: m.name,
            })
            .collect())
    }

    pub fn screen(&self, id: u32) -> DeskPilotResult<ScreenInfo> {
        let screens = self.enumerate()?;
        let count = screens.len();
        screens
            .into_iter()
            .nth(id as usize)
            .ok_or(DeskPilotError::ScreenOutOfRange { screen: id, count })
    }

    /// Global origin of a monitor; `(0, 0)` for the global sentinel.
    pub fn offset(&self, screen: Option<u32>) -> DeskPilotResult<(i32, i32)> {
        match screen {
            None => Ok((0, 0)),
            Some(id) => {
                let info = self.screen(id)?;
                Ok((info.x, info.y))
            }
        }
    }

    /// Fails with `CoordinateOverflow` instead of wrapping when a
    /// model-supplied point is too far out for `i32`.
    pub fn to_global(&self, x: i32, y: i32, screen: Option<u32>) -> DeskPilotResult<(i32, i32)> {
        let (dx, dy) = self.offset(screen)?;
        match (x.checked_add(dx), y.checked_add(dy)) {
            (Some(gx), Some(gy)) => Ok((gx, gy)),
            _ => Err(DeskPilotError::CoordinateOverflow { x, y }),
        }
    }

    pub fn to_local(&self, gx: i32, gy: i32, screen: Option<u32>) -> DeskPilotResult<(i32, i32)> {
        let (dx, dy) = self.offset(screen)?;
        match (gx.checked_sub(dx), gy.checked_sub(dy)) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(DeskPilotError::CoordinateOverflow { x: gx, y: gy }),
        }
    }

    /// Bounding box of every monitor in global coordinates.
    pub fn virtual_bounds(&self) -> DeskPilotResult<Rect> {
        let screens = self.enumerate()?;
        let bounds: Vec<Rect> = screens.iter().map(ScreenInfo::bounds).collect();
        Rect::union_all(&bounds).ok_or_else(|| DeskPilotError::Capture("no monitors detected".into()))
    }

    /// Global rectangle to request from the capture backend.
    ///
    /// With a monitor, `region` is monitor-local and only its origin is
    /// translated; width and height pass through untouched.
    pub fn capture_rect(&self, screen: Option<u32>, region: Option<Rect>) -> DeskPilotResult<Rect> {
        match (screen, region) {
            (Some(id), None) => Ok(self.screen(id)?.bounds()),
            (None, None) => self.virtual_bounds(),
            (screen, Some(r)) => {
                let (gx, gy) = self.to_global(r.x, r.y, screen)?;
                Ok(Rect::new(gx, gy, r.width, r.height))
            }
        }
    }

    pub async fn screenshot(
        &self,
        screen: Option<u32>,
        region: Option<Rect>,
    ) -> DeskPilotResult<RgbaImage> {
        let rect = self.capture_rect(screen, region)?;
        let source = Arc::clone(&self.source);
        let image = tokio::task::spawn_blocking(move || source.capture(rect))
            .await
            .map_err(|e| DeskPilotError::Capture(format!("join: {e}")))??;
        tracing::debug!(
            screen = ?screen,
            width = image.width(),
            height = image.height(),
            "screenshot captured"
        );
        Ok(image)
    }
}
