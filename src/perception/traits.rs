use async_trait::async_trait;
use image::RgbaImage;

use crate::errors::DeskPilotResult;
use crate::perception::types::Perception;

/// Turns a raw screenshot into a labeled image plus the elements drawn on it.
///
/// Implementations: the OmniParser HTTP client and the numbered-grid overlay.
/// Element indices are only meaningful against the result of the same call.
#[async_trait]
pub trait PerceptionPort: Send + Sync {
    async fn parse(&self, image: &RgbaImage) -> DeskPilotResult<Perception>;
}
