use async_trait::async_trait;
use image::RgbaImage;

use crate::errors::DeskPilotResult;
use crate::llm::types::Prediction;

/// A model that answers one prompt about zero or more screenshots.
/// Backends only need to implement this trait and be listed in the config.
#[async_trait]
pub trait DecisionPort: Send + Sync {
    /// Identifier used in logs (the config key for configured providers).
    fn name(&self) -> &str;

    async fn predict(&self, prompt: &str, images: &[&RgbaImage]) -> DeskPilotResult<Prediction>;
}
