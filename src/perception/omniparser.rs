//! HTTP client for an OmniParser screen-parsing server.
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::config::PerceptionConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::screenshot::{decode_base64_image, encode_png_base64};
use crate::perception::traits::PerceptionPort;
use crate::perception::types::{Perception, UIElement};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    image: &'a str,
    box_threshold: f32,
    iou_threshold: f32,
    use_paddleocr: bool,
    return_labeled_image: bool,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    elements: Vec<UIElement>,
    #[serde(default)]
    labeled_image: Option<String>,
    #[serde(default)]
    parse_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub models_loaded: bool,
    #[serde(default)]
    pub device: String,
    /// Set locally when the server could not be reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct OmniParserClient {
    server_url: String,
    box_threshold: f32,
    iou_threshold: f32,
    use_paddleocr: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl OmniParserClient {
    pub fn new(cfg: &PerceptionConfig) -> Self {
        Self {
            server_url: cfg.server_url.trim_end_matches('/').to_string(),
            box_threshold: cfg.box_threshold,
            iou_threshold: cfg.iou_threshold,
            use_paddleocr: cfg.use_paddleocr,
            timeout: Duration::from_secs(cfg.timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Never fails: an unreachable server reports `status = "unhealthy"`.
    pub async fn health_check(&self) -> HealthStatus {
        let result = async {
            let resp = self
                .client
                .get(format!("{}/health", self.server_url))
                .timeout(HEALTH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            resp.json::<HealthStatus>().await
        }
        .await;

        match result {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(server = %self.server_url, error = %e, "perception server unreachable");
                HealthStatus {
                    status: "unhealthy".into(),
                    models_loaded: false,
                    device: String::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn is_available(&self) -> bool {
        self.health_check().await.is_healthy()
    }
}

#[async_trait]
impl PerceptionPort for OmniParserClient {
    async fn parse(&self, image: &RgbaImage) -> DeskPilotResult<Perception> {
        let encoded = encode_png_base64(image)?;
        let request = ParseRequest {
            image: &encoded,
            box_threshold: self.box_threshold,
            iou_threshold: self.iou_threshold,
            use_paddleocr: self.use_paddleocr,
            return_labeled_image: true,
        };

        tracing::debug!(
            server = %self.server_url,
            width = image.width(),
            height = image.height(),
            "sending parse request"
        );
        let response = self
            .client
            .post(format!("{}/parse", self.server_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Perception(format!("{status}: {body}")));
        }

        let body: ParseResponse = response.json().await?;
        let perception = into_perception(body, image)?;
        tracing::info!(elements = perception.elements.len(), "screen parsed");
        Ok(perception)
    }
}

fn into_perception(body: ParseResponse, original: &RgbaImage) -> DeskPilotResult<Perception> {
    if let Some(secs) = body.parse_time {
        tracing::debug!(parse_time = secs, "server parse time");
    }

    let mut seen = HashSet::with_capacity(body.elements.len());
    for element in &body.elements {
        if !seen.insert(element.index) {
            return Err(DeskPilotError::Perception(format!(
                "duplicate element index {} in parse result",
                element.index
            )));
        }
    }
    let mut elements = body.elements;
    elements.sort_by_key(|e| e.index);

    let labeled_image = match body.labeled_image.as_deref() {
        Some(data) if !data.is_empty() => decode_base64_image(data)?,
        _ => {
            tracing::debug!("no labeled image returned; using the raw screenshot");
            original.clone()
        }
    };

    Ok(Perception {
        labeled_image,
        elements,
    })
}
