use async_trait::async_trait;
use futures_util::StreamExt;
use image::RgbaImage;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::DecisionPort;
use crate::llm::sse_parser::SseAccumulator;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, ImageUrl, MessageContent, Prediction};
use crate::perception::screenshot::encode_png_base64;

/// Any endpoint speaking the OpenAI chat-completions protocol with image
/// parts (OpenAI, Qwen-VL, GLM-4V, vLLM, Ollama, ...).
pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    call: CallConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, call: CallConfig) -> Self {
        Self {
            id,
            api_base,
            api_key,
            call,
            client: reqwest::Client::new(),
        }
    }

    pub fn call_config(&self) -> &CallConfig {
        &self.call
    }

    fn request_body(&self, prompt: &str, images: &[&RgbaImage]) -> DeskPilotResult<serde_json::Value> {
        let messages = vec![user_message(prompt, images)?];
        Ok(serde_json::json!({
            "model": self.call.model,
            "messages": messages,
            "stream": self.call.stream,
            "temperature": self.call.temperature,
            "max_tokens": self.call.max_tokens,
        }))
    }
}

/// One user turn: every image as a PNG data URI, then the prompt text.
pub fn user_message(prompt: &str, images: &[&RgbaImage]) -> DeskPilotResult<ChatMessage> {
    let mut parts = Vec::with_capacity(images.len() + 1);
    for image in images {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{}", encode_png_base64(image)?),
            },
        });
    }
    parts.push(ContentPart::Text {
        text: prompt.to_string(),
    });
    Ok(ChatMessage {
        role: "user".into(),
        content: MessageContent::Parts(parts),
    })
}

/// Copy of a request body with image payloads replaced, for logging.
fn sanitized(body: &serde_json::Value) -> serde_json::Value {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    log_body
}

#[async_trait]
impl DecisionPort for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn predict(&self, prompt: &str, images: &[&RgbaImage]) -> DeskPilotResult<Prediction> {
        let body = self.request_body(prompt, images)?;

        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            stream = self.call.stream,
            images = images.len(),
            "sending LLM request"
        );
        tracing::debug!(
            body = %serde_json::to_string(&sanitized(&body)).unwrap_or_default(),
            "request body (sanitized, base64 omitted)"
        );

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Decision(format!("{status}: {err_body}")));
        }

        let prediction = if self.call.stream {
            self.handle_stream(response).await?
        } else {
            self.handle_json(response).await?
        };
        tracing::trace!(provider = %self.id, raw = %prediction.raw, "raw LLM response");
        Ok(prediction)
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulates an SSE stream into the full reply text.
    async fn handle_stream(&self, response: reqwest::Response) -> DeskPilotResult<Prediction> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = SseAccumulator::new();

        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            if acc.push(&bytes) {
                break;
            }
        }
        acc.finish();

        tracing::info!(
            provider = %self.id,
            content_len = acc.content.len(),
            reasoning_len = acc.reasoning.len(),
            chunks = acc.chunks,
            "LLM stream complete"
        );

        if acc.content.is_empty() {
            return Err(DeskPilotError::Decision("stream ended without content".into()));
        }
        let raw = serde_json::json!({
            "content": acc.content,
            "reasoning": acc.reasoning,
            "chunks": acc.chunks,
        });
        Ok(Prediction {
            text: acc.content,
            raw,
        })
    }

    async fn handle_json(&self, response: reqwest::Response) -> DeskPilotResult<Prediction> {
        let json: serde_json::Value = response.json().await?;
        let text = content_from_json(&json)?;
        tracing::info!(provider = %self.id, content_len = text.len(), "LLM JSON response received");
        Ok(Prediction { text, raw: json })
    }
}

fn content_from_json(json: &serde_json::Value) -> DeskPilotResult<String> {
    if let Some(err) = json.get("error") {
        return Err(DeskPilotError::Decision(format!("provider error: {err}")));
    }
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DeskPilotError::Decision("response has no choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(stream: bool) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            "test".into(),
            "http://127.0.0.1:9/v1/chat/completions".into(),
            String::new(),
            CallConfig {
                model: "vision-model".into(),
                stream,
                temperature: 0.2,
                max_tokens: 512,
            },
        )
    }

    #[test]
    fn images_precede_prompt_as_data_uris() {
        let img = RgbaImage::new(2, 2);
        let body = provider(false).request_body("pick one", &[&img, &img]).unwrap();
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(parts[2]["type"], "text");
        assert_eq!(parts[2]["text"], "pick one");
        assert_eq!(body["model"], "vision-model");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn logging_copy_omits_image_payloads() {
        let body = provider(true).request_body("p", &[&RgbaImage::new(1, 1)]).unwrap();
        let log = sanitized(&body);
        assert_eq!(log["messages"][0]["content"][0]["image_url"]["url"], "<omitted_base64_image>");
        assert_ne!(body["messages"][0]["content"][0]["image_url"]["url"], "<omitted_base64_image>");
    }

    #[test]
    fn json_reply_content_is_extracted() {
        let json = serde_json::json!({"choices": [{"message": {"role": "assistant", "content": "Reason: x\nAction: {}"}}]});
        assert_eq!(content_from_json(&json).unwrap(), "Reason: x\nAction: {}");
        let err = content_from_json(&serde_json::json!({"error": {"message": "quota"}})).unwrap_err();
        assert!(matches!(err, DeskPilotError::Decision(_)));
        assert!(content_from_json(&serde_json::json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_http_error() {
        let err = provider(false).predict("p", &[]).await.unwrap_err();
        assert!(matches!(err, DeskPilotError::Http(_)));
    }
}
