use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("model returned no content")]
    EmptyResponse,
    #[error("model response contained no image")]
    MissingImage,
    #[error("model output could not be parsed: {0}")]
    InvalidOutput(String),
}

impl ModelError {
    /// Transient failures worth another attempt: provider 5xx/429, timeouts, dropped connections.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Provider { status, .. } => *status >= 500 || *status == 429,
            ModelError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Exponential backoff: `initial_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            text_model: DEFAULT_TEXT_MODEL.into(),
            image_model: DEFAULT_IMAGE_MODEL.into(),
            request_timeout: Duration::from_secs(180),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part::text(text)],
        }
    }

    fn instruction(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }

    fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| !part.is_thought())
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Set on interim reasoning parts; never the final answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Opaque token the model expects back, unchanged, on later turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_thought(&self) -> bool {
        self.thought == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    fn first_content(self) -> Option<Content> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub json_output: bool,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: TextRequest) -> Result<String, ModelError>;
}

/// A type the language model can be asked to emit as JSON.
pub trait StructuredOutput: DeserializeOwned {
    /// Field-by-field description of the JSON object, appended to the prompt.
    const SCHEMA_HINT: &'static str;
}

pub async fn generate_structured<T: StructuredOutput>(
    model: &dyn LanguageModel,
    system_instruction: &str,
    prompt: &str,
) -> Result<T, ModelError> {
    let raw = model
        .generate(TextRequest {
            system_instruction: system_instruction.to_string(),
            prompt: format!(
                "{prompt}\n\nRespond with a single JSON object of this shape and nothing else:\n{}",
                T::SCHEMA_HINT
            ),
            json_output: true,
        })
        .await?;
    parse_json_output(&raw)
}

/// Parses model JSON output, tolerating a surrounding markdown code fence.
pub fn parse_json_output<T: DeserializeOwned>(raw: &str) -> Result<T, ModelError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| ModelError::InvalidOutput(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Multi-turn image session. Earlier turns are replayed on every request so
/// later pages keep the visual language established by the first one.
#[derive(Debug, Clone, Default)]
pub struct ImageConversation {
    turns: Vec<Content>,
}

impl ImageConversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Content] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn record_exchange(&mut self, prompt: Content, reply: Content) {
        self.turns.push(prompt);
        self.turns.push(reply);
    }
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn send(
        &self,
        conversation: &mut ImageConversation,
        prompt: &str,
    ) -> Result<GeneratedImage, ModelError>;
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ModelError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ModelError> {
        let policy = &self.config.retry;
        let mut attempt = 1;
        loop {
            match self.post_once(model, request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "gemini: transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn post_once(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ModelError> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: TextRequest) -> Result<String, ModelError> {
        let body = GenerateContentRequest {
            contents: vec![Content::user_text(request.prompt)],
            system_instruction: Some(Content::instruction(request.system_instruction)),
            generation_config: request.json_output.then(|| GenerationConfig {
                response_mime_type: Some("application/json".into()),
                response_modalities: None,
            }),
        };

        let content = self
            .generate_content(&self.config.text_model, &body)
            .await?
            .first_content()
            .ok_or(ModelError::EmptyResponse)?;
        let text = content.joined_text();
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn send(
        &self,
        conversation: &mut ImageConversation,
        prompt: &str,
    ) -> Result<GeneratedImage, ModelError> {
        let user_turn = Content::user_text(prompt);
        let mut contents = conversation.turns().to_vec();
        contents.push(user_turn.clone());

        let body = GenerateContentRequest {
            contents,
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: None,
                response_modalities: Some(vec!["IMAGE".into(), "TEXT".into()]),
            }),
        };

        let mut reply = self
            .generate_content(&self.config.image_model, &body)
            .await?
            .first_content()
            .ok_or(ModelError::EmptyResponse)?;
        let inline = reply
            .parts
            .iter()
            .filter(|part| !part.is_thought())
            .find_map(|part| part.inline_data.as_ref())
            .ok_or(ModelError::MissingImage)?;
        let bytes = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| ModelError::InvalidOutput(format!("invalid image payload: {e}")))?;
        let image = GeneratedImage {
            bytes,
            mime_type: inline.mime_type.clone(),
        };
        debug!(
            turns = conversation.turns().len(),
            size_bytes = image.bytes.len(),
            "gemini: image turn complete"
        );

        // Replayed as received: signatures must travel back with their parts.
        reply.role = Some("model".into());
        conversation.record_exchange(user_turn, reply);
        Ok(image)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
