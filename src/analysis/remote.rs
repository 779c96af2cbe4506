use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::parsing::parse_structured_response;
use super::{AnalysisBackend, PromptTemplate, StructuredResult, VisionProvider};
use crate::batching::AnalysisBatch;
use crate::config::BackendConfig;
use crate::error::{BackendErrorKind, BackendFailure, PipelineError};

pub const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Backend that sends every batch to an external vision model
pub struct RemoteVisionBackend {
    config: BackendConfig,
    client: reqwest::Client,
    prompt: PromptTemplate,
    endpoint: String,
}

// OpenAI-compatible chat completions

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<VisionMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct VisionMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u32,
}

// Gemini generateContent

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

impl RemoteVisionBackend {
    pub fn new(config: BackendConfig, prompt: PromptTemplate) -> Result<Self, PipelineError> {
        if !config.has_credential() {
            return Err(PipelineError::InvalidConfig(format!(
                "{:?} backend requires an API key",
                config.provider
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(10)))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        let endpoint = match (&config.endpoint, config.provider) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, VisionProvider::OpenAI) => OPENAI_CHAT_ENDPOINT.to_string(),
            (None, VisionProvider::Gemini) => {
                format!("{}/{}:generateContent", GEMINI_API_BASE, config.model)
            }
        };

        Ok(Self {
            config,
            client,
            prompt,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn openai_request(&self, batch: &AnalysisBatch) -> OpenAIRequest {
        let mut content = vec![ContentPart::Text {
            text: self.prompt.render(batch),
        }];
        content.extend(batch.frames.iter().map(|frame| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", frame.mime_type(), frame.to_base64()),
                detail: self.config.image_detail.clone(),
            },
        }));

        OpenAIRequest {
            model: self.config.model.clone(),
            messages: vec![VisionMessage {
                role: "user",
                content,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        }
    }

    fn gemini_request(&self, batch: &AnalysisBatch) -> GeminiRequest {
        let mut parts = vec![GeminiPart::Text {
            text: self.prompt.render(batch),
        }];
        parts.extend(batch.frames.iter().map(|frame| GeminiPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: frame.mime_type().to_string(),
                data: frame.to_base64(),
            },
        }));

        GeminiRequest {
            contents: vec![GeminiContent { role: "user", parts }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                response_mime_type: "application/json",
            },
        }
    }

    /// Send the batch and return the model's raw text answer
    async fn request_text(&self, batch: &AnalysisBatch) -> Result<String, BackendFailure> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let request = match self.config.provider {
            VisionProvider::OpenAI => self
                .client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&self.openai_request(batch)),
            VisionProvider::Gemini => self
                .client
                .post(&self.endpoint)
                .header("x-goog-api-key", api_key)
                .json(&self.gemini_request(batch)),
        };

        let response = request.send().await.map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        match self.config.provider {
            VisionProvider::OpenAI => {
                let parsed: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
                    BackendFailure::malformed(format!("unexpected response envelope: {}", e))
                })?;
                debug!("Vision request used {:?} tokens", parsed.usage.map(|u| u.total_tokens));

                let message = parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message)
                    .ok_or_else(|| BackendFailure::malformed("no completion choices returned"))?;

                match (message.content, message.refusal) {
                    (Some(content), _) if !content.trim().is_empty() => Ok(content),
                    (_, Some(refusal)) => Err(BackendFailure::malformed(format!("model refused: {}", refusal))),
                    _ => Err(BackendFailure::malformed("empty completion")),
                }
            }
            VisionProvider::Gemini => {
                let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
                    BackendFailure::malformed(format!("unexpected response envelope: {}", e))
                })?;
                debug!(
                    "Vision request used {:?} tokens",
                    parsed.usage_metadata.map(|u| u.total_token_count)
                );

                let text: String = parsed
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content)
                    .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
                    .unwrap_or_default();

                if text.trim().is_empty() {
                    Err(BackendFailure::malformed("no candidate text returned"))
                } else {
                    Ok(text)
                }
            }
        }
    }
}

#[async_trait]
impl AnalysisBackend for RemoteVisionBackend {
    async fn analyze(&self, batch: AnalysisBatch) -> Result<StructuredResult, BackendFailure> {
        let started = Instant::now();
        let limit = Duration::from_secs(self.config.timeout_seconds);

        debug!(
            "Sending batch {} ({} frames) to {:?} model {}",
            batch.index,
            batch.len(),
            self.config.provider,
            self.config.model
        );

        let raw = tokio::time::timeout(limit, self.request_text(&batch))
            .await
            .map_err(|_| {
                BackendFailure::timeout(format!(
                    "no response within {}s for batch {}",
                    self.config.timeout_seconds, batch.index
                ))
            })??;

        let result = parse_structured_response(&raw)?;
        debug!(
            "Batch {} analyzed in {:.2}s",
            batch.index,
            started.elapsed().as_secs_f64()
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        match self.config.provider {
            VisionProvider::OpenAI => "openai",
            VisionProvider::Gemini => "gemini",
        }
    }
}

/// Map an HTTP error status and body onto a failure kind
pub fn classify_status(status: StatusCode, body: &str) -> BackendFailure {
    let message = upstream_message(body).unwrap_or_else(|| format!("HTTP {}", status));
    let lowered = body.to_ascii_lowercase();

    let kind = match status.as_u16() {
        401 | 403 => BackendErrorKind::AuthError,
        429 => BackendErrorKind::RateLimited,
        408 => BackendErrorKind::Timeout,
        500 | 502 | 503 | 504 => BackendErrorKind::Unavailable,
        _ if lowered.contains("invalid_api_key")
            || lowered.contains("api key not valid")
            || lowered.contains("api_key_invalid") =>
        {
            BackendErrorKind::AuthError
        }
        _ if lowered.contains("rate limit")
            || lowered.contains("rate_limit")
            || lowered.contains("resource_exhausted") =>
        {
            BackendErrorKind::RateLimited
        }
        _ => BackendErrorKind::Unknown,
    };

    BackendFailure::new(kind, format!("{} ({})", message, status))
}

/// Map a transport-level reqwest error onto a failure kind
pub fn classify_transport_error(error: &reqwest::Error) -> BackendFailure {
    let kind = if error.is_timeout() {
        BackendErrorKind::Timeout
    } else if error.is_connect() {
        BackendErrorKind::Unavailable
    } else if error.is_decode() || error.is_body() {
        BackendErrorKind::MalformedResponse
    } else {
        BackendErrorKind::Unknown
    };

    BackendFailure::new(kind, error.to_string())
}

/// `{"error": {"message": ...}}` as used by both OpenAI and Gemini
fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .map(str::to_string)
}
