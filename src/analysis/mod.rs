pub mod mock;
pub mod parsing;
pub mod prompt;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::batching::AnalysisBatch;
use crate::config::BackendConfig;
use crate::error::{BackendFailure, Result};
use crate::sampling::format_timestamp;

pub use mock::MockBackend;
pub use prompt::PromptTemplate;
pub use remote::RemoteVisionBackend;

/// Remote vision provider wire dialects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisionProvider {
    /// OpenAI chat completions, or any compatible endpoint
    #[default]
    OpenAI,
    Gemini,
}

impl VisionProvider {
    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            VisionProvider::OpenAI => "gpt-4o",
            VisionProvider::Gemini => "gemini-1.5-flash",
        }
    }
}

impl std::str::FromStr for VisionProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "lmstudio" => Ok(VisionProvider::OpenAI),
            "gemini" | "google" => Ok(VisionProvider::Gemini),
            other => Err(format!("unknown vision provider: {}", other)),
        }
    }
}

/// Team and player the report is about; shared by every batch of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub team_name: String,
    pub team_color_hex: Option<String>,
    pub player_number: u32,
}

impl AnalysisContext {
    pub fn new(team_name: impl Into<String>, team_color_hex: Option<&str>, player_number: u32) -> Self {
        Self {
            team_name: team_name.into().trim().to_string(),
            team_color_hex: team_color_hex
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            player_number,
        }
    }
}

/// A timestamped observation backing the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(alias = "time", alias = "timestampLabel", deserialize_with = "timestamp_label")]
    pub timestamp: String,
    #[serde(alias = "observation", alias = "description")]
    pub note: String,
}

impl EvidenceItem {
    pub fn new(timestamp: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            note: note.into(),
        }
    }
}

/// Models sometimes answer with raw seconds instead of a label
fn timestamp_label<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(format_timestamp(n.as_f64().unwrap_or(0.0))),
        other => Err(serde::de::Error::custom(format!(
            "expected timestamp string or seconds, got {}",
            other
        ))),
    }
}

/// Structured judgment for one batch of frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(default, alias = "teamWeaknesses", deserialize_with = "null_as_empty")]
    pub team_weaknesses: Vec<String>,
    #[serde(default, alias = "playerWeaknesses", deserialize_with = "null_as_empty")]
    pub player_weaknesses: Vec<String>,
    #[serde(default, alias = "improvementIdeas", deserialize_with = "null_as_empty")]
    pub improvement_ideas: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub evidence: Vec<EvidenceItem>,
}

/// `null` is how models often spell an empty list
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Turns a batch of frames into a structured judgment
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(&self, batch: AnalysisBatch) -> std::result::Result<StructuredResult, BackendFailure>;

    fn name(&self) -> &str;

    fn is_mock(&self) -> bool {
        false
    }
}

/// Select the backend for `config`.
///
/// Without a credential the mock backend is chosen up front, never at call time.
pub async fn create_backend(config: &BackendConfig) -> Result<Arc<dyn AnalysisBackend>> {
    if !config.has_credential() {
        warn!("No analysis credential configured, using mock backend");
        return Ok(Arc::new(MockBackend::new()));
    }

    let prompt = PromptTemplate::load(config.prompt_file.as_deref()).await;
    let backend = RemoteVisionBackend::new(config.clone(), prompt)?;
    info!(
        "✅ Remote vision backend ready ({:?}, model {})",
        config.provider, config.model
    );
    Ok(Arc::new(backend))
}
