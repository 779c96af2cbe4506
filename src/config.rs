use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::analysis::VisionProvider;
use crate::error::PipelineError;
use crate::sampling::SamplingWindow;

/// Configuration for the game scout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sampling window and frame encoding
    pub sampling: SamplingConfig,

    /// Batch partitioning and dispatch
    pub batching: BatchingConfig,

    /// Analysis backend selection
    pub backend: BackendConfig,

    /// Report size limits
    pub aggregation: AggregationConfig,

    /// External video tools
    pub video: VideoConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Start of the window as a fraction of the duration
    pub window_start: f64,

    /// End of the window as a fraction of the duration
    pub window_end: f64,

    /// Frame budget per request
    pub max_frames: usize,

    /// Minimum spacing between samples (seconds)
    pub min_step_seconds: f64,

    /// Duration assumed when the stream reports none (seconds)
    pub default_duration_seconds: f64,

    /// Longest edge of an encoded frame (pixels)
    pub max_edge_pixels: u32,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Frames per backend request
    pub batch_size: usize,

    /// Backend requests allowed in flight; results are still merged in batch order
    pub max_in_flight: usize,
}

/// Analysis backend settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Remote provider dialect
    pub provider: VisionProvider,

    /// Vision model identifier
    pub model: String,

    /// API key; absent means mock mode
    pub api_key: Option<String>,

    /// Full request URL override (OpenAI-compatible local servers, tests)
    pub endpoint: Option<String>,

    /// Bound on one backend call (seconds)
    pub timeout_seconds: u64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Image detail hint for OpenAI-compatible providers
    pub image_detail: String,

    /// Custom analysis prompt
    pub prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Cap for each textual report field
    pub max_items: usize,

    /// Cap for the evidence list
    pub max_evidence: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        let window = SamplingWindow::default();
        Self {
            window_start: window.start_fraction,
            window_end: window.end_fraction,
            max_frames: window.max_frames,
            min_step_seconds: window.min_step_seconds,
            default_duration_seconds: 10.0,
            max_edge_pixels: 640,
            jpeg_quality: 85,
        }
    }
}

impl SamplingConfig {
    pub fn window(&self) -> SamplingWindow {
        SamplingWindow {
            start_fraction: self.window_start,
            end_fraction: self.window_end,
            max_frames: self.max_frames,
            min_step_seconds: self.min_step_seconds,
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_in_flight: 1,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: VisionProvider::OpenAI,
            model: VisionProvider::OpenAI.default_model().to_string(),
            api_key: None,
            endpoint: None,
            timeout_seconds: 60,
            max_tokens: 800,
            temperature: 0.2,
            image_detail: "low".to_string(),
            prompt_file: None,
        }
    }
}

impl BackendConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Switch dialect, carrying a default model over to the new provider's default
    pub fn set_provider(&mut self, provider: VisionProvider) {
        self.provider = provider;
        self.align_default_model();
    }

    /// Replace another provider's default model with this provider's
    pub fn align_default_model(&mut self) {
        let foreign_default = [VisionProvider::OpenAI, VisionProvider::Gemini]
            .iter()
            .any(|other| *other != self.provider && self.model == other.default_model());
        if foreign_default {
            self.model = self.provider.default_model().to_string();
        }
    }
}

// Keeps the API key out of logs and panic messages
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("image_detail", &self.image_detail)
            .field("prompt_file", &self.prompt_file)
            .finish()
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_items: 8,
            max_evidence: 20,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then the environment
    pub fn load() -> Result<Self> {
        let config_paths = ["game-scout.toml", "config/game-scout.toml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::load_from(Path::new(path)) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Failed to parse config file {}: {}", path, e),
                }
            }
        }

        Ok(Self::from_env())
    }

    /// Load a TOML file and apply environment overrides on top
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {}: {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&config_str)?;
        config.backend.align_default_model();
        config.apply_env();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps variable names to values
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Provider first, so an explicit model is never replaced by its default
        if let Some(provider) = lookup("GAME_SCOUT_PROVIDER") {
            match provider.parse() {
                Ok(provider) => self.backend.set_provider(provider),
                Err(e) => tracing::warn!("Ignoring GAME_SCOUT_PROVIDER: {}", e),
            }
        }

        if let Some(model) = lookup("GAME_SCOUT_VISION_MODEL") {
            self.backend.model = model;
        }

        if let Some(api_key) = lookup("GAME_SCOUT_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.backend.api_key = Some(api_key);
        }

        if let Some(endpoint) = lookup("GAME_SCOUT_ENDPOINT") {
            self.backend.endpoint = Some(endpoint);
        }

        if let Some(level) = lookup("GAME_SCOUT_LOG_LEVEL") {
            self.logging.level = level;
        }

        override_parsed(&lookup, "GAME_SCOUT_MAX_FRAMES", &mut self.sampling.max_frames);
        override_parsed(&lookup, "GAME_SCOUT_BATCH_SIZE", &mut self.batching.batch_size);
        override_parsed(&lookup, "GAME_SCOUT_WINDOW_START", &mut self.sampling.window_start);
        override_parsed(&lookup, "GAME_SCOUT_WINDOW_END", &mut self.sampling.window_end);
        override_parsed(&lookup, "GAME_SCOUT_TIMEOUT_SECONDS", &mut self.backend.timeout_seconds);
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate everything that can be checked before touching a video
    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        self.sampling.window().validate()?;

        if self.batching.batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize(0));
        }
        if self.batching.max_in_flight == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_in_flight must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.sampling.jpeg_quality) {
            return Err(PipelineError::InvalidConfig(format!(
                "jpeg_quality must be within 1..=100 (got {})",
                self.sampling.jpeg_quality
            )));
        }
        if self.sampling.max_edge_pixels < 16 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_edge_pixels must be at least 16 (got {})",
                self.sampling.max_edge_pixels
            )));
        }
        if !(self.sampling.default_duration_seconds.is_finite() && self.sampling.default_duration_seconds > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "default_duration_seconds must be positive".to_string(),
            ));
        }
        if self.backend.timeout_seconds == 0 {
            return Err(PipelineError::InvalidConfig(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.backend.has_credential()
            && self.backend.provider == VisionProvider::Gemini
            && self.backend.endpoint.is_none()
            && self.backend.model.starts_with("gpt-")
        {
            return Err(PipelineError::InvalidConfig(format!(
                "model {} is not served by the Gemini API",
                self.backend.model
            )));
        }
        if self.aggregation.max_items == 0 || self.aggregation.max_evidence == 0 {
            return Err(PipelineError::InvalidConfig(
                "aggregation caps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Game Scout Configuration:\n\
            - Window: {:.0}%..{:.0}% of duration\n\
            - Max Frames: {}\n\
            - Batch Size: {}\n\
            - Backend: {}\n\
            - Model: {}\n\
            - Timeout: {}s",
            self.sampling.window_start * 100.0,
            self.sampling.window_end * 100.0,
            self.sampling.max_frames,
            self.batching.batch_size,
            if self.backend.has_credential() {
                format!("{:?} (credential configured)", self.backend.provider)
            } else {
                "mock (no credential)".to_string()
            },
            self.backend.model,
            self.backend.timeout_seconds
        )
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring unparseable {}={}", key, raw),
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.config.sampling.window_start = start;
        self.config.sampling.window_end = end;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.config.sampling.max_frames = max_frames;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batching.batch_size = batch_size;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.config.batching.max_in_flight = max_in_flight;
        self
    }

    pub fn with_provider(mut self, provider: VisionProvider) -> Self {
        self.config.backend.set_provider(provider);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.backend.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.backend.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.backend.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.config.backend.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_default_duration(mut self, seconds: f64) -> Self {
        self.config.sampling.default_duration_seconds = seconds;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling.max_frames, 6);
        assert_eq!(config.batching.batch_size, 3);
        assert_eq!(config.sampling.window(), SamplingWindow::default());
        assert_eq!(config.backend.model, "gpt-4o");
        assert!(!config.backend.has_credential());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_with(lookup(&[
            ("GAME_SCOUT_VISION_MODEL", "gpt-4o-mini"),
            ("OPENAI_API_KEY", "sk-from-openai"),
            ("GAME_SCOUT_MAX_FRAMES", "12"),
            ("GAME_SCOUT_BATCH_SIZE", "4"),
            ("GAME_SCOUT_WINDOW_END", "1.0"),
            ("GAME_SCOUT_PROVIDER", "gemini"),
        ]));

        assert_eq!(config.backend.model, "gpt-4o-mini");
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-from-openai"));
        assert_eq!(config.sampling.max_frames, 12);
        assert_eq!(config.batching.batch_size, 4);
        assert_eq!(config.sampling.window_end, 1.0);
        assert_eq!(config.backend.provider, VisionProvider::Gemini);
    }

    #[test]
    fn test_provider_switch_picks_its_default_model() {
        let mut config = Config::default();
        config.apply_env_with(lookup(&[("GAME_SCOUT_PROVIDER", "gemini"), ("GAME_SCOUT_API_KEY", "key")]));
        assert_eq!(config.backend.provider, VisionProvider::Gemini);
        assert_eq!(config.backend.model, "gemini-1.5-flash");
        assert!(config.validate().is_ok());

        let config = ConfigBuilder::new().with_provider(VisionProvider::Gemini).build();
        assert_eq!(config.backend.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_gemini_with_openai_model_is_rejected() {
        let config = ConfigBuilder::new()
            .with_provider(VisionProvider::Gemini)
            .with_model("gpt-4o-mini")
            .with_api_key("key")
            .build();
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        // Mock mode never calls the provider
        let mut mock = config.clone();
        mock.backend.api_key = None;
        assert!(mock.validate().is_ok());
    }

    #[test]
    fn test_toml_provider_without_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("game-scout.toml");
        std::fs::write(&path, "[backend]\nprovider = \"gemini\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_scout_key_takes_precedence() {
        let mut config = Config::default();
        config.apply_env_with(lookup(&[
            ("GAME_SCOUT_API_KEY", "scout"),
            ("OPENAI_API_KEY", "openai"),
        ]));
        assert_eq!(config.backend.api_key.as_deref(), Some("scout"));
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let mut config = Config::default();
        config.apply_env_with(lookup(&[("GAME_SCOUT_MAX_FRAMES", "lots")]));
        assert_eq!(config.sampling.max_frames, 6);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_window(0.0, 1.0)
            .with_max_frames(10)
            .with_batch_size(5)
            .with_api_key("sk-test")
            .build();

        assert_eq!(config.sampling.window_end, 1.0);
        assert_eq!(config.sampling.max_frames, 10);
        assert_eq!(config.batching.batch_size, 5);
        assert!(config.backend.has_credential());
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            ConfigBuilder::new().with_batch_size(0).build().validate(),
            Err(PipelineError::InvalidBatchSize(0))
        );
        assert!(matches!(
            ConfigBuilder::new().with_window(0.6, 0.4).build().validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sampling]
            window_end = 1.0

            [backend]
            provider = "gemini"
            model = "gemini-1.5-flash"
            "#,
        )
        .unwrap();

        assert_eq!(config.sampling.window_end, 1.0);
        assert_eq!(config.sampling.max_frames, 6);
        assert_eq!(config.backend.provider, VisionProvider::Gemini);
        assert_eq!(config.batching.batch_size, 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("game-scout.toml");
        let config = ConfigBuilder::new().with_max_frames(9).build();

        config.save(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sampling.max_frames, 9);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ConfigBuilder::new().with_api_key("sk-secret").build();
        let debug = format!("{:?}", config.backend);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
