use std::path::Path;
use tracing::{debug, warn};

use crate::batching::AnalysisBatch;

/// Instruction sent with every batch of frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Load a custom template, falling back to the built-in one
    pub async fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) if !content.trim().is_empty() => {
                debug!("Loaded analysis prompt from {}", path.display());
                Self::new(content.trim())
            }
            Ok(_) => {
                warn!("Prompt file {} is empty, using default prompt", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read prompt file {} ({}), using default prompt", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Fill the placeholders for one batch
    pub fn render(&self, batch: &AnalysisBatch) -> String {
        let context = &batch.context;
        let color = context
            .team_color_hex
            .as_deref()
            .unwrap_or("not specified");

        self.template
            .replace("{team}", &context.team_name)
            .replace("{color}", color)
            .replace("{player}", &context.player_number.to_string())
            .replace(
                "{window_start}",
                &format!("{:.0}", batch.window.start_fraction * 100.0),
            )
            .replace(
                "{window_end}",
                &format!("{:.0}", batch.window.end_fraction * 100.0),
            )
            .replace("{timestamps}", &batch.timestamp_labels().join(", "))
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

const DEFAULT_PROMPT: &str = r#"You are an experienced sports scout reviewing still frames from game footage.

Team under review: {team} (jersey color: {color}).
Player to focus on: number {player}.
The frames were sampled between {window_start}% and {window_end}% of the game, at these timestamps: {timestamps}.
Only judge what is visible in this part of the game.

Identify:
1. Weaknesses of the team as a unit
2. Weaknesses of player number {player}
3. Concrete ideas an opponent could use to exploit them
4. Timestamped evidence from the frames supporting each point

Respond with a single JSON object and nothing else:
{"team_weaknesses": ["..."], "player_weaknesses": ["..."], "improvement_ideas": ["..."], "evidence": [{"timestamp": "m:ss", "note": "..."}]}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisContext;
    use crate::sampling::{FrameSample, SamplingWindow};
    use std::sync::Arc;

    fn batch() -> AnalysisBatch {
        AnalysisBatch {
            index: 0,
            frames: vec![FrameSample {
                sequence_index: 0,
                timestamp_seconds: 75.0,
                width: 1,
                height: 1,
                encoded_image: Vec::new(),
            }],
            context: Arc::new(AnalysisContext::new("Harbor City", Some("#ff0000"), 23)),
            window: SamplingWindow::default(),
        }
    }

    #[test]
    fn test_default_prompt_is_scoped_to_window() {
        let rendered = PromptTemplate::default().render(&batch());
        assert!(rendered.contains("Harbor City (jersey color: #ff0000)"));
        assert!(rendered.contains("number 23"));
        assert!(rendered.contains("between 0% and 50%"));
        assert!(rendered.contains("1:15"));
        assert!(!rendered.contains("{team}"));
    }

    #[tokio::test]
    async fn test_missing_prompt_file_falls_back() {
        let prompt = PromptTemplate::load(Some(Path::new("/no/such/prompt.txt"))).await;
        assert_eq!(prompt, PromptTemplate::default());
    }

    #[tokio::test]
    async fn test_custom_prompt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        tokio::fs::write(&path, "Scout {team} #{player}\n").await.unwrap();

        let prompt = PromptTemplate::load(Some(&path)).await;
        assert_eq!(prompt.render(&batch()), "Scout Harbor City #23");
    }
}
