//! API data models

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedReport;

/// Successful `POST /analyze` payload
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: String,
    pub report: AggregatedReport,
    pub frames_processed: usize,
    pub batches: usize,
    pub filename: String,
    /// RFC 3339
    pub analyzed_at: String,
}

impl AnalyzeResponse {
    pub fn success(report: AggregatedReport, frames_processed: usize, batches: usize, filename: String) -> Self {
        Self {
            status: "success".to_string(),
            report,
            frames_processed,
            batches,
            filename,
            analyzed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error payload for every failing route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub kind: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            kind: kind.into(),
            error: error.into(),
        }
    }
}

/// Fields of the multipart upload, before validation
#[derive(Debug, Default)]
pub struct AnalyzeForm {
    pub filename: Option<String>,
    pub file: Option<Vec<u8>>,
    pub team_name: Option<String>,
    pub team_color: Option<String>,
    pub player_number: Option<String>,
}
