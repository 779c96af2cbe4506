//! API request handlers

use axum::extract::Multipart;
use axum::http::StatusCode;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use super::models::{AnalyzeForm, AnalyzeResponse, ErrorResponse};
use crate::analysis::AnalysisContext;
use crate::error::{BackendErrorKind, PipelineError};
use crate::pipeline::PipelineOrchestrator;
use crate::sampling::SamplingWindow;

type HandlerError = (StatusCode, ErrorResponse);

/// Service banner for `GET /`
pub fn banner() -> Value {
    serde_json::json!({
        "message": "Game Scout API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["GET /health", "POST /analyze"]
    })
}

/// Handle health check requests
pub fn health_check(backend_name: &str, mock_mode: bool) -> Value {
    serde_json::json!({
        "status": "healthy",
        "service": "game-scout",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": backend_name,
        "mock_mode": mock_mode,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// HTTP status for a failed analysis
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::SourceUnavailable(_) | PipelineError::NoFramesExtracted(_) => StatusCode::BAD_REQUEST,
        PipelineError::InvalidBatchSize(_) | PipelineError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Backend(failure) => match failure.kind {
            BackendErrorKind::AuthError => StatusCode::UNAUTHORIZED,
            BackendErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            BackendErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            BackendErrorKind::MalformedResponse | BackendErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
            BackendErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn invalid_request(message: impl Into<String>) -> HandlerError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        ErrorResponse::new("invalid_request", message),
    )
}

/// Collect the known multipart fields; unknown ones are ignored
pub async fn read_form(mut multipart: Multipart) -> Result<AnalyzeForm, HandlerError> {
    let mut form = AnalyzeForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, ErrorResponse::new("invalid_request", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, ErrorResponse::new("invalid_request", e.body_text())))?;
                form.file = Some(bytes.to_vec());
            }
            "team_name" | "team_color" | "player_number" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, ErrorResponse::new("invalid_request", e.body_text())))?;
                match name.as_str() {
                    "team_name" => form.team_name = Some(text),
                    "team_color" => form.team_color = Some(text),
                    _ => form.player_number = Some(text),
                }
            }
            other => debug!("Ignoring multipart field {}", other),
        }
    }

    Ok(form)
}

/// Validated upload: context, video bytes and original file name
pub fn validate_form(form: AnalyzeForm) -> Result<(AnalysisContext, Vec<u8>, String), HandlerError> {
    let file = form.file.ok_or_else(|| invalid_request("missing field: file"))?;

    let team_name = form
        .team_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| invalid_request("missing field: team_name"))?;

    let player_number = form
        .player_number
        .ok_or_else(|| invalid_request("missing field: player_number"))?;
    let player_number: u32 = player_number
        .trim()
        .parse()
        .map_err(|_| invalid_request(format!("player_number must be a non-negative integer, got {:?}", player_number)))?;

    let context = AnalysisContext::new(team_name, form.team_color.as_deref(), player_number);
    let filename = form.filename.unwrap_or_else(|| "upload".to_string());

    Ok((context, file, filename))
}

/// Extension to keep on the temp copy so the decoder can sniff the container
fn upload_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Handle `POST /analyze`: store the upload in a temp file and run the pipeline on it
pub async fn analyze_upload(
    orchestrator: &PipelineOrchestrator,
    window: SamplingWindow,
    form: AnalyzeForm,
) -> Result<AnalyzeResponse, HandlerError> {
    let (context, bytes, filename) = validate_form(form)?;

    // Removed when dropped at the end of this request
    let upload = tempfile::Builder::new()
        .prefix("game-scout-")
        .suffix(&upload_suffix(&filename))
        .tempfile()
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("io_error", format!("cannot create temp file: {}", e)),
            )
        })?;
    tokio::fs::write(upload.path(), &bytes).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("io_error", format!("cannot store upload: {}", e)),
        )
    })?;
    drop(bytes);

    info!("📤 Received {} for {} #{}", filename, context.team_name, context.player_number);

    let run = orchestrator.execute(upload.path(), context, window).await;
    let (frames, batches) = (run.frames_sampled, run.batch_count);

    match run.outcome {
        Ok(report) => Ok(AnalyzeResponse::success(report, frames, batches, filename)),
        Err(e) => Err((status_for(&e), ErrorResponse::new(e.kind(), e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendFailure;

    fn form() -> AnalyzeForm {
        AnalyzeForm {
            filename: Some("final.mp4".to_string()),
            file: Some(vec![1, 2, 3]),
            team_name: Some("Rovers".to_string()),
            team_color: Some("#00ff00".to_string()),
            player_number: Some(" 11 ".to_string()),
        }
    }

    #[test]
    fn test_status_mapping() {
        let backend = |kind| PipelineError::Backend(BackendFailure::new(kind, "x"));
        assert_eq!(status_for(&PipelineError::NoFramesExtracted("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&backend(BackendErrorKind::AuthError)), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&backend(BackendErrorKind::RateLimited)), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&backend(BackendErrorKind::Timeout)), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&backend(BackendErrorKind::MalformedResponse)), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&PipelineError::InvalidBatchSize(0)), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_validate_form() {
        let (context, bytes, filename) = validate_form(form()).unwrap();
        assert_eq!(context.player_number, 11);
        assert_eq!(context.team_color_hex.as_deref(), Some("#00ff00"));
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(filename, "final.mp4");
    }

    #[test]
    fn test_validate_form_rejects_bad_player_number() {
        let (status, body) = validate_form(AnalyzeForm {
            player_number: Some("seven".to_string()),
            ..form()
        })
        .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.kind, "invalid_request");
    }

    #[test]
    fn test_validate_form_requires_file() {
        assert!(validate_form(AnalyzeForm { file: None, ..form() }).is_err());
    }

    #[test]
    fn test_upload_suffix() {
        assert_eq!(upload_suffix("game.MP4"), ".MP4");
        assert_eq!(upload_suffix("noext"), "");
        assert_eq!(upload_suffix("weird.a/b"), "");
    }
}
