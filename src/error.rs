//! Error types for the scouting pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Classification of a failed analysis backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    AuthError,
    RateLimited,
    Timeout,
    MalformedResponse,
    Unavailable,
    Unknown,
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::AuthError => "auth_error",
            BackendErrorKind::RateLimited => "rate_limited",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::MalformedResponse => "malformed_response",
            BackendErrorKind::Unavailable => "unavailable",
            BackendErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure returned by an analysis backend
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("backend failure ({kind}): {message}")]
pub struct BackendFailure {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendFailure {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::MalformedResponse, message)
    }

    /// Rate limits and outages may succeed later; the caller owns the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::RateLimited | BackendErrorKind::Unavailable
        )
    }
}

/// Error types for a single analysis request
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("No frames extracted: {0}")]
    NoFramesExtracted(String),

    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Backend(#[from] BackendFailure),
}

impl PipelineError {
    /// Stable label for logs and API payloads
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "source_unavailable",
            PipelineError::NoFramesExtracted(_) => "no_frames_extracted",
            PipelineError::InvalidBatchSize(_) => "invalid_batch_size",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::Backend(failure) => failure.kind.as_str(),
        }
    }

    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            PipelineError::Backend(failure) => Some(failure.kind),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Backend(failure) => failure.is_retryable(),
            _ => false,
        }
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::SourceUnavailable(_) => 3,
            PipelineError::NoFramesExtracted(_) => 4,
            PipelineError::InvalidBatchSize(_) | PipelineError::InvalidConfig(_) => 2,
            PipelineError::Backend(failure) => match failure.kind {
                BackendErrorKind::AuthError => 10,
                BackendErrorKind::RateLimited => 11,
                BackendErrorKind::Timeout => 12,
                BackendErrorKind::MalformedResponse => 13,
                BackendErrorKind::Unavailable => 14,
                BackendErrorKind::Unknown => 15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_failure_display() {
        let failure = BackendFailure::new(BackendErrorKind::AuthError, "invalid key");
        assert_eq!(failure.to_string(), "backend failure (auth_error): invalid key");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::from(BackendFailure::new(BackendErrorKind::RateLimited, "slow down")).is_retryable());
        assert!(PipelineError::from(BackendFailure::new(BackendErrorKind::Unavailable, "503")).is_retryable());
        assert!(!PipelineError::from(BackendFailure::timeout("60s")).is_retryable());
        assert!(!PipelineError::NoFramesExtracted("empty".to_string()).is_retryable());
    }

    #[test]
    fn test_kinds_are_distinct() {
        let source = PipelineError::SourceUnavailable("missing".to_string());
        let frames = PipelineError::NoFramesExtracted("empty".to_string());
        assert_ne!(source.kind(), frames.kind());
        assert_ne!(source.exit_code(), frames.exit_code());
        assert_eq!(
            PipelineError::from(BackendFailure::malformed("bad json")).backend_kind(),
            Some(BackendErrorKind::MalformedResponse)
        );
    }
}
