use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::angles::Angle;

/// Why a failed model attempt is worth handing to the next candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCause {
    ModelUnavailable,
    Quota,
    NoImageData,
    Transient,
    UnsupportedModality,
}

impl RetryCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryCause::ModelUnavailable => "model_unavailable",
            RetryCause::Quota => "quota",
            RetryCause::NoImageData => "no_image_data",
            RetryCause::Transient => "transient",
            RetryCause::UnsupportedModality => "unsupported_modality",
        }
    }
}

/// Raw failure reported by an upstream model call, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamFailure {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn no_image_data(model: &str) -> Self {
        Self::new(
            None,
            Some("NO_IMAGE_DATA"),
            format!("{model} returned no image data"),
        )
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code.as_deref()) {
            (Some(status), Some(code)) => write!(f, "{} ({status} {code})", self.message),
            (Some(status), None) => write!(f, "{} ({status})", self.message),
            (None, Some(code)) => write!(f, "{} ({code})", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAttempt {
    pub model: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleFailure {
    pub angle: Angle,
    pub message: String,
    pub status: u16,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Invalid,
    NotFound,
    Unreadable,
    TooLarge,
    TimedOut,
}

impl FetchErrorKind {
    pub fn status(&self) -> u16 {
        match self {
            FetchErrorKind::Invalid | FetchErrorKind::NotFound => 400,
            FetchErrorKind::Unreadable => 422,
            FetchErrorKind::TooLarge => 413,
            FetchErrorKind::TimedOut => 504,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FetchErrorKind::Invalid => "SOURCE_INVALID",
            FetchErrorKind::NotFound => "SOURCE_NOT_FOUND",
            FetchErrorKind::Unreadable => "SOURCE_UNREADABLE",
            FetchErrorKind::TooLarge => "SOURCE_TOO_LARGE",
            FetchErrorKind::TimedOut => "SOURCE_TIMEOUT",
        }
    }
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("upstream model rejected the request: {failure}{}", summarize_prior(.attempts))]
    Upstream {
        failure: UpstreamFailure,
        /// Retryable failures absorbed before the fatal one.
        attempts: Vec<ModelAttempt>,
        last_cause: Option<RetryCause>,
    },

    #[error("all model candidates failed: {}", summarize_attempts(.attempts))]
    CandidatesExhausted {
        attempts: Vec<ModelAttempt>,
        last_cause: Option<RetryCause>,
    },

    #[error("{message}")]
    Fetch {
        kind: FetchErrorKind,
        message: String,
    },

    #[error("image generation failed for every angle: {}", summarize_failures(.failures))]
    BatchFailed {
        failures: Vec<AngleFailure>,
        last_cause: Option<RetryCause>,
    },

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StudioError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StudioError::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        StudioError::Validation(message.into())
    }

    pub fn fetch(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        StudioError::Fetch {
            kind,
            message: message.into(),
        }
    }

    /// Keeps the full `anyhow` context chain when given one.
    pub fn storage(err: impl fmt::Display) -> Self {
        StudioError::Storage(format!("{err:#}"))
    }

    /// Last retryable cause a cascade saw, whether it ended exhausted or fatal.
    pub fn retry_cause(&self) -> Option<RetryCause> {
        match self {
            StudioError::Upstream { last_cause, .. }
            | StudioError::CandidatesExhausted { last_cause, .. }
            | StudioError::BatchFailed { last_cause, .. } => *last_cause,
            _ => None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            StudioError::Configuration(_) => 500,
            StudioError::Validation(_) => 400,
            StudioError::Upstream { failure, .. } => match failure.status {
                Some(status) if (400..600).contains(&status) => status,
                _ => 502,
            },
            StudioError::CandidatesExhausted { last_cause, .. }
            | StudioError::BatchFailed { last_cause, .. } => {
                if *last_cause == Some(RetryCause::Quota) {
                    429
                } else {
                    502
                }
            }
            StudioError::Fetch { kind, .. } => kind.status(),
            StudioError::Image(_) => 422,
            StudioError::Storage(_) => 500,
        }
    }

    pub fn code(&self) -> String {
        match self {
            StudioError::Configuration(_) => "CONFIGURATION_ERROR".to_string(),
            StudioError::Validation(_) => "VALIDATION_ERROR".to_string(),
            StudioError::Upstream { failure, .. } => failure
                .code
                .clone()
                .unwrap_or_else(|| "UPSTREAM_REJECTED".to_string()),
            StudioError::CandidatesExhausted { .. } => "MODEL_CASCADE_EXHAUSTED".to_string(),
            StudioError::Fetch { kind, .. } => kind.code().to_string(),
            StudioError::BatchFailed { .. } => "GENERATION_FAILED".to_string(),
            StudioError::Image(_) => "IMAGE_PROCESSING_FAILED".to_string(),
            StudioError::Storage(_) => "STORAGE_ERROR".to_string(),
        }
    }

    pub fn to_payload(&self, include_debug: bool) -> ErrorPayload {
        let debug = include_debug.then(|| ErrorDebug {
            status: self.status(),
            code: self.code(),
            attempts: match self {
                StudioError::CandidatesExhausted { attempts, .. }
                | StudioError::Upstream { attempts, .. } => attempts.clone(),
                _ => Vec::new(),
            },
            failures: match self {
                StudioError::BatchFailed { failures, .. } => failures.clone(),
                _ => Vec::new(),
            },
        });
        ErrorPayload {
            error: self.to_string(),
            debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<ErrorDebug>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDebug {
    pub status: u16,
    pub code: String,
    #[serde(default)]
    pub attempts: Vec<ModelAttempt>,
    #[serde(default)]
    pub failures: Vec<AngleFailure>,
}

fn summarize_attempts(attempts: &[ModelAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates attempted".to_string();
    }
    attempts
        .iter()
        .map(|attempt| format!("{}: {}", attempt.model, attempt.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn summarize_prior(attempts: &[ModelAttempt]) -> String {
    if attempts.is_empty() {
        return String::new();
    }
    format!(" (after {})", summarize_attempts(attempts))
}

fn summarize_failures(failures: &[AngleFailure]) -> String {
    if failures.is_empty() {
        return "no angles attempted".to_string();
    }
    failures
        .iter()
        .map(|failure| format!("[{}] {}", failure.angle, failure.message))
        .collect::<Vec<_>>()
        .join("; ")
}
