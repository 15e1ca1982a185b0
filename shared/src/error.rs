use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::capabilities::FeedApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    Cancelled,
    InvalidResponse,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::Authorization => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Cancelled => "CANCELLED",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network
            | Self::Timeout
            | Self::Conflict
            | Self::RateLimited
            | Self::Cancelled
            | Self::Internal => ErrorSeverity::Transient,

            Self::Authentication
            | Self::Authorization
            | Self::Validation
            | Self::NotFound
            | Self::InvalidResponse
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Conflict | Self::Internal
        )
    }
}

/// User-facing error carried in the model and rendered by the shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Authentication => "Your session has expired. Please sign in again.".into(),
            ErrorKind::Authorization => "You don't have permission to perform this action.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotFound => "This post is no longer available.".into(),
            ErrorKind::Conflict => {
                "This action conflicts with a recent change. Please refresh and try again.".into()
            }
            ErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.".into(),
            ErrorKind::Cancelled => "Request cancelled.".into(),
            ErrorKind::InvalidResponse | ErrorKind::Internal | ErrorKind::Unknown => {
                "Something went wrong on our side. Please try again.".into()
            }
        }
    }

    /// Classifies an HTTP status, preferring the `message` of a JSON error body.
    #[must_use]
    pub fn from_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 | 410 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        };

        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
}

impl From<&FeedApiError> for AppError {
    fn from(e: &FeedApiError) -> Self {
        match e {
            FeedApiError::Network(msg) => {
                AppError::new(ErrorKind::Network, "Network error").with_internal(msg.clone())
            }
            FeedApiError::Timeout => AppError::new(ErrorKind::Timeout, "Request timed out"),
            FeedApiError::Status { code, body } => AppError::from_status(*code, body.as_deref()),
            FeedApiError::Aborted => AppError::new(ErrorKind::Cancelled, "Request aborted"),
            FeedApiError::UnexpectedOutput { expected } => {
                AppError::new(ErrorKind::InvalidResponse, "Unexpected response")
                    .with_context("expected", expected.clone())
            }
            FeedApiError::Other(msg) => {
                AppError::new(ErrorKind::Unknown, "Request failed").with_internal(msg.clone())
            }
        }
    }
}

/// Failure classes of the sync engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Transport failure, timeout or server error. Surfaces as recoverable state.
    #[error("network failure: {0}")]
    NetworkFailure(AppError),
    /// Superseded or aborted request. Never shown to the user.
    #[error("request cancelled")]
    Cancelled,
    /// Rejected locally before any network call.
    #[error("validation failed: {0}")]
    ValidationFailure(String),
    /// The server declined an optimistic action.
    #[error("mutation rejected: {0}")]
    MutationRejected(AppError),
}

impl SyncError {
    #[must_use]
    pub fn from_fetch_error(error: &FeedApiError) -> Self {
        match error {
            FeedApiError::Aborted => Self::Cancelled,
            other => Self::NetworkFailure(other.into()),
        }
    }

    #[must_use]
    pub fn from_mutation_error(error: &FeedApiError) -> Self {
        match error {
            FeedApiError::Status { code, .. }
                if (400..500).contains(code) && *code != 408 && *code != 429 =>
            {
                Self::MutationRejected(error.into())
            }
            other => Self::NetworkFailure(other.into()),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure(message.into())
    }

    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NetworkFailure(inner) | SyncError::MutationRejected(inner) => inner,
            SyncError::Cancelled => AppError::new(ErrorKind::Cancelled, "Request cancelled"),
            SyncError::ValidationFailure(message) => AppError::new(ErrorKind::Validation, message),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_body_message_is_preferred() {
        let body = br#"{"message":"Post was removed"}"#;
        let err = AppError::from_status(404, Some(body));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Post was removed");
        assert_eq!(err.context.get("http_status").map(String::as_str), Some("404"));
    }

    #[test]
    fn status_without_body_falls_back() {
        let err = AppError::from_status(503, Some(b"<html>"));
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.message, "HTTP error: 503");
        assert!(err.is_retryable());
    }

    #[test]
    fn mutation_4xx_is_rejection() {
        let err = FeedApiError::Status { code: 409, body: None };
        assert!(matches!(
            SyncError::from_mutation_error(&err),
            SyncError::MutationRejected(_)
        ));
    }

    #[test]
    fn mutation_timeout_and_5xx_are_network_failures() {
        for err in [
            FeedApiError::Timeout,
            FeedApiError::Status { code: 500, body: None },
            FeedApiError::Status { code: 429, body: None },
        ] {
            assert!(matches!(
                SyncError::from_mutation_error(&err),
                SyncError::NetworkFailure(_)
            ));
        }
    }

    #[test]
    fn aborted_fetch_is_silent() {
        let err = SyncError::from_fetch_error(&FeedApiError::Aborted);
        assert_eq!(err, SyncError::Cancelled);
        assert!(err.is_silent());
    }

    #[test]
    fn validation_keeps_message_for_users() {
        let err: AppError = SyncError::validation("Comment cannot be empty").into();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.user_facing_message(), "Comment cannot be empty");
    }
}
