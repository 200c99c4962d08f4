use crate::nested_form::FormParseError;
use crate::webhook_models::WebhookResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;

/// Upstream bodies are cut to this many characters in errors and logs.
const MAX_BODY_CHARS: usize = 500;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Webhook form could not be turned into a tree.
    Parse(FormParseError),
    /// Tree is well formed but a required message field is missing or invalid.
    BadRequest(String),
    /// Upstream answered with a non-success status.
    UpstreamStatus {
        /// Which collaborator answered ("Kommo", "OpenAI", ...).
        service: &'static str,
        status: u16,
        body: String,
    },
    /// Error interacting with an external API (transport, timeout, bad payload).
    ExternalApiError(String),
    /// Missing or invalid configuration.
    Config(String),
    /// Caller is not the CRM webhook sender.
    Unauthorized(String),
    /// Lead is outside the stage/pipeline this bridge handles.
    StageRejected(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Builds an `UpstreamStatus` error, truncating the body.
    pub fn upstream(service: &'static str, status: u16, body: &str) -> Self {
        AppError::UpstreamStatus {
            service,
            status,
            body: truncate_body(body),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Parse(e) => write!(f, "Parse error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::UpstreamStatus {
                service,
                status,
                body,
            } => write!(f, "{} returned {}: {}", service, status, body),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::StageRejected(msg) => write!(f, "{}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into the webhook's JSON status object.
    ///
    /// Always answers 200; Kommo disables hooks that keep failing, so the
    /// outcome travels in the body only.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        match &self {
            AppError::Parse(_) | AppError::BadRequest(_) => {
                tracing::warn!("Rejected webhook payload: {}", self)
            }
            AppError::Unauthorized(msg) => tracing::warn!("Unauthorized access: {}", msg),
            AppError::StageRejected(msg) => tracing::info!("{}", msg),
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source)
            }
            _ => tracing::error!("Webhook failed: {}", self),
        }

        (
            StatusCode::OK,
            Json(WebhookResponse::error(self.to_string())),
        )
            .into_response()
    }
}

impl From<FormParseError> for AppError {
    fn from(err: FormParseError) -> Self {
        AppError::Parse(err)
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::ExternalApiError(format!("request timed out: {}", err));
        }
        AppError::ExternalApiError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(format!("I/O failure: {}", err))
    }
}

/// Cuts an upstream body down to a loggable size.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
