use crate::attachments::AttachmentProcessor;
use crate::config::Config;
use crate::errors::AppError;
use crate::kommo_client::KommoClient;
use crate::media_fetcher::HttpMediaFetcher;
use crate::openai_client::OpenAiClient;
use axum::{http::StatusCode, Json};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
///
/// Read-only: every request works on its own data.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Kommo leads API client (stage check, field read/write).
    pub kommo: KommoClient,
    /// Picture/voice enrichment backed by the attachment host and OpenAI.
    pub attachments: AttachmentProcessor,
}

impl AppState {
    /// Builds every outbound client from the configuration.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let kommo = KommoClient::from_config(&config)?;
        let fetcher = HttpMediaFetcher::new(timeout)?;
        let analyzer = OpenAiClient::from_config(&config)?;
        let attachments = AttachmentProcessor::new(
            Arc::new(fetcher),
            Arc::new(analyzer),
            config.media_scratch_dir.clone(),
        );

        Ok(Self {
            config,
            kommo,
            attachments,
        })
    }
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
