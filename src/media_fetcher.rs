use crate::attachments::MediaFetcher;
use crate::errors::AppError;
use async_trait::async_trait;
use std::time::Duration;

/// Largest attachment accepted: 25MB, the transcription API's upload limit.
pub const MAX_ATTACHMENT_BYTES: usize = 25 * 1024 * 1024;

/// Downloads attachments from the URLs Kommo puts in webhook payloads.
#[derive(Clone)]
pub struct HttpMediaFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create download client: {}", e))
            })?;
        Ok(Self {
            client,
            max_bytes: MAX_ATTACHMENT_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, url: &str) -> AppError {
        tracing::error!("Download of {} exceeds {} bytes", url, self.max_bytes);
        AppError::ExternalApiError(format!(
            "attachment exceeds {} bytes",
            self.max_bytes
        ))
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let mut response = self.client.get(url).send().await.map_err(|e| {
            tracing::error!("Error downloading file from {}: {}", url, e);
            AppError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Download of {} returned {}", url, status);
            return Err(AppError::upstream("Attachment host", status.as_u16(), &body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(self.too_large(url));
        }

        // Content-Length may be absent or wrong; the cap holds while streaming
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(url));
            }
            bytes.extend_from_slice(&chunk);
        }
        tracing::info!(
            "File downloaded: {} bytes, Content-Type: {}",
            bytes.len(),
            content_type
        );

        Ok(bytes)
    }
}
