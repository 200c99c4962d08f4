//! Attachment processing: turns an attached picture or voice note into text.

use crate::audio_format::{detect_audio_format, AudioFormat};
use crate::errors::AppError;
use crate::models::{AttachmentKind, MessageEvent};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Prompt sent with every picture.
pub const DEFAULT_IMAGE_PROMPT: &str =
    "Analyze the image and give a brief description of its content";

pub const IMAGE_SUMMARY_MARKER: &str = "[AI image summary:]";
pub const AUDIO_TRANSCRIPTION_MARKER: &str = "[Audio transcription:]";

/// Downloads attachment bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError>;
}

/// Turns media into text.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Describes an image following `prompt`.
    async fn describe_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, AppError>;

    /// Transcribes audio encoded as `format`.
    async fn transcribe_audio(&self, audio: &[u8], format: AudioFormat)
        -> Result<String, AppError>;
}

/// Downloaded attachment parked on disk for the duration of one analysis.
///
/// The file is deleted when the value is dropped, whatever the outcome.
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    pub async fn write(dir: &Path, extension: &str, bytes: &[u8]) -> Result<Self, AppError> {
        let file = tempfile::Builder::new()
            .prefix("kommo-attachment-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(dir)?;
        tokio::fs::write(file.path(), bytes).await?;
        tracing::debug!("Staged {} bytes at {}", bytes.len(), file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub async fn read(&self) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}

/// Extension of `file_name` when it is a plain short token, else `default`.
fn extension_or<'a>(file_name: &'a str, default: &'a str) -> &'a str {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(default)
}

fn image_mime_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Enriches message text with the content of its attachment.
#[derive(Clone)]
pub struct AttachmentProcessor {
    fetcher: Arc<dyn MediaFetcher>,
    analyzer: Arc<dyn ContentAnalyzer>,
    scratch_dir: PathBuf,
}

impl AttachmentProcessor {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        analyzer: Arc<dyn ContentAnalyzer>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            analyzer,
            scratch_dir,
        }
    }

    /// Returns the message text, followed by at most one block describing
    /// the attachment.
    ///
    /// Failures never escape: they become an inline error marker so the
    /// message itself still reaches the lead.
    pub async fn process(&self, event: &MessageEvent) -> String {
        let text = event.text.clone();
        let Some(attachment) = &event.attachment else {
            return text;
        };

        let (Some(link), Some(file_name)) = (
            non_empty(&attachment.link),
            non_empty(&attachment.file_name),
        ) else {
            tracing::debug!(
                "Attachment on lead {} has no link or file name, skipping",
                event.entity_id
            );
            return text;
        };

        match &attachment.kind {
            AttachmentKind::Picture => match self.describe_picture(link, file_name).await {
                Ok(summary) => {
                    tracing::info!("Image summarized for lead {}", event.entity_id);
                    format!("{}\n{}\n{}", text, IMAGE_SUMMARY_MARKER, summary)
                }
                Err(e) => {
                    tracing::error!("Image processing failed for lead {}: {}", event.entity_id, e);
                    format!("{}\n[Error processing image with AI: {}]", text, e)
                }
            },
            AttachmentKind::Voice => match self.transcribe_voice(link, file_name).await {
                Ok(transcript) => {
                    tracing::info!("Voice note transcribed for lead {}", event.entity_id);
                    format!("{}\n{}\n{}", text, AUDIO_TRANSCRIPTION_MARKER, transcript)
                }
                Err(e) => {
                    tracing::error!(
                        "Voice note processing failed for lead {}: {}",
                        event.entity_id,
                        e
                    );
                    format!("{}\n[Error downloading/transcribing audio: {}]", text, e)
                }
            },
            AttachmentKind::Other(kind) => {
                tracing::debug!("Ignoring attachment of type '{}'", kind);
                text
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let bytes = self.fetcher.fetch(url).await?;
        if bytes.is_empty() {
            return Err(AppError::ExternalApiError(
                "downloaded file is empty".to_string(),
            ));
        }
        Ok(bytes)
    }

    async fn describe_picture(&self, url: &str, file_name: &str) -> Result<String, AppError> {
        let extension = extension_or(file_name, "png");
        let bytes = self.download(url).await?;
        let staged = StagedFile::write(&self.scratch_dir, extension, &bytes).await?;
        let image = staged.read().await?;

        self.analyzer
            .describe_image(&image, image_mime_type(extension), DEFAULT_IMAGE_PROMPT)
            .await
    }

    async fn transcribe_voice(&self, url: &str, file_name: &str) -> Result<String, AppError> {
        let bytes = self.download(url).await?;
        let staged =
            StagedFile::write(&self.scratch_dir, extension_or(file_name, "ogg"), &bytes).await?;
        let audio = staged.read().await?;

        tracing::info!("Audio to transcribe: {} bytes", audio.len());
        tracing::debug!(
            "First bytes (hex): {}",
            hex::encode(&audio[..audio.len().min(20)])
        );
        let format = detect_audio_format(&audio);
        tracing::info!(
            "Detected audio format: {}, sending as {} ({})",
            format,
            format.upload_file_name(),
            format.content_type()
        );

        self.analyzer.transcribe_audio(&audio, format).await
    }
}
