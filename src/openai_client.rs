use crate::attachments::ContentAnalyzer;
use crate::audio_format::AudioFormat;
use crate::config::Config;
use crate::errors::{truncate_body, AppError};
use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const VISION_MAX_TOKENS: u32 = 1000;

/// OpenAI client for image description (chat completions with vision)
/// and voice transcription (Whisper).
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    vision_model: String,
    transcription_model: String,
}

impl OpenAiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        vision_model: String,
        transcription_model: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::Config("OpenAI API key required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create OpenAI client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            vision_model,
            transcription_model,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_vision_model.clone(),
            config.openai_transcription_model.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    async fn check_status(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!("OpenAI {} error {}: {}", what, status, truncate_body(&body));
        Err(AppError::upstream("OpenAI", status.as_u16(), &body))
    }
}

#[async_trait]
impl ContentAnalyzer for OpenAiClient {
    async fn describe_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, AppError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let request = ChatCompletionRequest {
            model: self.vision_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", mime_type, encoded),
                        },
                    },
                ],
            }],
            max_tokens: VISION_MAX_TOKENS,
        };

        tracing::debug!(
            "Sending {} byte image to OpenAI model {}",
            image.len(),
            self.vision_model
        );
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response, "vision").await?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse OpenAI response: {}", e))
        })?;

        serde_json::from_value::<ChatCompletionResponse>(body.clone())
            .ok()
            .and_then(|parsed| parsed.choices.into_iter().next())
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::ExternalApiError(format!(
                    "Unexpected OpenAI response: {}",
                    truncate_body(&body.to_string())
                ))
            })
    }

    async fn transcribe_audio(
        &self,
        audio: &[u8],
        format: AudioFormat,
    ) -> Result<String, AppError> {
        if audio.is_empty() {
            return Err(AppError::BadRequest("audio file is empty".to_string()));
        }

        let part = Part::bytes(audio.to_vec())
            .file_name(format.upload_file_name())
            .mime_str(format.content_type())
            .map_err(|e| AppError::InternalError(format!("Invalid MIME type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone());

        tracing::debug!(
            "Sending {} byte audio to OpenAI as {} ({})",
            audio.len(),
            format.upload_file_name(),
            format.content_type()
        );
        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response, "transcription").await?;

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Unexpected OpenAI transcription response: {}", e))
        })?;

        Ok(result.text)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> OpenAiClient {
        OpenAiClient::new(
            base_url,
            "sk-test".to_string(),
            "gpt-4o".to_string(),
            "whisper-1".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_content_parts_are_type_tagged() {
        let part = ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/png;base64,AAAA".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}})
        );
    }

    #[test]
    fn test_empty_key_is_config_error() {
        let result = OpenAiClient::new(
            "https://api.openai.com".to_string(),
            " ".to_string(),
            "gpt-4o".to_string(),
            "whisper-1".to_string(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_describe_image_sends_data_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "max_tokens": 1000,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "describe"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Three pixels"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let summary = client(mock_server.uri())
            .describe_image(&[1, 2, 3], "image/png", "describe")
            .await
            .unwrap();
        assert_eq!(summary, "Three pixels");
    }

    #[tokio::test]
    async fn test_describe_image_rejects_unexpected_shape() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri())
            .describe_image(&[1], "image/png", "describe")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected OpenAI response"));
    }

    #[tokio::test]
    async fn test_transcribe_audio() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hola"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let text = client(mock_server.uri())
            .transcribe_audio(b"OggS-payload", AudioFormat::Ogg)
            .await
            .unwrap();
        assert_eq!(text, "hola");

        let requests = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_lowercase();
        assert!(body.contains("filename=\"audio.ogg\""));
        assert!(body.contains("content-type: audio/ogg"));
        assert!(body.contains("whisper-1"));
    }

    #[tokio::test]
    async fn test_transcribe_audio_upstream_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid file format"))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri())
            .transcribe_audio(b"junk", AudioFormat::M4a)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 400, .. }));
    }
}
