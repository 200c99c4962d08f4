use serde::Deserialize;
use std::path::PathBuf;

/// Kommo custom field that accumulates the client's messages.
pub const DEFAULT_MESSAGE_FIELD_ID: i64 = 955666;
/// Stage a lead must be in for the bridge to act on it.
pub const DEFAULT_STATUS_ID: i64 = 93482383;
/// Pipeline a lead must be in for the bridge to act on it.
pub const DEFAULT_PIPELINE_ID: i64 = 12109475;
pub const DEFAULT_WEBHOOK_USER_AGENT: &str = "amoCRM-Webhooks/3.0";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub kommo_token: String,
    pub kommo_subdomain: String,
    /// Base URL of the Kommo account, `https://{subdomain}.kommo.com` unless overridden.
    pub kommo_base_url: String,
    pub kommo_message_field_id: i64,
    pub kommo_status_id: i64,
    pub kommo_pipeline_id: i64,
    /// Expected `User-Agent` of webhook calls. `None` disables the check.
    pub webhook_user_agent: Option<String>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_vision_model: String,
    pub openai_transcription_model: String,
    pub http_timeout_secs: u64,
    /// Directory for the short-lived copies of downloaded attachments.
    pub media_scratch_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let kommo_subdomain = required("SUBDOMAIN_KOMMO")?;
        let kommo_base_url = match optional("KOMMO_BASE_URL") {
            Some(url) => validate_http_url("KOMMO_BASE_URL", url)?,
            None => format!("https://{}.kommo.com", kommo_subdomain),
        };

        let config = Self {
            port: parse_or("PORT", 8080)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            kommo_token: required("TOKEN_KOMMO")?,
            kommo_subdomain,
            kommo_base_url,
            kommo_message_field_id: parse_or("KOMMO_MESSAGE_FIELD_ID", DEFAULT_MESSAGE_FIELD_ID)?,
            kommo_status_id: parse_or("KOMMO_STATUS_ID", DEFAULT_STATUS_ID)?,
            kommo_pipeline_id: parse_or("KOMMO_PIPELINE_ID", DEFAULT_PIPELINE_ID)?,
            webhook_user_agent: match std::env::var("WEBHOOK_USER_AGENT") {
                Ok(agent) if agent.trim().is_empty() => None,
                Ok(agent) => Some(agent),
                Err(_) => Some(DEFAULT_WEBHOOK_USER_AGENT.to_string()),
            },
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: match optional("OPENAI_BASE_URL") {
                Some(url) => validate_http_url("OPENAI_BASE_URL", url)?,
                None => "https://api.openai.com".to_string(),
            },
            openai_vision_model: optional("OPENAI_VISION_MODEL")
                .unwrap_or_else(|| "gpt-4o".to_string()),
            openai_transcription_model: optional("OPENAI_TRANSCRIPTION_MODEL")
                .unwrap_or_else(|| "whisper-1".to_string()),
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 30)?,
            media_scratch_dir: optional("MEDIA_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        };

        if config.http_timeout_secs == 0 {
            anyhow::bail!("HTTP_TIMEOUT_SECS must be greater than zero");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Kommo Base URL: {}", config.kommo_base_url);
        tracing::debug!("OpenAI Base URL: {}", config.openai_base_url);
        tracing::debug!(
            "Stage gate: status_id={}, pipeline_id={}, field_id={}",
            config.kommo_status_id,
            config.kommo_pipeline_id,
            config.kommo_message_field_id
        );
        if config.webhook_user_agent.is_none() {
            tracing::warn!("WEBHOOK_USER_AGENT is empty, webhook caller is not checked");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}

fn validate_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}
