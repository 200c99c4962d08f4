use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::field_updater::append_to_lead_field;
use crate::handlers::AppState;
use crate::kommo_client::StageGate;
use crate::message::assemble_message;
use crate::models::MessageEvent;
use crate::nested_form::parse_nested_form;
use crate::webhook_models::WebhookResponse;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header::USER_AGENT, HeaderMap},
    Json,
};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub const STAGE_REJECTED_MESSAGE: &str = "Lead no está en la etapa o pipeline permitidos.";

/// Kommo chat webhook handler.
///
/// Flow:
/// 1. Check the caller's `User-Agent`.
/// 2. Decode the bracketed form body into a tree.
/// 3. Extract `message[add][0]`.
/// 4. Check the lead's stage and pipeline.
/// 5. Describe/transcribe the attachment, if any.
/// 6. Append the resulting text to the lead's message field.
///
/// Every outcome is a `{"status": ...}` JSON object.
pub async fn kommo_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<WebhookResponse>, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("kommo_webhook", %request_id);

    async move {
        tracing::info!("Received Kommo webhook");
        validate_user_agent(&state.config, &headers)?;

        let body = body.map_err(|e| AppError::BadRequest(format!("unreadable body: {}", e)))?;
        let tree = parse_nested_form(url::form_urlencoded::parse(&body))?;
        tracing::debug!(
            "Form data:\n{}",
            serde_json::to_string_pretty(&tree).unwrap_or_default()
        );

        let event = MessageEvent::from_form(&tree)?;
        let lead_id = event.entity_id;

        let admitted = state
            .kommo
            .is_in_stage(lead_id, StageGate::from_config(&state.config))
            .await
            .context("Error validando etapa Kommo")?;
        if !admitted {
            return Err(AppError::StageRejected(STAGE_REJECTED_MESSAGE.to_string()));
        }

        let processed = assemble_message(&event, &state.attachments).await;
        append_to_lead_field(
            &state.kommo,
            processed.lead_id,
            state.config.kommo_message_field_id,
            &processed.text,
        )
        .await
        .with_context(|| format!("Failed to append message to lead {}", lead_id))?;

        tracing::info!("Message appended to lead {}", lead_id);
        Ok(Json(WebhookResponse::ok()))
    }
    .instrument(span)
    .await
}

/// Only the CRM's webhook sender may call the endpoint.
fn validate_user_agent(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref expected) = config.webhook_user_agent else {
        return Ok(());
    };

    let agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    if agent != Some(expected.as_str()) {
        tracing::warn!("Invalid User-Agent: {:?}", agent);
        return Err(AppError::Unauthorized(format!(
            "Este webhook solo acepta peticiones de {}",
            expected
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(agent: Option<&str>) -> Config {
        Config {
            port: 0,
            kommo_token: "t".to_string(),
            kommo_subdomain: "acme".to_string(),
            kommo_base_url: "https://acme.kommo.com".to_string(),
            kommo_message_field_id: 1,
            kommo_status_id: 2,
            kommo_pipeline_id: 3,
            webhook_user_agent: agent.map(String::from),
            openai_api_key: "k".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            openai_vision_model: "gpt-4o".to_string(),
            openai_transcription_model: "whisper-1".to_string(),
            http_timeout_secs: 5,
            media_scratch_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_user_agent_must_match() {
        let config = config(Some("amoCRM-Webhooks/3.0"));
        let mut headers = HeaderMap::new();
        assert!(matches!(
            validate_user_agent(&config, &headers),
            Err(AppError::Unauthorized(_))
        ));

        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        assert!(validate_user_agent(&config, &headers).is_err());

        headers.insert(USER_AGENT, HeaderValue::from_static("amoCRM-Webhooks/3.0"));
        assert!(validate_user_agent(&config, &headers).is_ok());
    }

    #[test]
    fn test_user_agent_check_can_be_disabled() {
        assert!(validate_user_agent(&config(None), &HeaderMap::new()).is_ok());
    }
}
