use crate::config::Config;
use crate::errors::{truncate_body, AppError};
use crate::models::{KommoLead, LeadFieldsPatch};
use reqwest;
use std::time::Duration;
use tracing;

/// Stage and pipeline a lead must be in before the bridge touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGate {
    pub status_id: i64,
    pub pipeline_id: i64,
}

impl StageGate {
    pub fn from_config(config: &Config) -> Self {
        Self {
            status_id: config.kommo_status_id,
            pipeline_id: config.kommo_pipeline_id,
        }
    }

    /// Exact comparison against both identifiers.
    pub fn admits(&self, lead: &KommoLead) -> bool {
        lead.status_id == Some(self.status_id) && lead.pipeline_id == Some(self.pipeline_id)
    }
}

/// Client for the Kommo v4 leads API.
#[derive(Clone)]
pub struct KommoClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl KommoClient {
    /// Creates a new `KommoClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Account URL, e.g. `https://acme.kommo.com`.
    /// * `token` - Long-lived integration token.
    /// * `timeout` - Bound applied to every request.
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Kommo client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.kommo_base_url.clone(),
            config.kommo_token.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    fn lead_url(&self, lead_id: i64) -> String {
        format!("{}/api/v4/leads/{}", self.base_url, lead_id)
    }

    /// Gets a lead from Kommo.
    ///
    /// Any status other than 200 is returned as `AppError::UpstreamStatus`.
    pub async fn get_lead(&self, lead_id: i64) -> Result<KommoLead, AppError> {
        let url = self.lead_url(lead_id);
        tracing::info!("Fetching lead {} from Kommo: {}", lead_id, url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Kommo request failed: {}", e)))?;

        let status = response.status();
        tracing::debug!("Kommo GET lead {} returned {}", lead_id, status);
        if status != reqwest::StatusCode::OK {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                "Kommo GET lead {} failed {}: {}",
                lead_id,
                status,
                truncate_body(&error_text)
            );
            return Err(AppError::upstream("Kommo", status.as_u16(), &error_text));
        }

        let lead = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Kommo response is not valid JSON: {}", e))
        })?;

        Ok(lead)
    }

    /// Replaces custom field values on a lead.
    ///
    /// Kommo answers 200 (or 201 on some accounts); anything else is an error.
    pub async fn update_lead_fields(
        &self,
        lead_id: i64,
        patch: &LeadFieldsPatch,
    ) -> Result<(), AppError> {
        let url = self.lead_url(lead_id);
        tracing::info!("Updating custom fields of lead {} in Kommo", lead_id);
        tracing::debug!(
            "PATCH payload: {}",
            serde_json::to_string(patch).unwrap_or_default()
        );

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(patch)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Failed to update lead: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                "Kommo PATCH lead {} failed {}: {}",
                lead_id,
                status,
                truncate_body(&error_text)
            );
            return Err(AppError::upstream("Kommo", status.as_u16(), &error_text));
        }

        tracing::info!("✓ Lead {} updated ({})", lead_id, status);
        Ok(())
    }

    /// Checks that the lead sits in the stage and pipeline the bridge handles.
    pub async fn is_in_stage(&self, lead_id: i64, gate: StageGate) -> Result<bool, AppError> {
        let lead = self.get_lead(lead_id).await?;
        let admitted = gate.admits(&lead);
        tracing::debug!(
            "Lead {} stage check: status_id={:?}, pipeline_id={:?}, admitted={}",
            lead_id,
            lead.status_id,
            lead.pipeline_id,
            admitted
        );
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CustomFieldValues;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> KommoClient {
        KommoClient::new(base_url, "test_token".to_string(), Duration::from_secs(5)).unwrap()
    }

    fn patch(text: &str) -> LeadFieldsPatch {
        LeadFieldsPatch {
            custom_fields_values: vec![CustomFieldValues::text(955666, text)],
        }
    }

    fn lead(status_id: Option<i64>, pipeline_id: Option<i64>) -> KommoLead {
        KommoLead {
            status_id,
            pipeline_id,
            custom_fields_values: None,
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = KommoClient::new(
            "https://example.kommo.com/".to_string(),
            "token".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.lead_url(42), "https://example.kommo.com/api/v4/leads/42");
    }

    #[test]
    fn test_stage_gate_requires_both_ids() {
        let gate = StageGate {
            status_id: 10,
            pipeline_id: 20,
        };
        assert!(gate.admits(&lead(Some(10), Some(20))));
        assert!(!gate.admits(&lead(Some(10), Some(21))));
        assert!(!gate.admits(&lead(Some(11), Some(20))));
        assert!(!gate.admits(&lead(None, Some(20))));
    }

    #[tokio::test]
    async fn test_is_in_stage_reads_lead() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/42"))
            .and(header("authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "status_id": 10,
                "pipeline_id": 20
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = client(mock_server.uri());
        let admitted = StageGate {
            status_id: 10,
            pipeline_id: 20,
        };
        let other = StageGate {
            status_id: 10,
            pipeline_id: 99,
        };
        assert!(client.is_in_stage(42, admitted).await.unwrap());
        assert!(!client.is_in_stage(42, other).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_lead_rejects_non_json_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri()).get_lead(42).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));
        assert!(err.to_string().contains("not valid JSON"), "{}", err);
    }

    #[tokio::test]
    async fn test_get_lead_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri()).get_lead(42).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 204, .. }));
    }

    #[tokio::test]
    async fn test_update_accepts_created() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v4/leads/42"))
            .and(body_json(json!({
                "custom_fields_values": [{"field_id": 955666, "values": [{"value": "hola"}]}]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        client(mock_server.uri())
            .update_lead_fields(42, &patch("hola"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid field"))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri())
            .update_lead_fields(42, &patch("hola"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Kommo returned 400: invalid field");
    }
}
