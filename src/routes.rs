use crate::handlers::{health, AppState};
use crate::webhook_handler::kommo_webhook;
use crate::webhook_models::WebhookResponse;
use axum::{
    body::to_bytes,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Request size limit for webhook bodies: 5MB.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// How much of a rejected response body is kept as the error message.
const REJECTION_BODY_BYTES: usize = 4 * 1024;

/// Kommo-facing routes, before rate limiting.
///
/// Oversized bodies surface as a `BytesRejection` inside the handler.
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/add_message", post(kommo_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Rewrites responses produced by middleware (rate limiting, body limits,
/// method mismatches) into the webhook's JSON status object with a 200.
async fn json_envelope(response: Response) -> Response {
    let status = response.status();
    if status.is_success() {
        return response;
    }

    let body = to_bytes(response.into_body(), REJECTION_BODY_BYTES)
        .await
        .unwrap_or_default();
    let detail = String::from_utf8_lossy(&body);
    let message = match detail.trim() {
        "" => status.to_string(),
        detail => format!("{}: {}", status, detail),
    };
    tracing::warn!("Webhook rejected before reaching the handler: {}", message);

    (StatusCode::OK, Json(WebhookResponse::error(message))).into_response()
}

/// Assembles the final app around an already-layered set of webhook routes.
///
/// `/health` stays outside whatever limits the caller puts on `webhooks`.
pub fn app(webhooks: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(webhooks.layer(middleware::map_response(json_envelope)))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Full router without rate limiting.
pub fn router(state: Arc<AppState>) -> Router {
    app(webhook_routes(), state)
}
