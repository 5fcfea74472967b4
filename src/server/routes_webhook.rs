use crate::arr::{PayloadError, WebhookRequest};
use crate::scheduler::IngestBatch;
use crate::server::auth::verify_webhook_signature;
use crate::server::{ApiError, AppContext};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use omniscan_common::{Error, EventSource};
use serde::Serialize;
use std::sync::Arc;

pub const SIGNATURE_HEADER: &str = "x-omniscan-signature";

pub fn webhook_routes() -> Router<AppContext> {
    Router::new().route("/webhook", post(handle_webhook))
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: &'static str,
    accepted: Vec<String>,
    ignored: Vec<String>,
}

async fn handle_webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let security = ctx.scheduler.config().server.webhook_security;

    if security.signature_verification {
        if let Some(ref secret) = security.signature_secret {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    ApiError::unauthorized(format!("Missing {} header", SIGNATURE_HEADER))
                })?;

            if !verify_webhook_signature(secret, &body, signature) {
                tracing::warn!("Webhook signature verification failed");
                return Err(ApiError::unauthorized("Invalid signature"));
            }
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("invalid_json", format!("Invalid JSON payload: {}", e)))?;
    let request = WebhookRequest::from_json(&payload).map_err(|e: PayloadError| {
        tracing::debug!("Rejected webhook payload: {}", e);
        ApiError::from(e)
    })?;

    if request.is_test {
        tracing::info!("Received webhook connection test");
        return Ok(Json(WebhookResponse {
            status: "ignored",
            accepted: Vec::new(),
            ignored: request.paths,
        }));
    }

    tracing::info!(
        event_type = request.event_type.as_deref().unwrap_or("none"),
        kind = %request.kind,
        paths = request.paths.len(),
        "Received webhook"
    );

    let scheduler = Arc::clone(&ctx.scheduler);
    let kind = request.kind;
    let paths = request.paths;
    let IngestBatch { accepted, ignored } = tokio::task::spawn_blocking(move || {
        scheduler.ingest_batch(&paths, EventSource::Webhook, kind)
    })
    .await
    .map_err(|e| Error::internal(format!("webhook ingest task failed: {}", e)))??;

    let status = if accepted.is_empty() {
        "ignored"
    } else {
        "accepted"
    };
    Ok(Json(WebhookResponse {
        status,
        accepted,
        ignored,
    }))
}
