//! Configuration API routes.

use crate::config::{self, RootConfig};
use crate::server::{ApiError, AppContext};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use omniscan_common::Error;
use serde::Deserialize;

pub fn config_routes() -> Router<AppContext> {
    Router::new()
        .route("/config", get(get_config))
        .route("/config/reload", post(reload_config))
        .route("/config/roots", put(update_roots))
}

async fn get_config(State(ctx): State<AppContext>) -> impl IntoResponse {
    let mut config = ctx.scheduler.config();
    // Never hand out secrets
    if config.server.webhook_security.signature_secret.is_some() {
        config.server.webhook_security.signature_secret = Some("********".to_string());
    }
    for server in &mut config.media_servers {
        server.api_key = "********".to_string();
    }
    Json(config)
}

/// Re-read the config file and apply it.
async fn reload_config(State(ctx): State<AppContext>) -> Result<impl IntoResponse, ApiError> {
    let path = ctx.scheduler.config_path().ok_or_else(|| {
        ApiError::new(
            StatusCode::CONFLICT,
            "no_config_file",
            "Server was started without a config file",
        )
    })?;

    let new = config::load_config(path).map_err(|e| Error::config(format!("{:#}", e)))?;
    ctx.scheduler.reload(new)?;

    Ok(Json(serde_json::json!({
        "status": "reloaded",
        "roots": ctx.scheduler.roots().len(),
    })))
}

#[derive(Deserialize)]
struct UpdateRootsRequest {
    roots: Vec<RootConfig>,
}

async fn update_roots(
    State(ctx): State<AppContext>,
    Json(req): Json<UpdateRootsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.scheduler.update_roots(req.roots)?;

    tracing::info!(roots = ctx.scheduler.roots().len(), "watched roots updated via API");
    Ok(Json(ctx.scheduler.config().roots))
}
