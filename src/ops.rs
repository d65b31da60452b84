//! Read-only operator API.
//!
//! Surfaces engine counters, configuration warnings, exhausted pairs, and
//! per-lead attempt history. No write path: rules and leads are managed
//! by the surrounding CRM, and exhaustion is never reset from here.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::engine::OutreachEngine;
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OutreachEngine>,
}

/// Build the Axum router with the operator routes.
pub fn ops_routes(engine: Arc<OutreachEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/warnings", get(warnings))
        .route("/api/exhausted", get(exhausted))
        .route("/api/leads/{id}/attempts", get(lead_attempts))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cadence"
    }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.status())
}

async fn warnings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.warnings())
}

async fn exhausted(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.exhausted())
}

async fn lead_attempts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(lead_id) = Uuid::parse_str(&id) else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "invalid lead id"})))
            .into_response();
    };

    match state.engine.store().lead_history(lead_id).await {
        Ok(attempts) => Json(attempts).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
