//! API route definitions.

use super::state::AppState;
use crate::incident::ParseError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook_generic))
        .route("/webhook/{source}", post(webhook))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{id}", get(get_incident))
        .route("/incidents/{id}/resolve", post(resolve_incident))
        .route("/stats", get(mttr_stats))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    envelope(json!({
        "status": "ok",
        "active_incidents": state.orchestrator.active_count().await,
    }))
}

async fn submit(
    state: &AppState,
    source: &str,
    payload: Value,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.orchestrator.submit(source, payload).await {
        Ok(incident) => Ok(envelope(json!({
            "status": "accepted",
            "incident_id": incident.id,
            "incident_status": incident.status,
        }))),
        Err(e) => match e.downcast_ref::<ParseError>() {
            Some(parse_err) => Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": parse_err.to_string() })),
            )),
            None => {
                error!("Webhook processing error: {e:#}");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                ))
            }
        },
    }
}

async fn webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    submit(&state, &source, payload).await
}

/// Generic ingress without a source in the URL; the payload may name one.
async fn webhook_generic(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source = payload
        .get("source")
        .and_then(|s| s.as_str())
        .unwrap_or("generic")
        .to_string();
    submit(&state, &source, payload).await
}

async fn list_incidents(State(state): State<AppState>) -> Json<Value> {
    let incidents = state.orchestrator.active().await;
    envelope(json!({
        "count": incidents.len(),
        "incidents": incidents,
    }))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(incident) = state.orchestrator.get(&id).await {
        return Ok(envelope(json!(incident)));
    }
    // Resolved incidents are only visible through persistence.
    match state.store.get(&id).await {
        Ok(Some(incident)) => Ok(envelope(json!(incident))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "incident not found" })),
        )),
        Err(e) => {
            error!("Incident lookup failed: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            ))
        }
    }
}

async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.orchestrator.resolve(&id).await {
        Ok(Some(incident)) => Ok(envelope(json!({
            "status": "resolved",
            "incident": incident,
        }))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "incident not found" })),
        )),
        Err(e) => {
            error!("Resolve failed: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            ))
        }
    }
}

#[derive(Deserialize)]
struct StatsParams {
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    30
}

async fn mttr_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.mttr.report(params.days).await {
        Ok(report) => Ok(envelope(json!(report))),
        Err(e) => {
            error!("Stats query failed: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            ))
        }
    }
}
