//! HTTP routes: submit, poll, stream, cancel, health.

use crate::gateway::{AppState, push};
use acore::{JobId, JobKind};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use channel::channel_key;
use serde::Deserialize;
use serde_json::{Value, json};

/// Build the axum router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(submit))
        .route("/jobs/{id}", get(poll))
        .route("/jobs/{id}/stream", get(stream))
        .route("/jobs/{id}/cancel", post(cancel))
        .with_state(state)
}

/// Submission body. A caller-supplied id makes the request an
/// idempotent retry.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    kind: JobKind,
    #[serde(default)]
    args: Value,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    /// Entry id to resume from; 0 streams from the beginning.
    #[serde(default)]
    from: u64,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Accepted, not completed: the handle comes back before anything
/// runs.
async fn submit(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> Response {
    let result = match req.id {
        Some(id) => {
            state
                .dispatcher
                .dispatch_with_id(JobId::from_string(id), req.kind, req.args)
        }
        None => state.dispatcher.dispatch(req.kind, req.args),
    };
    match result {
        Ok(handle) => (StatusCode::ACCEPTED, Json(handle)).into_response(),
        Err(e) => {
            tracing::error!("dispatch failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// The polling surface: the full job record.
async fn poll(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = JobId::from_string(id);
    match state.jobs.get(&id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => {
            tracing::error!("reading job {id}: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// The streaming surface: the job's channel as NDJSON.
async fn stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let id = JobId::from_string(id);
    match state.jobs.get(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }

    // Disconnect on this stream cancels the job downward.
    let stop = state.stops.register(&id);
    push::ndjson_response(
        state.channels.clone(),
        channel_key(&id),
        query.from,
        state.config.ping_interval(),
        state.config.poll_interval(),
        stop,
    )
}

/// Request cooperative cancellation.
async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = JobId::from_string(id);
    match state.jobs.get(&id) {
        Ok(Some(_)) => {
            state.stops.cancel(&id);
            (StatusCode::ACCEPTED, Json(json!({ "status": "cancelling" }))).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
