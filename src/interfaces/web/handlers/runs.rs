use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use std::convert::Infallible;
use tracing::debug;

use super::super::AppState;
use super::{error_response, rejection_response};
use crate::core::error::ServiceError;
use crate::core::notifier::RunEvent;
use crate::core::store::types::RunStatusChange;

#[derive(serde::Deserialize)]
pub struct ListRunsQuery {
    agent_id: Option<i64>,
}

#[derive(serde::Deserialize)]
pub struct StartRunRequest {
    agent_id: i64,
    input_text: String,
}

pub async fn get_runs(
    State(state): State<AppState>,
    query: Result<Query<ListRunsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.query.get_agent_runs(query.agent_id).await {
        Ok(runs) => Json(serde_json::json!({ "success": true, "runs": runs })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn start_run_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<StartRunRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state
        .services
        .runs
        .start(payload.agent_id, &payload.input_text)
        .await
    {
        Ok(run) => Json(serde_json::json!({ "success": true, "run": run })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_run_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
) -> Response {
    let Path(id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.query.get_agent_run(id).await {
        Ok(run) => Json(serde_json::json!({ "success": true, "run": run })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn update_run_status_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<RunStatusChange>, JsonRejection>,
) -> Response {
    let Path(id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    let Json(change) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.runs.set_status(id, &change).await {
        Ok(run) => Json(serde_json::json!({ "success": true, "run": run })).into_response(),
        Err(e) => error_response(e),
    }
}

fn sse_event(item: Result<RunEvent, ServiceError>) -> Event {
    let payload = match item {
        Ok(event) => {
            if event.is_complete() {
                debug!("Run stream delivered its final event");
            }
            serde_json::to_string(&event)
        }
        Err(e) => serde_json::to_string(&serde_json::json!({ "type": "error", "error": e.to_string() })),
    };
    match payload {
        Ok(json) => Event::default().data(json),
        Err(e) => Event::default()
            .data(serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()),
    }
}

/// Streams run events as SSE. A missing run is answered with a plain 404
/// before any stream is opened.
pub async fn stream_run_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
) -> Response {
    let Path(id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.store.get_run(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(ServiceError::run_not_found(id)),
        Err(e) => return error_response(e.into()),
    }
    debug!(
        "Streaming run {} (poll every {:?})",
        id,
        state.services.notifier.defaults().poll_interval
    );

    let stream = state
        .services
        .notifier
        .subscribe(id)
        .map(|item| Ok::<_, Infallible>(sse_event(item)));

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

