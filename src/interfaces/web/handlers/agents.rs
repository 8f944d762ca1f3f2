use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::{error_response, rejection_response};
use crate::core::store::types::{AgentPatch, NewAgent};

#[derive(serde::Deserialize)]
pub struct ListAgentsQuery {
    #[serde(default)]
    include_inactive: bool,
}

pub async fn get_agents(
    State(state): State<AppState>,
    query: Result<Query<ListAgentsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.query.get_agents(query.include_inactive).await {
        Ok(agents) => Json(serde_json::json!({ "success": true, "agents": agents })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn create_agent_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<NewAgent>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.agents.create_agent(&payload).await {
        Ok(agent) => Json(serde_json::json!({ "success": true, "agent": agent })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_agent_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
) -> Response {
    let Path(id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.query.get_agent_by_id(id).await {
        Ok(agent) => Json(serde_json::json!({ "success": true, "agent": agent })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn update_agent_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<AgentPatch>, JsonRejection>,
) -> Response {
    let Path(id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    let Json(patch) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.agents.update_agent(id, &patch).await {
        Ok(agent) => Json(serde_json::json!({ "success": true, "agent": agent })).into_response(),
        Err(e) => error_response(e),
    }
}
