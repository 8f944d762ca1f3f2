use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::{error_response, rejection_response};
use crate::core::store::types::NewOutput;

pub async fn get_outputs_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
) -> Response {
    let Path(run_id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.query.get_agent_outputs(run_id).await {
        Ok(outputs) => {
            Json(serde_json::json!({ "success": true, "outputs": outputs })).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn create_output_endpoint(
    path: Result<Path<i64>, PathRejection>,
    State(state): State<AppState>,
    payload: Result<Json<NewOutput>, JsonRejection>,
) -> Response {
    let Path(run_id) = match path {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    let Json(output) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    match state.services.outputs.record(run_id, &output).await {
        Ok(output) => Json(serde_json::json!({ "success": true, "output": output })).into_response(),
        Err(e) => error_response(e),
    }
}
