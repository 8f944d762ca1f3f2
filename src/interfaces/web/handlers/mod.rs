pub mod agents;
pub mod health;
pub mod outputs;
pub mod runs;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::error::ServiceError;

pub(crate) fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::PreconditionFailed(_) => StatusCode::CONFLICT,
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Storage(e) => {
            tracing::error!("Storage failure while serving request: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(serde_json::json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

/// Malformed bodies, path ids or query strings.
pub(crate) fn rejection_response(rejection: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "error": rejection.to_string() })),
    )
        .into_response()
}
