use axum::{Json, extract::State};

use super::super::AppState;

pub async fn healthcheck(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.services.healthcheck().await;
    Json(serde_json::json!({
        "success": true,
        "status": health.status,
        "timestamp": health.timestamp,
    }))
}
