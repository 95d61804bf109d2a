use axum::extract::State;
use axum::Json;

use crate::api::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once state is loaded; reports the last settled epoch.
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let last_settled_epoch = state.service.last_settled_epoch().await;
    Json(serde_json::json!({
        "status": "ready",
        "lastSettledEpoch": last_settled_epoch,
    }))
}
