use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

const READINESS_QUERY: &str = "readiness check";

/// Readiness check: returns 200 if the retrieval store answers, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.search(READINESS_QUERY, 1).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": {
                    "retrieval": "ok",
                    "generation": state.orchestrator.provider_name(),
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "retrieval": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}
