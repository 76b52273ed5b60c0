use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness check: 200 whenever the process can serve requests at all.
pub async fn live() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
