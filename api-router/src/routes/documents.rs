use axum::{extract::State, http::StatusCode, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart, TypedMultipartError};
use bytes::Bytes;
use common::types::{UploadRequest, UploadResponse};
use ingestion_pipeline::upload_response;
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub file: FieldData<Bytes>,
}

/// Indexes one uploaded file. Every outcome, including a malformed or
/// oversized multipart body, is answered with an [`UploadResponse`].
pub async fn upload_document(
    State(state): State<ApiState>,
    params: Result<TypedMultipart<UploadParams>, TypedMultipartError>,
) -> (StatusCode, Json<UploadResponse>) {
    let file = match params {
        Ok(TypedMultipart(UploadParams { file })) => file,
        Err(rejection) => return rejected_upload(&state, &rejection),
    };

    let filename = file.metadata.file_name.unwrap_or_default();
    let outcome = state
        .ingestion
        .ingest(UploadRequest::new(filename, file.contents))
        .await;

    let body = upload_response(&outcome);
    let status = match outcome {
        Ok(_) => StatusCode::OK,
        Err(err) => ApiError::from(err).status_code(),
    };

    (status, Json(body))
}

fn rejected_upload(
    state: &ApiState,
    rejection: &TypedMultipartError,
) -> (StatusCode, Json<UploadResponse>) {
    warn!(error = %rejection, "multipart upload rejected");

    let message = if rejection.get_status() == StatusCode::PAYLOAD_TOO_LARGE {
        state.ingestion.config().size_limit_message()
    } else {
        format!("Invalid upload: {rejection}")
    };

    (StatusCode::BAD_REQUEST, Json(UploadResponse::error(message)))
}
