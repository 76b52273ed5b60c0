mod config;
mod context;
mod stages;
mod state;

pub use config::IngestionConfig;

use std::{sync::Arc, time::Instant};

use common::{
    error::AppError,
    types::{UploadRequest, UploadResponse},
};
use retrieval_pipeline::RetrievalStore;
use tracing::info;

use crate::chunker::Chunker;

use self::{
    context::PipelineContext,
    stages::{chunk, persist, validate},
    state::ready,
};

/// Message returned when indexing fails for a reason the caller cannot fix.
pub const INDEXING_FAILURE_MESSAGE: &str = "Failed to index document";

/// Validates, chunks, and indexes uploaded documents into a [`RetrievalStore`].
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    config: IngestionConfig,
    chunker: Chunker,
    store: Arc<dyn RetrievalStore>,
}

impl IngestionPipeline {
    pub fn new(config: IngestionConfig, store: Arc<dyn RetrievalStore>) -> Result<Self, AppError> {
        let chunker = Chunker::new(config.chunker)?;
        Ok(Self {
            config,
            chunker,
            store,
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Runs the pipeline and folds every outcome into an [`UploadResponse`].
    pub async fn upload_document(&self, request: UploadRequest) -> UploadResponse {
        upload_response(&self.ingest(request).await)
    }

    /// Runs the pipeline, returning the number of indexed chunks.
    ///
    /// `AppError::Validation` means the upload itself was rejected. Any other
    /// error is a processing or storage failure.
    #[tracing::instrument(
        skip_all,
        fields(filename = %request.filename, bytes = request.file_content.len())
    )]
    pub async fn ingest(&self, request: UploadRequest) -> Result<usize, AppError> {
        let started = Instant::now();
        let UploadRequest {
            filename,
            file_content,
        } = request;
        let mut ctx = PipelineContext::new(
            filename,
            file_content,
            &self.config,
            &self.chunker,
            self.store.as_ref(),
        );

        let machine = ready();
        let machine = validate(machine, &ctx)?;
        let machine = chunk(machine, &mut ctx).await?;
        let chunk_count = ctx.chunks.len();
        let (_machine, written) = persist(machine, &mut ctx).await?;

        info!(
            filename = %ctx.filename,
            chunk_count,
            written,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "document ingested"
        );

        Ok(written)
    }
}

/// Maps an ingestion outcome to the wire response.
///
/// Validation messages are passed through; other failures get a generic message.
pub fn upload_response(outcome: &Result<usize, AppError>) -> UploadResponse {
    match outcome {
        Ok(written) => UploadResponse::success(*written),
        Err(AppError::Validation(message)) => UploadResponse::error(message.clone()),
        Err(_) => UploadResponse::error(INDEXING_FAILURE_MESSAGE),
    }
}

#[cfg(test)]
mod tests;
