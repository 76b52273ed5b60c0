use bytes::Bytes;
use common::{error::AppError, types::DocumentChunk};
use retrieval_pipeline::RetrievalStore;
use tracing::warn;

use crate::chunker::Chunker;

use super::config::IngestionConfig;

pub struct PipelineContext<'a> {
    pub filename: String,
    pub content: Bytes,
    pub config: &'a IngestionConfig,
    pub chunker: &'a Chunker,
    pub store: &'a dyn RetrievalStore,
    pub chunks: Vec<DocumentChunk>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        filename: String,
        content: Bytes,
        config: &'a IngestionConfig,
        chunker: &'a Chunker,
        store: &'a dyn RetrievalStore,
    ) -> Self {
        Self {
            filename,
            content,
            config,
            chunker,
            store,
            chunks: Vec::new(),
        }
    }

    pub fn abort(&self, stage: &'static str, err: AppError) -> AppError {
        warn!(
            filename = %self.filename,
            stage,
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }
}
