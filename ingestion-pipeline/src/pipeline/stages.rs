use common::{error::AppError, types::DocumentChunk};
use retrieval_pipeline::Metadata;
use state_machines::core::GuardError;
use tracing::{debug, instrument};

use crate::chunker::{extension_of, MISSING_EXTENSION};

use super::{
    context::PipelineContext,
    state::{Chunked, IngestionMachine, Persisted, Ready, Validated},
};

/// Size first, then extension, so an oversized file of any type fails on size.
#[instrument(level = "trace", skip_all, fields(filename = %ctx.filename))]
pub fn validate(
    machine: IngestionMachine<(), Ready>,
    ctx: &PipelineContext<'_>,
) -> Result<IngestionMachine<(), Validated>, AppError> {
    let size = ctx.content.len();
    if size > ctx.config.max_upload_bytes {
        let _failed = machine.abort();
        return Err(ctx.abort(
            "validate",
            AppError::Validation(ctx.config.size_limit_message()),
        ));
    }

    let extension = extension_of(&ctx.filename);
    if !extension.as_deref().is_some_and(|ext| ctx.config.allows(ext)) {
        let label = extension.as_deref().unwrap_or(MISSING_EXTENSION);
        let _failed = machine.abort();
        return Err(ctx.abort(
            "validate",
            AppError::Validation(format!("{label} is not supported")),
        ));
    }

    debug!(filename = %ctx.filename, size, "upload passed validation");

    machine
        .validate()
        .map_err(|(_, guard)| map_guard_error("validate", &guard))
}

#[instrument(level = "trace", skip_all, fields(filename = %ctx.filename))]
pub async fn chunk(
    machine: IngestionMachine<(), Validated>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Chunked>, AppError> {
    let chunker = ctx.chunker.clone();
    let filename = ctx.filename.clone();
    let content = ctx.content.clone();

    let outcome = tokio::task::spawn_blocking(move || chunker.chunk(&filename, &content))
        .await
        .map_err(AppError::from)
        .and_then(|result| result);

    match outcome {
        Ok(chunks) => {
            debug!(filename = %ctx.filename, chunk_count = chunks.len(), "document chunked");
            ctx.chunks = chunks;
            machine
                .chunk()
                .map_err(|(_, guard)| map_guard_error("chunk", &guard))
        }
        Err(err) => {
            let _failed = machine.abort();
            Err(ctx.abort("chunk", err))
        }
    }
}

#[instrument(level = "trace", skip_all, fields(filename = %ctx.filename))]
pub async fn persist(
    machine: IngestionMachine<(), Chunked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<(IngestionMachine<(), Persisted>, usize), AppError> {
    let chunks = std::mem::take(&mut ctx.chunks);
    let (texts, metadatas): (Vec<String>, Vec<Metadata>) = chunks
        .into_iter()
        .map(|DocumentChunk { text, metadata }| (text, metadata))
        .unzip();

    match ctx.store.upsert(texts, metadatas).await {
        Ok(written) => {
            let machine = machine
                .persist()
                .map_err(|(_, guard)| map_guard_error("persist", &guard))?;
            Ok((machine, written))
        }
        Err(err) => {
            let _failed = machine.abort();
            Err(ctx.abort("persist", AppError::Processing(format!("upsert failed: {err}"))))
        }
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
