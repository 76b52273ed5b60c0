#![allow(clippy::missing_docs_in_private_items)]

pub mod static_store;
pub mod surreal_store;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    types::ScoredPassage,
    utils::{
        config::{AppConfig, RetrievalBackend},
        embedding::EmbeddingProvider,
    },
};
use tracing::info;

pub use static_store::StaticRetrievalStore;
pub use surreal_store::SurrealRetrievalStore;

pub type Metadata = BTreeMap<String, String>;

/// Embedding-backed passage store used by chat retrieval and document ingestion.
///
/// Implementations own embedding, indexing, and similarity search; callers only
/// see text in and scored text out.
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Returns at most `limit` passages ordered by descending score.
    ///
    /// An empty corpus yields an empty vector. `limit == 0` is rejected.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPassage>, AppError>;

    /// Embeds and stores `texts` with their `metadatas`, returning the number of
    /// points written.
    ///
    /// Writes happen in bounded batches. A failure part-way leaves earlier
    /// batches in place.
    async fn upsert(&self, texts: Vec<String>, metadatas: Vec<Metadata>)
        -> Result<usize, AppError>;
}

pub(crate) fn validate_limit(limit: usize) -> Result<(), AppError> {
    if limit == 0 {
        return Err(AppError::Validation(
            "search limit must be a positive integer".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_upsert_input(texts: &[String], metadatas: &[Metadata]) -> Result<(), AppError> {
    if texts.len() != metadatas.len() {
        return Err(AppError::Validation(format!(
            "upsert received {} texts but {} metadata entries",
            texts.len(),
            metadatas.len()
        )));
    }
    Ok(())
}

/// Resolves the configured retrieval backend once at start-up.
pub async fn build_retrieval_store(
    config: &AppConfig,
) -> Result<Arc<dyn RetrievalStore>, AppError> {
    match config.retrieval_backend {
        RetrievalBackend::Static => {
            info!("Using static placeholder retrieval store");
            Ok(Arc::new(StaticRetrievalStore::default()))
        }
        RetrievalBackend::SurrealDb => {
            let db = SurrealDbClient::from_config(config).await?;
            let embedding_provider = EmbeddingProvider::from_config(config).await?;
            info!(
                surrealdb_address = %config.surrealdb_address,
                embedding_backend = embedding_provider.backend_label(),
                embedding_dimension = embedding_provider.dimension(),
                "Using SurrealDB retrieval store"
            );
            let store =
                SurrealRetrievalStore::new(db, embedding_provider, config.upsert_batch_size).await?;
            Ok(Arc::new(store))
        }
    }
}
