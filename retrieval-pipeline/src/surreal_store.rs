use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    types::{passage::rank_passages, ScoredPassage},
    utils::embedding::EmbeddingProvider,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{validate_limit, validate_upsert_input, Metadata, RetrievalStore};

const CHUNK_TABLE: &str = "document_chunk";
const CHUNK_EMBEDDING_INDEX: &str = "idx_embedding_document_chunk";
const HNSW_OPTIONS: &str = "DIST COSINE TYPE F32 EFC 100 M 8";
/// Candidate list size for the KNN operator.
const KNN_EF: usize = 40;

const INSERT_CHUNKS: &str = "INSERT INTO document_chunk $records RETURN NONE;";

const STORED_DIMENSION: &str =
    "SELECT array::len(embedding) AS dimension FROM document_chunk LIMIT 1;";

const COUNT_CHUNKS: &str = "SELECT count() AS total FROM document_chunk GROUP ALL;";

fn define_schema(dimension: usize) -> String {
    format!(
        "DEFINE TABLE IF NOT EXISTS {CHUNK_TABLE} SCHEMALESS;
         DEFINE INDEX OVERWRITE {CHUNK_EMBEDDING_INDEX} ON TABLE {CHUNK_TABLE} \
         FIELDS embedding HNSW DIMENSION {dimension} {HNSW_OPTIONS};"
    )
}

fn knn_search(limit: usize) -> String {
    format!(
        "SELECT content, metadata, vector::similarity::cosine(embedding, $embedding) AS score \
         FROM {CHUNK_TABLE} \
         WHERE embedding <|{limit},{KNN_EF}|> $embedding \
         ORDER BY score DESC;"
    )
}

/// A vector with no direction has no defined cosine similarity.
fn has_direction(vector: &[f32]) -> bool {
    vector.iter().any(|value| value.abs() > f32::EPSILON)
}

#[derive(Debug, Serialize)]
struct ChunkRecord {
    content: String,
    metadata: Metadata,
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    content: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    score: Option<f64>,
}

impl SearchRow {
    #[allow(clippy::cast_possible_truncation)]
    fn into_passage(self) -> ScoredPassage {
        let score = self.score.filter(|score| score.is_finite()).unwrap_or(0.0);
        ScoredPassage::new(self.content, self.metadata, score as f32)
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: usize,
}

#[derive(Debug, Deserialize)]
struct DimensionRow {
    dimension: usize,
}

/// Retrieval store backed by a SurrealDB table of embedded chunks with an HNSW index.
pub struct SurrealRetrievalStore {
    db: SurrealDbClient,
    embedding_provider: EmbeddingProvider,
    batch_size: usize,
}

impl SurrealRetrievalStore {
    /// Defines the chunk table and its HNSW index for the provider's dimension.
    ///
    /// Fails with `AppError::Validation` when the table already holds vectors of
    /// another dimension.
    pub async fn new(
        db: SurrealDbClient,
        embedding_provider: EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, AppError> {
        let dimension = embedding_provider.dimension();

        let mut response = db.query(STORED_DIMENSION).await?;
        let stored: Vec<DimensionRow> = response.take(0)?;
        if let Some(existing) = stored.first().map(|row| row.dimension) {
            if existing != dimension {
                return Err(AppError::Validation(format!(
                    "{CHUNK_TABLE} holds {existing}-dimensional embeddings but the embedding backend produces {dimension}; re-index or restore embedding_dimensions"
                )));
            }
        }

        db.query(define_schema(dimension)).await?.check()?;

        Ok(Self {
            db,
            embedding_provider,
            batch_size: batch_size.max(1),
        })
    }

    pub async fn count(&self) -> Result<usize, AppError> {
        let mut response = self.db.query(COUNT_CHUNKS).await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |row| row.total))
    }

    /// Embeds and inserts one batch. Chunks whose embedding has no direction are skipped.
    async fn insert_batch(&self, texts: &[String], metadatas: &[Metadata]) -> Result<usize, AppError> {
        let embeddings = self.embedding_provider.embed_batch(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(AppError::Processing(format!(
                "embedding backend returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        let now = Utc::now();
        let records: Vec<ChunkRecord> = texts
            .iter()
            .zip(metadatas)
            .zip(embeddings)
            .filter(|(_, embedding)| has_direction(embedding))
            .map(|((content, metadata), embedding)| ChunkRecord {
                content: content.clone(),
                metadata: metadata.clone(),
                embedding,
                created_at: now,
            })
            .collect();
        let written = records.len();
        let skipped = texts.len().saturating_sub(written);
        if skipped > 0 {
            debug!(skipped, "chunks without embeddable content skipped");
        }
        if records.is_empty() {
            return Ok(0);
        }

        self.db
            .query(INSERT_CHUNKS)
            .bind(("records", records))
            .await?
            .check()?;

        Ok(written)
    }
}

#[async_trait]
impl RetrievalStore for SurrealRetrievalStore {
    #[instrument(skip_all, fields(limit = limit))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPassage>, AppError> {
        validate_limit(limit)?;

        let embedding = self.embedding_provider.embed(query).await?;
        if !has_direction(&embedding) {
            debug!("query has no embeddable content");
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .query(knn_search(limit))
            .bind(("embedding", embedding))
            .await?;
        let rows: Vec<SearchRow> = response.take(0)?;

        let passages = rows.into_iter().map(SearchRow::into_passage).collect();
        let ranked = rank_passages(passages, limit);

        debug!(hits = ranked.len(), "surrealdb retrieval finished");
        Ok(ranked)
    }

    /// Returns the number of chunks written, which excludes chunks skipped for
    /// having no embeddable content.
    #[instrument(skip_all, fields(texts = texts.len(), batch_size = self.batch_size))]
    async fn upsert(
        &self,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<usize, AppError> {
        validate_upsert_input(&texts, &metadatas)?;
        if texts.is_empty() {
            return Ok(0);
        }

        let mut total_points = 0usize;
        for (text_batch, metadata_batch) in texts
            .chunks(self.batch_size)
            .zip(metadatas.chunks(self.batch_size))
        {
            let written = self.insert_batch(text_batch, metadata_batch).await?;
            total_points = total_points.saturating_add(written);
            debug!(written, total_points, "chunk batch persisted");
        }

        Ok(total_points)
    }
}
