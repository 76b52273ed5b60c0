use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{
    error::AppError,
    types::{
        document::{METADATA_FILENAME, METADATA_PAGE},
        passage::rank_passages,
        ScoredPassage,
    },
};
use tracing::debug;

use crate::{validate_limit, validate_upsert_input, Metadata, RetrievalStore};

/// Placeholder store that always answers with the same fixed passages.
///
/// Useful for wiring a deployment before an index exists. Upserts are counted
/// and discarded.
pub struct StaticRetrievalStore {
    passages: Vec<ScoredPassage>,
    discarded: AtomicUsize,
}

impl StaticRetrievalStore {
    pub fn new(passages: Vec<ScoredPassage>) -> Self {
        Self {
            passages,
            discarded: AtomicUsize::new(0),
        }
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Default for StaticRetrievalStore {
    fn default() -> Self {
        Self::new(vec![
            placeholder("Document A", 1, "This is a snippet from Document A.", 0.95),
            placeholder("Document B", 2, "This is a snippet from Document B.", 0.90),
        ])
    }
}

fn placeholder(filename: &str, page: u32, content: &str, score: f32) -> ScoredPassage {
    let metadata = Metadata::from([
        (METADATA_FILENAME.to_string(), filename.to_string()),
        (METADATA_PAGE.to_string(), page.to_string()),
    ]);
    ScoredPassage::new(content, metadata, score)
}

#[async_trait]
impl RetrievalStore for StaticRetrievalStore {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredPassage>, AppError> {
        validate_limit(limit)?;
        debug!(query_chars = query.chars().count(), limit, "static retrieval");
        Ok(rank_passages(self.passages.clone(), limit))
    }

    async fn upsert(
        &self,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<usize, AppError> {
        validate_upsert_input(&texts, &metadatas)?;
        let count = texts.len();
        self.discarded.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_returns_sorted_placeholders_within_limit() {
        let store = StaticRetrievalStore::new(vec![
            placeholder("b.txt", 1, "second", 0.4),
            placeholder("a.txt", 1, "first", 0.8),
            placeholder("c.txt", 1, "third", 0.1),
        ]);

        let hits = store.search("question", 2).await.expect("search");

        let contents: Vec<&str> = hits.iter().map(|hit| hit.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
    }

    #[tokio::test]
    async fn upsert_counts_without_storing() {
        let store = StaticRetrievalStore::default();
        let written = store
            .upsert(
                vec!["one".into(), "two".into()],
                vec![Metadata::new(), Metadata::new()],
            )
            .await
            .expect("upsert");

        assert_eq!(written, 2);
        assert_eq!(store.discarded(), 2);
        assert_eq!(store.search("x", 5).await.expect("search").len(), 2);
    }

    #[tokio::test]
    async fn empty_corpus_yields_no_hits() {
        let store = StaticRetrievalStore::new(Vec::new());
        assert!(store.search("x", 3).await.expect("search").is_empty());
    }
}
