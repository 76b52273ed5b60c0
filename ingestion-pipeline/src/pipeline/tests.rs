use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    types::{
        document::{METADATA_CHUNK_INDEX, METADATA_FILENAME},
        ScoredPassage, UploadRequest, UploadStatus,
    },
};
use retrieval_pipeline::{Metadata, RetrievalStore};
use tokio::sync::Mutex;

use super::{upload_response, IngestionConfig, IngestionPipeline, INDEXING_FAILURE_MESSAGE};
use crate::chunker::ChunkerConfig;

struct MockStore {
    fail_upsert: bool,
    upserts: Mutex<Vec<(Vec<String>, Vec<Metadata>)>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockStore {
    fn new() -> Self {
        Self {
            fail_upsert: false,
            upserts: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail_upsert: true,
            ..Self::new()
        }
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl RetrievalStore for MockStore {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<ScoredPassage>, AppError> {
        self.record("search").await;
        Ok(Vec::new())
    }

    async fn upsert(
        &self,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<usize, AppError> {
        self.record("upsert").await;
        if self.fail_upsert {
            return Err(AppError::InternalError("vector store unavailable".into()));
        }
        let written = texts.len();
        self.upserts.lock().await.push((texts, metadatas));
        Ok(written)
    }
}

fn config(max_chars: usize) -> IngestionConfig {
    IngestionConfig {
        max_upload_bytes: 4_096,
        allowed_extensions: vec![".txt".into(), ".md".into(), ".pdf".into()],
        chunker: ChunkerConfig {
            max_chars,
            overlap_chars: 0,
        },
    }
}

fn pipeline_with(store: &Arc<MockStore>, config: IngestionConfig) -> IngestionPipeline {
    let shared: Arc<MockStore> = Arc::clone(store);
    IngestionPipeline::new(config, shared).expect("pipeline")
}

#[tokio::test]
async fn unsupported_extension_never_reaches_the_store() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(200));

    let response = pipeline
        .upload_document(UploadRequest::new("virus.exe", b"binary data".to_vec()))
        .await;

    assert_eq!(response.status, UploadStatus::Error);
    assert_eq!(response.message.as_deref(), Some(".exe is not supported"));
    assert!(response.chunks_count.is_none());
    assert!(store.calls.lock().await.is_empty());
}

#[tokio::test]
async fn missing_extension_is_reported_as_none() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(200));

    let response = pipeline
        .upload_document(UploadRequest::new("Makefile", b"all: build".to_vec()))
        .await;

    assert_eq!(response.message.as_deref(), Some("(none) is not supported"));
    assert!(store.calls.lock().await.is_empty());
}

#[tokio::test]
async fn text_upload_is_chunked_and_upserted_once() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(200));

    let response = pipeline
        .upload_document(UploadRequest::new("notes.txt", "x".repeat(1200)))
        .await;

    assert!(response.is_success());
    assert_eq!(response.chunks_count, Some(6));
    assert_eq!(*store.calls.lock().await, ["upsert"]);

    let upserts = store.upserts.lock().await;
    let (texts, metadatas) = upserts.first().expect("one upsert call");
    assert_eq!(texts.len(), 6);
    assert_eq!(metadatas.len(), 6);
    assert!(metadatas
        .iter()
        .all(|metadata| metadata[METADATA_FILENAME] == "notes.txt"));
    assert_eq!(metadatas[5][METADATA_CHUNK_INDEX], "5");
}

#[tokio::test]
async fn size_is_checked_before_extension() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(200));

    let response = pipeline
        .upload_document(UploadRequest::new("huge.exe", vec![b'a'; 4_097]))
        .await;

    assert_eq!(response.status, UploadStatus::Error);
    assert_eq!(
        response.message.as_deref(),
        Some("File size exceeds the maximum allowed size of 4096 bytes")
    );
    assert!(store.calls.lock().await.is_empty());
}

#[tokio::test]
async fn file_at_the_size_limit_is_accepted() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(1_000));

    let response = pipeline
        .upload_document(UploadRequest::new("limit.txt", vec![b'a'; 4_096]))
        .await;

    assert!(response.is_success());
    assert_eq!(response.chunks_count, Some(5));
}

#[tokio::test]
async fn empty_document_is_rejected_before_upsert() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(200));

    let response = pipeline
        .upload_document(UploadRequest::new("blank.md", "  \n\n  "))
        .await;

    assert_eq!(response.status, UploadStatus::Error);
    assert!(response.message.is_some());
    assert!(store.calls.lock().await.is_empty());
}

#[tokio::test]
async fn store_failure_is_reported_generically() {
    let store = Arc::new(MockStore::failing());
    let pipeline = pipeline_with(&store, config(200));

    let outcome = pipeline
        .ingest(UploadRequest::new("notes.txt", "some content worth indexing"))
        .await;

    assert!(matches!(outcome, Err(AppError::Processing(_))));
    let response = upload_response(&outcome);
    assert_eq!(response.status, UploadStatus::Error);
    assert_eq!(response.message.as_deref(), Some(INDEXING_FAILURE_MESSAGE));
    assert_eq!(*store.calls.lock().await, ["upsert"]);
}

#[tokio::test]
async fn uppercase_extension_matches_allow_list() {
    let store = Arc::new(MockStore::new());
    let pipeline = pipeline_with(&store, config(200));

    let response = pipeline
        .upload_document(UploadRequest::new("README.MD", "# Heading\n\nBody text."))
        .await;

    assert!(response.is_success());
}

#[test]
fn invalid_chunk_settings_fail_construction() {
    let store: Arc<dyn RetrievalStore> = Arc::new(MockStore::new());
    let mut bad = config(100);
    bad.chunker.overlap_chars = 100;

    assert!(matches!(
        IngestionPipeline::new(bad, store),
        Err(AppError::Validation(_))
    ));
}
