use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const METADATA_FILENAME: &str = "filename";
pub const METADATA_PAGE: &str = "page";
pub const METADATA_CHUNK_INDEX: &str = "chunk_index";

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub file_content: Bytes,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, file_content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            file_content: file_content.into(),
        }
    }
}

/// A bounded span of a document's text, ready to be embedded and indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    pub fn new(text: String, filename: &str, page: u32, chunk_index: usize) -> Self {
        let metadata = BTreeMap::from([
            (METADATA_FILENAME.to_string(), filename.to_string()),
            (METADATA_PAGE.to_string(), page.to_string()),
            (METADATA_CHUNK_INDEX.to_string(), chunk_index.to_string()),
        ]);
        Self { text, metadata }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_count: Option<usize>,
}

impl UploadResponse {
    pub fn success(chunks_count: usize) -> Self {
        Self {
            status: UploadStatus::Success,
            message: None,
            chunks_count: Some(chunks_count),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: UploadStatus::Error,
            message: Some(message.into()),
            chunks_count: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Success
    }
}
