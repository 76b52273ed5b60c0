pub mod chat;
pub mod document;
pub mod passage;

pub use chat::{ChatRequest, ChatResponseChunk, HistoryMessage, MessageRole, SourceDocument};
pub use document::{DocumentChunk, UploadRequest, UploadResponse, UploadStatus};
pub use passage::ScoredPassage;
