#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunker;
pub mod pipeline;

pub use chunker::{Chunker, ChunkerConfig};
pub use pipeline::{upload_response, IngestionConfig, IngestionPipeline};
