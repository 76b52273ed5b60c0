#![allow(clippy::missing_docs_in_private_items)]

pub mod prompt;
pub mod providers;
pub mod registry;

use std::{fmt::Display, pin::Pin};

use async_trait::async_trait;
use common::types::HistoryMessage;
use futures::{stream, Stream};

pub use registry::{build_provider, GenerationSettings, ProviderKind};

/// Ordered text fragments produced by one generation call.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub query: String,
    /// Retrieved snippets in descending score order.
    pub context_docs: Vec<String>,
    pub history: Vec<HistoryMessage>,
}

impl GenerationRequest {
    pub fn new(
        query: impl Into<String>,
        context_docs: Vec<String>,
        history: Vec<HistoryMessage>,
    ) -> Self {
        Self {
            query: query.into(),
            context_docs,
            history,
        }
    }
}

/// Streaming text generation backend.
///
/// `stream_generate` never fails out of band. Any backend failure, before the
/// first fragment or mid-stream, becomes a single diagnostic fragment built by
/// [`diagnostic_fragment`], after which the stream ends.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn stream_generate(&self, request: GenerationRequest) -> FragmentStream;
}

pub fn diagnostic_fragment(provider_name: &str, cause: impl Display) -> String {
    format!("Error generating response ({provider_name}): {cause}")
}

/// A stream holding only the diagnostic fragment for `cause`.
pub fn diagnostic_stream(provider_name: &str, cause: impl Display) -> FragmentStream {
    Box::pin(stream::once(futures::future::ready(diagnostic_fragment(
        provider_name,
        cause,
    ))))
}
