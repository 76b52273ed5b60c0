use async_trait::async_trait;
use common::error::AppError;

use crate::{
    registry::GenerationSettings, FragmentStream, GenerationProvider, GenerationRequest,
};

use super::openai::OpenAiProvider;

/// Self-hosted model behind an OpenAI-compatible server such as llama.cpp or vLLM.
///
/// Local servers usually ignore the API key, so a placeholder is sent.
#[derive(Clone)]
pub struct LocalProvider {
    inner: OpenAiProvider,
}

impl LocalProvider {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        settings: GenerationSettings,
    ) -> Result<Self, AppError> {
        let inner = OpenAiProvider::compatible("local", "not-needed", base_url, model, settings)?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl GenerationProvider for LocalProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn stream_generate(&self, request: GenerationRequest) -> FragmentStream {
        self.inner.stream_generate(request).await
    }
}
