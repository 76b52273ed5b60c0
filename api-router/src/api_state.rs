use std::sync::Arc;

use chat_pipeline::{ChatConfig, ChatOrchestrator};
use common::{error::AppError, utils::config::AppConfig};
use generation::GenerationProvider;
use ingestion_pipeline::{IngestionConfig, IngestionPipeline};
use retrieval_pipeline::RetrievalStore;

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub store: Arc<dyn RetrievalStore>,
    pub orchestrator: ChatOrchestrator,
    pub ingestion: Arc<IngestionPipeline>,
}

impl ApiState {
    /// Wires the chat orchestrator and ingestion pipeline around shared backends.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn RetrievalStore>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Result<Self, AppError> {
        let orchestrator = ChatOrchestrator::new(
            Arc::clone(&store),
            provider,
            ChatConfig::from_app_config(config),
        );
        let ingestion = IngestionPipeline::new(
            IngestionConfig::from_app_config(config),
            Arc::clone(&store),
        )?;

        Ok(Self {
            config: config.clone(),
            store,
            orchestrator,
            ingestion: Arc::new(ingestion),
        })
    }
}
