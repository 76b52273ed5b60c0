use std::{str::FromStr, sync::Arc, time::Duration};

use common::{error::AppError, utils::config::AppConfig};
use tracing::info;

use crate::{
    providers::{DummyProvider, GeminiProvider, LocalProvider, OpenAiProvider},
    GenerationProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Local,
    Dummy,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "local" => Ok(Self::Local),
            "dummy" => Ok(Self::Dummy),
            other => Err(AppError::Validation(format!(
                "unknown generation provider '{other}'. Expected 'openai', 'gemini', 'local', or 'dummy'."
            ))),
        }
    }
}

/// Sampling and transport settings shared by the network-backed providers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }
}

fn required_key<'a>(key: Option<&'a str>, setting: &str, provider: &str) -> Result<&'a str, AppError> {
    key.filter(|key| !key.trim().is_empty()).ok_or_else(|| {
        AppError::Validation(format!("{setting} must be set to use the {provider} provider"))
    })
}

/// Resolves the configured generation backend once at start-up.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn GenerationProvider>, AppError> {
    let kind = ProviderKind::from_str(&config.generation_provider)?;
    let settings = GenerationSettings::from_config(config);

    let provider: Arc<dyn GenerationProvider> = match kind {
        ProviderKind::OpenAi => {
            let api_key = required_key(config.openai_api_key.as_deref(), "openai_api_key", "openai")?;
            Arc::new(OpenAiProvider::new(
                api_key,
                &config.openai_base_url,
                config.openai_model.clone(),
                settings,
            )?)
        }
        ProviderKind::Gemini => {
            let api_key = required_key(config.gemini_api_key.as_deref(), "gemini_api_key", "gemini")?;
            Arc::new(GeminiProvider::new(
                api_key,
                &config.gemini_base_url,
                &config.gemini_model,
                settings,
            )?)
        }
        ProviderKind::Local => Arc::new(LocalProvider::new(
            &config.local_llm_base_url,
            config.local_llm_model.clone(),
            settings,
        )?),
        ProviderKind::Dummy => Arc::new(DummyProvider::default()),
    };

    info!(provider = provider.provider_name(), "Generation provider ready");
    Ok(provider)
}
