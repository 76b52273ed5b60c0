use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::config::AppConfig;

const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingBackend {
    OpenAI,
    FastEmbed,
    #[default]
    Hashed,
}

impl EmbeddingBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::FastEmbed => "fastembed",
            Self::Hashed => "hashed",
        }
    }
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            "fastembed" | "fast-embed" => Ok(Self::FastEmbed),
            other => bail!("unknown embedding backend '{other}', expected openai, fastembed or hashed"),
        }
    }
}

/// Turns chunk text and queries into vectors for the SurrealDB store.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Hashed(HashedEmbedder),
    FastEmbed(FastEmbedder),
    OpenAI(OpenAiEmbedder),
}

/// Bag-of-words feature hashing. Needs no model and is fully deterministic.
#[derive(Clone, Copy)]
struct HashedEmbedder {
    dimension: usize,
}

#[derive(Clone)]
struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

#[derive(Clone)]
struct OpenAiEmbedder {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    dimensions: u32,
}

impl EmbeddingProvider {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        match EmbeddingBackend::from_str(&config.embedding_backend)? {
            EmbeddingBackend::Hashed => Self::new_hashed(config.embedding_dimensions),
            EmbeddingBackend::FastEmbed => Self::new_fastembed(config.embedding_model.as_deref()).await,
            EmbeddingBackend::OpenAI => {
                let api_key = config
                    .openai_api_key
                    .as_deref()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| anyhow!("openai_api_key is required for openai embeddings"))?;
                let client = Client::with_config(
                    OpenAIConfig::new()
                        .with_api_key(api_key)
                        .with_api_base(&config.openai_base_url),
                );
                let dimensions = u32::try_from(config.embedding_dimensions)
                    .context("embedding_dimensions does not fit in u32")?;
                let model = config
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string());
                Self::new_openai(Arc::new(client), model, dimensions)
            }
        }
    }

    pub fn new_hashed(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            bail!("hashed embeddings need at least one dimension");
        }
        Ok(Self {
            backend: Backend::Hashed(HashedEmbedder { dimension }),
        })
    }

    pub fn new_openai(
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            bail!("openai embedding model name is empty");
        }
        Ok(Self {
            backend: Backend::OpenAI(OpenAiEmbedder {
                client,
                model,
                dimensions,
            }),
        })
    }

    /// Loads a FastEmbed model, downloading it on first use.
    pub async fn new_fastembed(model_code: Option<&str>) -> Result<Self> {
        let model_name = match model_code {
            Some(code) => EmbeddingModel::from_str(code).map_err(|err| anyhow!(err))?,
            None => EmbeddingModel::default(),
        };
        let label = model_name.to_string();

        let (model, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
            let dimension = EmbeddingModel::get_model_info(&model_name)
                .map(|info| info.dim)
                .ok_or_else(|| anyhow!("no FastEmbed metadata for model {model_name}"))?;
            let model = TextEmbedding::try_new(
                TextInitOptions::new(model_name).with_show_download_progress(true),
            )
            .context("loading FastEmbed model")?;
            Ok((model, dimension))
        })
        .await
        .context("FastEmbed loader task failed")??;

        info!(model = %label, dimension, "FastEmbed model loaded");
        Ok(Self {
            backend: Backend::FastEmbed(FastEmbedder {
                model: Arc::new(Mutex::new(model)),
                dimension,
            }),
        })
    }

    pub fn backend(&self) -> EmbeddingBackend {
        match self.backend {
            Backend::Hashed(_) => EmbeddingBackend::Hashed,
            Backend::FastEmbed(_) => EmbeddingBackend::FastEmbed,
            Backend::OpenAI(_) => EmbeddingBackend::OpenAI,
        }
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend().as_str()
    }

    pub fn dimension(&self) -> usize {
        match &self.backend {
            Backend::Hashed(HashedEmbedder { dimension })
            | Backend::FastEmbed(FastEmbedder { dimension, .. }) => *dimension,
            Backend::OpenAI(embedder) => embedder.dimensions as usize,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_owned()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no vector"))
    }

    /// Embeds `texts`, returning exactly one vector per input in input order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let vectors = match &self.backend {
            Backend::Hashed(embedder) => texts.iter().map(|text| embedder.embed(text)).collect(),
            Backend::FastEmbed(embedder) => embedder
                .model
                .lock()
                .await
                .embed(texts, None)
                .context("FastEmbed inference failed")?,
            Backend::OpenAI(embedder) => embedder.embed(texts).await?,
        };

        if vectors.len() != expected {
            bail!(
                "{} backend returned {} vectors for {expected} inputs",
                self.backend_label(),
                vectors.len()
            );
        }
        Ok(vectors)
    }
}

impl OpenAiEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.as_str())
            .input(texts)
            .dimensions(self.dimensions)
            .build()?;

        let mut data = self.client.embeddings().create(request).await?.data;
        data.sort_by_key(|item| item.index);
        debug!(count = data.len(), model = %self.model, "openai embeddings created");

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

impl HashedEmbedder {
    fn embed(self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in words(text) {
            let (slot, sign) = self.feature(&token);
            if let Some(value) = vector.get_mut(slot) {
                *value += sign;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    /// Bucket index plus a sign bit taken from the same hash.
    fn feature(self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let dimension = u64::try_from(self.dimension).unwrap_or(u64::MAX);
        let slot = usize::try_from(hash % dimension).unwrap_or_default();
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        (slot, sign)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}
