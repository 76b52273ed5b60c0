use common::utils::config::AppConfig;

use crate::chunker::ChunkerConfig;

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub max_upload_bytes: usize,
    /// Lower-cased extensions with a leading dot, e.g. `".pdf"`.
    pub allowed_extensions: Vec<String>,
    pub chunker: ChunkerConfig,
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .filter(|ext| ext.len() > 1)
                .collect(),
            chunker: ChunkerConfig {
                max_chars: config.max_chunk_chars,
                overlap_chars: config.chunk_overlap_chars,
            },
        }
    }

    /// Rejection message for uploads larger than `max_upload_bytes`.
    pub fn size_limit_message(&self) -> String {
        format!(
            "File size exceeds the maximum allowed size of {} bytes",
            self.max_upload_bytes
        )
    }

    pub fn allows(&self, extension: &str) -> bool {
        self.allowed_extensions.iter().any(|allowed| allowed == extension)
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

fn normalize_extension(raw: &str) -> String {
    let ext = raw.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}
