pub mod gemini;
pub mod openai;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use crate::config::{ProviderKind, RagConfig};
use gemini::{GeminiProvider, GeminiSettings};
use openai::{OpenAIProvider, OpenAISettings};
pub use traits::{ChatMessage, ChatProvider, EmbeddingProvider, ProviderError, Role};

/// Chat and embedding backends selected by the configuration.
#[derive(Clone)]
pub struct Providers {
    pub chat: Arc<dyn ChatProvider>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
}

impl Providers {
    pub fn from_config(config: &RagConfig, api_key: String) -> Result<Self, ProviderError> {
        match config.provider {
            ProviderKind::Gemini => {
                let provider = Arc::new(GeminiProvider::new(GeminiSettings {
                    api_key,
                    api_base: config.api_base(),
                    chat_model: config.chat_model(),
                    embedding_model: config.embedding_model(),
                    temperature: config.temperature,
                    timeout: config.request_timeout(),
                    max_retries: config.max_retries,
                })?);
                Ok(Self {
                    chat: provider.clone(),
                    embeddings: provider,
                })
            }
            ProviderKind::Openai => {
                let provider = Arc::new(OpenAIProvider::new(OpenAISettings {
                    api_key,
                    api_base: config.api_base(),
                    chat_model: config.chat_model(),
                    embedding_model: config.embedding_model(),
                    temperature: config.temperature,
                    timeout: config.request_timeout(),
                    max_retries: config.max_retries,
                })?);
                Ok(Self {
                    chat: provider.clone(),
                    embeddings: provider,
                })
            }
        }
    }
}
