//! In-memory providers for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::traits::{ChatMessage, ChatProvider, EmbeddingProvider, ProviderError};

const DIMENSIONS: usize = 64;

/// Hashes lowercase words into a fixed-size bag-of-words vector.
#[derive(Default)]
pub struct FakeEmbedder {
    pub document_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let word = word.to_lowercase();
            let bucket = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embed(text))
    }

    fn model_name(&self) -> &str {
        "fake-embedding"
    }
}

/// Returns a canned reply (or error) and records the last prompt.
pub struct FakeChat {
    reply: Result<String, String>,
    pub last_messages: Mutex<Vec<ChatMessage>>,
    pub calls: AtomicUsize,
}

impl FakeChat {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            last_messages: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            last_messages: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }
        self.reply
            .clone()
            .map_err(|body| ProviderError::Api { status: 503, body })
    }

    fn model_name(&self) -> &str {
        "fake-chat"
    }
}
