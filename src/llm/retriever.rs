use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::database::{SearchHit, VectorStore};
use crate::providers::EmbeddingProvider;

use super::rag::RagError;

const QUERY_CACHE_SIZE: usize = 256;

/// Embeds a question and returns the `k` most similar chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    k: usize,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>, k: usize) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            embedder,
            store,
            k: k.max(1),
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cached_embedding(&self, query: &str) -> Option<Vec<f32>> {
        self.query_cache.lock().ok()?.get(query).cloned()
    }

    fn cache_embedding(&self, query: &str, embedding: Vec<f32>) {
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), embedding);
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let query = query.trim();
        if let Some(embedding) = self.cached_embedding(query) {
            log::debug!("Query embedding cache hit");
            return Ok(embedding);
        }
        let embedding = self.embedder.embed_query(query).await?;
        self.cache_embedding(query, embedding.clone());
        Ok(embedding)
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, RagError> {
        let embedding = self.embed_query(query).await?;
        let hits = self.store.similarity_search(&embedding, self.k).await?;
        log::info!(
            "Retrieved {} chunks (best score {:.3})",
            hits.len(),
            hits.first().map(|h| h.score).unwrap_or_default()
        );
        Ok(hits)
    }
}
