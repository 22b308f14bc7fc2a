use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

use crate::document::Chunk;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Embedding dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A chunk together with its embedding, as written to the store.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Removes every chunk of the collection.
    async fn reset(&self) -> Result<(), VectorDBError>;

    async fn add(&self, records: Vec<StoredChunk>) -> Result<usize, VectorDBError>;

    async fn count(&self) -> Result<usize, VectorDBError>;

    /// Returns at most `k` hits ordered by descending score.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorDBError>;

    fn describe(&self) -> String;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Sorts by descending score and keeps the best `k`.
pub fn top_k(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(k);
    hits
}

/// All vectors in one batch must share a dimension.
pub fn batch_dimension(records: &[StoredChunk]) -> Result<Option<usize>, VectorDBError> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let expected = first.embedding.len();
    if expected == 0 {
        return Err(VectorDBError::Operation(format!("chunk {} has an empty embedding", first.chunk.id)));
    }
    if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
        return Err(VectorDBError::DimensionMismatch {
            expected,
            actual: bad.embedding.len(),
        });
    }
    Ok(Some(expected))
}
