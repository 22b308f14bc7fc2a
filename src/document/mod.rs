pub mod loader;
pub mod splitter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use loader::PdfLoader;
pub use splitter::TextSplitter;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    #[error("Document {0} contains no extractable text")]
    Empty(String),
}

/// One page of extracted text, numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
    pub chunk_index: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} p.{} #{} ({} chars)",
            self.metadata.source,
            self.metadata.page,
            self.metadata.chunk_index,
            self.content.chars().count()
        )
    }
}
