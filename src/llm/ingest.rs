use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::database::{StoredChunk, VectorStore};
use crate::document::{DocumentError, Page, PdfLoader, TextSplitter};
use crate::providers::{EmbeddingProvider, ProviderError};

use super::rag::RagError;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    pub dimensions: usize,
    pub elapsed: Duration,
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Splits pages into chunks, embeds them and replaces the store's contents.
pub async fn ingest_pages(
    pages: &[Page],
    source: &str,
    splitter: &TextSplitter,
    embedder: &Arc<dyn EmbeddingProvider>,
    store: &Arc<dyn VectorStore>,
    options: &IngestOptions,
) -> Result<IngestReport, RagError> {
    let started = Instant::now();
    let chunks = splitter.split_pages(pages, source);
    if chunks.is_empty() {
        return Err(DocumentError::Empty(source.to_string()).into());
    }
    log::info!("Split {} pages of {} into {} chunks", pages.len(), source, chunks.len());

    // Embed everything before touching the store so a failed run keeps the old index
    let batch_size = options.batch_size.max(1);
    let pb = progress_bar(chunks.len(), options.show_progress);
    pb.set_message(format!("embedding with {}", embedder.model_name()));

    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            ))
            .into());
        }
        records.extend(
            batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| StoredChunk { chunk, embedding }),
        );
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("embedded");

    let dimensions = records.first().map(|r| r.embedding.len()).unwrap_or_default();

    store.reset().await?;
    let stored = store.add(records).await?;

    let report = IngestReport {
        pages: pages.len(),
        chunks: stored,
        dimensions,
        elapsed: started.elapsed(),
    };
    log::info!(
        "Indexed {} chunks ({} dims) into {} in {:.1}s",
        report.chunks,
        report.dimensions,
        store.describe(),
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

pub async fn ingest_document(
    loader: &PdfLoader,
    splitter: &TextSplitter,
    embedder: &Arc<dyn EmbeddingProvider>,
    store: &Arc<dyn VectorStore>,
    options: &IngestOptions,
) -> Result<IngestReport, RagError> {
    let pages = loader.load().await?;
    let source = loader
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| loader.path().display().to_string());
    ingest_pages(&pages, &source, splitter, embedder, store, options).await
}

/// Reuses a populated index when asked to, otherwise rebuilds it from the PDF.
/// Returns `None` when the existing index was kept.
pub async fn ensure_index(
    loader: &PdfLoader,
    splitter: &TextSplitter,
    embedder: &Arc<dyn EmbeddingProvider>,
    store: &Arc<dyn VectorStore>,
    options: &IngestOptions,
    reuse: bool,
) -> Result<Option<IngestReport>, RagError> {
    if reuse {
        let existing = store.count().await?;
        if existing > 0 {
            log::info!("Reusing {} indexed chunks in {}", existing, store.describe());
            return Ok(None);
        }
        log::warn!("Index is empty, ingesting {}", loader.path().display());
    }
    ingest_document(loader, splitter, embedder, store, options)
        .await
        .map(Some)
}
