use std::path::{Path, PathBuf};

use super::{DocumentError, Page};

/// Reads a PDF from disk and returns its non-empty pages.
#[derive(Debug, Clone)]
pub struct PdfLoader {
    path: PathBuf,
}

impl PdfLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Page>, DocumentError> {
        let bytes = tokio::fs::read(&self.path).await?;
        log::info!("Loaded {} ({} bytes)", self.path.display(), bytes.len());

        // pdf-extract is synchronous and CPU bound
        let raw_pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| DocumentError::Pdf(format!("extraction task failed: {}", e)))?
        .map_err(|e| DocumentError::Pdf(e.to_string()))?;

        let pages = collect_pages(raw_pages);
        if pages.is_empty() {
            return Err(DocumentError::Empty(self.path.display().to_string()));
        }
        log::info!("Extracted text from {} pages", pages.len());
        Ok(pages)
    }
}

/// Numbers raw page texts from 1 and drops pages without any text.
pub fn collect_pages(raw_pages: Vec<String>) -> Vec<Page> {
    raw_pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(idx, text)| Page {
            number: idx as u32 + 1,
            text,
        })
        .collect()
}
