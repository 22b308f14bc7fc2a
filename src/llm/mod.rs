pub mod ingest;
pub mod prompt;
pub mod rag;
pub mod retriever;

pub use ingest::{ensure_index, ingest_document, ingest_pages, IngestOptions, IngestReport};
pub use prompt::{format_docs, ChatTemplate};
pub use rag::{Answer, RagChain, RagError, SourceRef};
pub use retriever::Retriever;
