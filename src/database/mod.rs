pub mod local_store;
pub mod qdrant_config;
pub mod qdrant_store;
pub mod vector_db;

use std::sync::Arc;

use crate::config::{RagConfig, StoreKind};
pub use local_store::LocalStore;
pub use qdrant_store::QdrantStore;
pub use vector_db::{SearchHit, StoredChunk, VectorDBError, VectorStore};

pub async fn open_store(config: &RagConfig) -> Result<Arc<dyn VectorStore>, VectorDBError> {
    let store: Arc<dyn VectorStore> = match config.store {
        StoreKind::Local => Arc::new(LocalStore::open(&config.persist_dir, &config.collection).await?),
        StoreKind::Qdrant => Arc::new(QdrantStore::connect(&config.qdrant_url, &config.collection).await?),
    };
    log::info!("Using {}", store.describe());
    Ok(store)
}
