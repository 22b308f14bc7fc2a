use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rusqlite::Connection;

use super::vector_db::{
    batch_dimension, cosine_similarity, top_k, SearchHit, StoredChunk, VectorDBError, VectorStore,
};
use crate::document::{Chunk, ChunkMetadata};

pub const STORE_FILE: &str = "store.sqlite3";

/// Vector store persisted as a SQLite file inside a directory. Search is an
/// exact cosine scan over the collection.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Connection>,
    collection: String,
    dir: PathBuf,
}

struct RawRow {
    id: String,
    content: String,
    source: String,
    page: i64,
    chunk_index: i64,
    ingested_at: String,
    embedding: String,
}

impl LocalStore {
    pub async fn open<P: AsRef<Path>>(dir: P, collection: &str) -> Result<Self, VectorDBError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        let conn = Connection::open(dir.join(STORE_FILE))
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;

        let store = Self {
            conn: Arc::new(conn),
            collection: collection.to_string(),
            dir,
        };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), VectorDBError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS chunks (
                        id TEXT PRIMARY KEY,
                        collection TEXT NOT NULL,
                        content TEXT NOT NULL,
                        source TEXT NOT NULL,
                        page INTEGER NOT NULL,
                        chunk_index INTEGER NOT NULL,
                        ingested_at TEXT NOT NULL,
                        embedding TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS chunks_collection_idx ON chunks (collection);",
                )?;
                Ok(())
            })
            .await?;

        log::info!("Local vector store ready at {}", self.dir.display());
        Ok(())
    }

    /// Dimension of the vectors already stored, if any.
    async fn stored_dimension(&self) -> Result<Option<usize>, VectorDBError> {
        let collection = self.collection.clone();
        let embedding = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT embedding FROM chunks WHERE collection = ?1 LIMIT 1")?;
                let mut rows = stmt.query([&collection])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(row.get::<_, String>(0)?))
                } else {
                    Ok(None)
                }
            })
            .await?;

        match embedding {
            Some(raw) => Ok(Some(serde_json::from_str::<Vec<f32>>(&raw)?.len())),
            None => Ok(None),
        }
    }

    async fn load_rows(&self) -> Result<Vec<RawRow>, VectorDBError> {
        let collection = self.collection.clone();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, source, page, chunk_index, ingested_at, embedding
                     FROM chunks
                     WHERE collection = ?1
                     ORDER BY chunk_index",
                )?;

                let rows = stmt.query_map([&collection], |row| {
                    Ok(RawRow {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        source: row.get(2)?,
                        page: row.get(3)?,
                        chunk_index: row.get(4)?,
                        ingested_at: row.get(5)?,
                        embedding: row.get(6)?,
                    })
                })?;

                let mut loaded = Vec::new();
                for row in rows {
                    loaded.push(row?);
                }
                Ok(loaded)
            })
            .await?;
        Ok(rows)
    }
}

impl RawRow {
    fn into_parts(self) -> Result<(Chunk, Vec<f32>), VectorDBError> {
        let embedding: Vec<f32> = serde_json::from_str(&self.embedding)?;
        let ingested_at = DateTime::parse_from_rfc3339(&self.ingested_at)
            .map_err(|e| VectorDBError::Operation(format!("bad timestamp on {}: {}", self.id, e)))?
            .with_timezone(&Utc);
        let chunk = Chunk {
            id: self.id,
            content: self.content,
            metadata: ChunkMetadata {
                source: self.source,
                page: u32::try_from(self.page).unwrap_or_default(),
                chunk_index: usize::try_from(self.chunk_index).unwrap_or_default(),
                ingested_at,
            },
        };
        Ok((chunk, embedding))
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn reset(&self) -> Result<(), VectorDBError> {
        let collection = self.collection.clone();
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM chunks WHERE collection = ?1", [&collection])?))
            .await?;
        log::info!("Cleared {} chunks from collection {}", removed, self.collection);
        Ok(())
    }

    async fn add(&self, records: Vec<StoredChunk>) -> Result<usize, VectorDBError> {
        let Some(dimension) = batch_dimension(&records)? else {
            return Ok(0);
        };
        if let Some(expected) = self.stored_dimension().await? {
            if expected != dimension {
                return Err(VectorDBError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let meta = record.chunk.metadata;
            rows.push([
                record.chunk.id,
                self.collection.clone(),
                record.chunk.content,
                meta.source,
                meta.page.to_string(),
                meta.chunk_index.to_string(),
                meta.ingested_at.to_rfc3339(),
                serde_json::to_string(&record.embedding)?,
            ]);
        }

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR REPLACE INTO chunks
                         (id, collection, content, source, page, chunk_index, ingested_at, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )?;
                    for row in &rows {
                        stmt.execute([
                            &row[0], &row[1], &row[2], &row[3], &row[4], &row[5], &row[6], &row[7],
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        Ok(inserted)
    }

    async fn count(&self) -> Result<usize, VectorDBError> {
        let collection = self.collection.clone();
        let count = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                    [&collection],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorDBError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for row in self.load_rows().await? {
            let (chunk, embedding) = row.into_parts()?;
            if embedding.len() != query.len() {
                return Err(VectorDBError::DimensionMismatch {
                    expected: embedding.len(),
                    actual: query.len(),
                });
            }
            let score = cosine_similarity(query, &embedding);
            hits.push(SearchHit { chunk, score });
        }
        Ok(top_k(hits, k))
    }

    fn describe(&self) -> String {
        format!("local store {} (collection {})", self.dir.display(), self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, index: usize, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                content: format!("content of {}", id),
                metadata: ChunkMetadata {
                    source: "paper.pdf".to_string(),
                    page: 2,
                    chunk_index: index,
                    ingested_at: Utc::now(),
                },
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn search_returns_closest_chunks_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "paper").await.unwrap();
        store
            .add(vec![
                record("x-axis", 0, vec![1.0, 0.0, 0.0]),
                record("y-axis", 1, vec![0.0, 1.0, 0.0]),
                record("diagonal", 2, vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.similarity_search(&[1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "x-axis");
        assert_eq!(hits[1].chunk.id, "diagonal");
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].chunk.metadata.page, 2);
    }

    #[tokio::test]
    async fn data_survives_reopening_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path(), "paper").await.unwrap();
            store.add(vec![record("a", 0, vec![1.0, 2.0])]).await.unwrap();
        }
        assert!(dir.path().join(STORE_FILE).exists());

        let reopened = LocalStore::open(dir.path(), "paper").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let hits = reopened.similarity_search(&[1.0, 2.0], 5).await.unwrap();
        assert_eq!(hits[0].chunk.content, "content of a");
    }

    #[tokio::test]
    async fn reset_only_touches_its_collection() {
        let dir = tempfile::tempdir().unwrap();
        let paper = LocalStore::open(dir.path(), "paper").await.unwrap();
        let other = LocalStore::open(dir.path(), "other").await.unwrap();
        paper.add(vec![record("p", 0, vec![1.0])]).await.unwrap();
        other.add(vec![record("o", 0, vec![1.0])]).await.unwrap();

        paper.reset().await.unwrap();
        assert_eq!(paper.count().await.unwrap(), 0);
        assert_eq!(other.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_vectors_of_another_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "paper").await.unwrap();
        store.add(vec![record("a", 0, vec![1.0, 0.0])]).await.unwrap();

        let err = store.add(vec![record("b", 1, vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, VectorDBError::DimensionMismatch { expected: 2, actual: 3 }));

        let err = store.similarity_search(&[1.0], 3).await.unwrap_err();
        assert!(matches!(err, VectorDBError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn empty_store_yields_no_hits() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "paper").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.similarity_search(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(store.add(Vec::new()).await.unwrap(), 0);
    }
}
