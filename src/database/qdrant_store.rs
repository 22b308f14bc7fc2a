use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config::Config,
        with_payload_selector::SelectorOptions, CollectionExistsRequest, CountPoints,
        CreateCollection, DeleteCollection, Distance, PointId, PointStruct, SearchPoints,
        UpsertPoints, Value, VectorParams, VectorsConfig, WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::qdrant_config::create_qdrant_client;
use super::vector_db::{batch_dimension, SearchHit, StoredChunk, VectorDBError, VectorStore};
use crate::document::{Chunk, ChunkMetadata};

const UPSERT_BATCH: usize = 64;

/// Vector store backed by a Qdrant server.
#[derive(Clone)]
pub struct QdrantStore {
    client: Arc<Qdrant>,
    url: String,
    collection: String,
}

impl QdrantStore {
    pub async fn connect(url: &str, collection: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url).await?;
        Ok(Self {
            client: Arc::new(client),
            url: url.to_string(),
            collection: collection.to_string(),
        })
    }

    async fn exists(&self) -> Result<bool, VectorDBError> {
        self.client
            .collection_exists(CollectionExistsRequest {
                collection_name: self.collection.clone(),
            })
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))
    }

    async fn ensure_collection(&self, vector_size: u64) -> Result<(), VectorDBError> {
        if self.exists().await? {
            return Ok(());
        }
        let params = VectorParams {
            size: vector_size,
            distance: Distance::Cosine.into(),
            ..Default::default()
        };
        let create_collection = CreateCollection {
            collection_name: self.collection.clone(),
            vectors_config: Some(VectorsConfig {
                config: Some(Config::Params(params)),
            }),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => {
                log::info!("Created Qdrant collection {} ({} dims)", self.collection, vector_size);
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                log::info!("Collection {} already exists, skipping creation", self.collection);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }
}

fn to_point(record: StoredChunk) -> PointStruct {
    let StoredChunk { chunk, embedding } = record;
    let mut payload = HashMap::new();
    payload.insert("content".to_string(), Value::from(chunk.content));
    payload.insert("source".to_string(), Value::from(chunk.metadata.source));
    payload.insert("page".to_string(), Value::from(chunk.metadata.page as i64));
    payload.insert("chunk_index".to_string(), Value::from(chunk.metadata.chunk_index as i64));
    payload.insert("ingested_at".to_string(), Value::from(chunk.metadata.ingested_at.to_rfc3339()));

    PointStruct {
        id: Some(PointId {
            point_id_options: Some(PointIdOptions::Uuid(chunk.id)),
        }),
        vectors: Some(embedding.into()),
        payload,
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(n) => Some(*n),
        Kind::DoubleValue(n) => Some(*n as i64),
        _ => None,
    }
}

/// Rebuilds a chunk from a point payload; points missing content are skipped.
fn chunk_from_payload(id: String, payload: &HashMap<String, Value>) -> Option<Chunk> {
    let content = payload_str(payload, "content")?;
    let ingested_at = payload_str(payload, "ingested_at")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Chunk {
        id,
        content,
        metadata: ChunkMetadata {
            source: payload_str(payload, "source").unwrap_or_default(),
            page: payload_int(payload, "page").and_then(|p| u32::try_from(p).ok()).unwrap_or_default(),
            chunk_index: payload_int(payload, "chunk_index")
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or_default(),
            ingested_at,
        },
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn reset(&self) -> Result<(), VectorDBError> {
        if !self.exists().await? {
            return Ok(());
        }
        self.client
            .delete_collection(DeleteCollection {
                collection_name: self.collection.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        log::info!("Dropped Qdrant collection {}", self.collection);
        Ok(())
    }

    async fn add(&self, records: Vec<StoredChunk>) -> Result<usize, VectorDBError> {
        let Some(dimension) = batch_dimension(&records)? else {
            return Ok(0);
        };
        self.ensure_collection(dimension as u64).await?;

        let total = records.len();
        let mut points: Vec<PointStruct> = records.into_iter().map(to_point).collect();
        while !points.is_empty() {
            let rest = points.split_off(points.len().min(UPSERT_BATCH));
            let upsert_points = UpsertPoints {
                collection_name: self.collection.clone(),
                wait: Some(true),
                points,
                ..Default::default()
            };
            self.client
                .upsert_points(upsert_points)
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
            points = rest;
        }
        Ok(total)
    }

    async fn count(&self) -> Result<usize, VectorDBError> {
        if !self.exists().await? {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPoints {
                collection_name: self.collection.clone(),
                exact: Some(true),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorDBError> {
        if k == 0 || !self.exists().await? {
            return Ok(Vec::new());
        }
        let request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query.to_vec(),
            limit: k as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .filter_map(|point| {
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(uuid)) => uuid,
                    Some(PointIdOptions::Num(num)) => num.to_string(),
                    None => String::new(),
                };
                let chunk = chunk_from_payload(id, &point.payload)?;
                Some(SearchHit {
                    chunk,
                    score: point.score,
                })
            })
            .collect();
        Ok(hits)
    }

    fn describe(&self) -> String {
        format!("Qdrant {} (collection {})", self.url, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: "5f1d7a9e-2b52-4c8b-9d63-0f1e2a3b4c5d".to_string(),
            content: "Performance is highest when relevant information is at the start.".to_string(),
            metadata: ChunkMetadata {
                source: "leavenocontext.pdf".to_string(),
                page: 3,
                chunk_index: 11,
                ingested_at: Utc::now(),
            },
        }
    }

    #[test]
    fn payload_round_trips_chunk_metadata() {
        let chunk = sample_chunk();
        let point = to_point(StoredChunk {
            chunk: chunk.clone(),
            embedding: vec![0.1, 0.2],
        });

        let rebuilt = chunk_from_payload(chunk.id.clone(), &point.payload).unwrap();
        assert_eq!(rebuilt.content, chunk.content);
        assert_eq!(rebuilt.metadata.page, 3);
        assert_eq!(rebuilt.metadata.chunk_index, 11);
        assert_eq!(rebuilt.metadata.source, "leavenocontext.pdf");
    }

    #[test]
    fn payload_without_content_is_skipped() {
        let mut payload = HashMap::new();
        payload.insert("source".to_string(), Value::from("paper.pdf".to_string()));
        assert!(chunk_from_payload("id".to_string(), &payload).is_none());
    }
}
