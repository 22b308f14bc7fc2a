use qdrant_client::{config::QdrantConfig, Qdrant};
use std::time::Duration;

use super::vector_db::VectorDBError;

/// Normalises a Qdrant URL to the gRPC endpoint the client speaks.
pub fn grpc_url(url: &str) -> String {
    let without_scheme = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url,
    };
    let host = without_scheme.trim_end_matches('/');

    // 6333 is the REST port; the client needs gRPC on 6334
    let host = match host.strip_suffix(":6333") {
        Some(base) => format!("{}:6334", base),
        None => host.to_string(),
    };
    format!("http://{}", host)
}

pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, VectorDBError> {
    let url_with_scheme = grpc_url(url);
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(10);

    let client = Qdrant::new(config).map_err(|e| VectorDBError::Connection(e.to_string()))?;

    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(VectorDBError::Connection(format!("Failed to connect to Qdrant: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_port_is_rewritten_to_grpc() {
        assert_eq!(grpc_url("http://localhost:6333"), "http://localhost:6334");
        assert_eq!(grpc_url("localhost:6333/"), "http://localhost:6334");
    }

    #[test]
    fn other_ports_are_kept() {
        assert_eq!(grpc_url("http://qdrant.internal:7000"), "http://qdrant.internal:7000");
        assert_eq!(grpc_url("localhost:6334"), "http://localhost:6334");
    }
}
