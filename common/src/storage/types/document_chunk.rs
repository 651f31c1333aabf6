use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{deserialize_flexible_id, StoredObject},
    },
};

/// Atomic retrieval unit: a bounded span of regulatory text with its source
/// metadata. Produced at ingestion time; the query pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source_id: String,
    pub file_name: String,
    pub page: u32,
    pub department: String,
    pub content: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl StoredObject for DocumentChunk {
    fn table_name() -> &'static str {
        "document_chunk"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl DocumentChunk {
    pub fn new(
        source_id: String,
        file_name: String,
        page: u32,
        department: String,
        content: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            source_id,
            file_name,
            page,
            department,
            content,
            embedding: Vec::new(),
        }
    }

    /// Stores the chunk together with its embedding so the HNSW index can
    /// serve it. Ingestion collaborators and tests populate the index with
    /// this; the pipeline never writes chunks.
    pub async fn store_with_embedding(
        mut chunk: Self,
        embedding: Vec<f32>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        chunk.embedding = embedding;
        db.store_item(chunk).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> DocumentChunk {
        DocumentChunk::new(
            "src_001".into(),
            "circular_12.pdf".into(),
            4,
            "Payments".into(),
            "The minimum capital requirement is set out in clause 3.".into(),
        )
    }

    #[test]
    fn new_chunk_has_identity_and_empty_embedding() {
        let chunk = sample_chunk();
        assert!(!chunk.id.is_empty());
        assert!(chunk.embedding.is_empty());
        assert_eq!(chunk.department, "Payments");
    }

    #[tokio::test]
    async fn store_with_embedding_round_trips() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let chunk = sample_chunk();
        let id = chunk.id.clone();
        DocumentChunk::store_with_embedding(chunk, vec![0.1, 0.2, 0.3], &db)
            .await
            .expect("Failed to store chunk");

        let stored: Option<DocumentChunk> = db.get_item(&id).await.expect("Failed to fetch chunk");
        let stored = stored.expect("Chunk missing");
        assert_eq!(stored.file_name, "circular_12.pdf");
        assert_eq!(stored.embedding.len(), 3);
    }
}
