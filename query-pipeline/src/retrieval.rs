use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{deserialize_flexible_id, document_chunk::DocumentChunk},
    },
    utils::embedding::EmbeddingProvider,
};
use serde::Deserialize;
use tracing::debug;

use crate::{scoring::distance_to_similarity, RetrievedChunk};

/// Fixed phrase appended to the question for the department-scoped query.
/// Improves recall for short questions against regulatory collections.
const DEPARTMENT_QUERY_SUFFIX: &str = "department regulations circulars";

/// Similarity index collaborator. Must return empty (not error) for no
/// matches; scores on the returned chunks are similarity-space, higher is
/// more relevant.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        department: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, AppError>;
}

/// SurrealDB-backed index: embeds the query and runs a KNN scan over the
/// HNSW index, optionally filtered to one department.
pub struct SurrealIndex {
    db: Arc<SurrealDbClient>,
    embedder: Arc<EmbeddingProvider>,
}

impl SurrealIndex {
    pub fn new(db: Arc<SurrealDbClient>, embedder: Arc<EmbeddingProvider>) -> Self {
        Self { db, embedder }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkHit {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    created_at: DateTime<Utc>,
    source_id: String,
    file_name: String,
    page: u32,
    department: String,
    content: String,
    distance: f32,
}

impl ChunkHit {
    fn into_retrieved(self) -> RetrievedChunk {
        RetrievedChunk {
            score: distance_to_similarity(self.distance),
            chunk: DocumentChunk {
                id: self.id,
                created_at: self.created_at,
                source_id: self.source_id,
                file_name: self.file_name,
                page: self.page,
                department: self.department,
                content: self.content,
                embedding: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl SimilarityIndex for SurrealIndex {
    async fn search(
        &self,
        query: &str,
        k: usize,
        department: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        let embedding = self.embedder.embed(query).await?;

        let filter = department
            .map(|d| format!("department = '{}' AND ", d.replace('\'', "")))
            .unwrap_or_default();
        let knn_query = format!(
            "SELECT id, created_at, source_id, file_name, page, department, content, \
             vector::distance::knn() AS distance FROM document_chunk \
             WHERE {filter}embedding <|{k},40|> {embedding:?} ORDER BY distance"
        );

        let hits: Vec<ChunkHit> = self.db.query(knn_query).await?.take(0)?;
        debug!(hits = hits.len(), filtered = department.is_some(), "Index search complete");

        Ok(hits.into_iter().map(ChunkHit::into_retrieved).collect())
    }
}

/// What the retrieval stage hands downstream. `used_fallback` is observable
/// so callers and tests can tell the recall safety net engaged.
#[derive(Debug)]
pub struct RetrievalOutcome {
    pub candidates: Vec<RetrievedChunk>,
    pub used_fallback: bool,
}

/// Issues the department-scoped similarity query, falling back once to the
/// unmodified, unfiltered question when the scoped query comes back empty.
pub struct Retriever {
    index: Arc<dyn SimilarityIndex>,
    initial_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<dyn SimilarityIndex>, initial_k: usize) -> Self {
        Self { index, initial_k }
    }

    pub async fn retrieve(
        &self,
        question: &str,
        department: &str,
    ) -> Result<RetrievalOutcome, AppError> {
        let scoped_query = format!("{question} {department} {DEPARTMENT_QUERY_SUFFIX}");
        let candidates = self
            .index
            .search(&scoped_query, self.initial_k, Some(department))
            .await?;

        if !candidates.is_empty() {
            return Ok(RetrievalOutcome {
                candidates,
                used_fallback: false,
            });
        }

        debug!(%department, "Scoped retrieval empty, retrying unfiltered");
        let candidates = self.index.search(question, self.initial_k, None).await?;
        Ok(RetrievalOutcome {
            candidates,
            used_fallback: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedIndex {
        // One entry per expected search call: (expected_filter, result).
        calls: Mutex<Vec<(Option<String>, Vec<RetrievedChunk>)>>,
    }

    #[async_trait]
    impl SimilarityIndex for ScriptedIndex {
        async fn search(
            &self,
            _query: &str,
            _k: usize,
            department: Option<&str>,
        ) -> Result<Vec<RetrievedChunk>, AppError> {
            let mut calls = self.calls.lock().await;
            assert!(!calls.is_empty(), "unexpected extra search call");
            let (expected_filter, result) = calls.remove(0);
            assert_eq!(department.map(str::to_owned), expected_filter);
            Ok(result)
        }
    }

    fn payments_chunk(content: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: DocumentChunk::new(
                "src".into(),
                "circular.pdf".into(),
                2,
                "Payments".into(),
                content.into(),
            ),
            score,
        }
    }

    #[tokio::test]
    async fn scoped_hit_skips_fallback() {
        let index = Arc::new(ScriptedIndex {
            calls: Mutex::new(vec![(
                Some("Payments".to_owned()),
                vec![payments_chunk("capital rule", 0.9)],
            )]),
        });
        let retriever = Retriever::new(index, 20);

        let outcome = retriever
            .retrieve("minimum capital?", "Payments")
            .await
            .unwrap();
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn empty_scoped_result_triggers_observable_fallback() {
        let index = Arc::new(ScriptedIndex {
            calls: Mutex::new(vec![
                (Some("Payments".to_owned()), vec![]),
                (
                    None,
                    vec![
                        payments_chunk("general rule", 0.8),
                        payments_chunk("another rule", 0.6),
                    ],
                ),
            ]),
        });
        let retriever = Retriever::new(index, 20);

        let outcome = retriever
            .retrieve("minimum capital?", "Payments")
            .await
            .unwrap();
        assert!(outcome.used_fallback);
        assert_eq!(outcome.candidates.len(), 2);
    }

    async fn seeded_surreal_index() -> SurrealIndex {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        let embedder = Arc::new(EmbeddingProvider::new_hashed(64).expect("hashed provider"));
        db.ensure_indexes(embedder.dimension())
            .await
            .expect("Failed to define indexes");

        let chunks = [
            ("Payments", "payment settlement finality rules", "pay.pdf", 3),
            ("Payments", "minimum capital requirement for payment firms", "pay.pdf", 9),
            ("Banking", "liquidity coverage ratio for banks", "bank.pdf", 12),
        ];
        for (department, content, file_name, page) in chunks {
            let chunk = DocumentChunk::new(
                format!("src_{file_name}_{page}"),
                file_name.into(),
                page,
                department.into(),
                content.into(),
            );
            let embedding = embedder.embed(content).await.expect("embed chunk");
            DocumentChunk::store_with_embedding(chunk, embedding, &db)
                .await
                .expect("store chunk");
        }

        SurrealIndex::new(db, embedder)
    }

    #[tokio::test]
    async fn surreal_index_applies_department_filter() {
        let index = seeded_surreal_index().await;

        let hits = index
            .search("minimum capital requirement", 10, Some("Payments"))
            .await
            .expect("search failed");

        assert!(!hits.is_empty());
        assert!(hits.iter().all(|hit| hit.chunk.department == "Payments"));
        // Higher is more relevant, descending by rank.
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn surreal_index_returns_empty_for_unknown_department() {
        let index = seeded_surreal_index().await;

        let hits = index
            .search("minimum capital requirement", 10, Some("Insurance"))
            .await
            .expect("search failed");

        assert!(hits.is_empty());
    }
}
