use std::{
    cmp::Ordering,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    },
    thread::available_parallelism,
};

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use fastembed::{RerankInitOptions, TextRerank};
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

use crate::{scoring::min_max_normalize, RetrievedChunk};

/// Upper bound on (question, passage) pairs scored per model invocation.
const RERANK_BATCH_SIZE: usize = 16;

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    let n = NEXT_ENGINE.fetch_add(1, AtomicOrdering::Relaxed);
    n % pool_len
}

/// Cross-encoder collaborator: scores every (question, passage) pair
/// independently, one score per input passage, input order preserved.
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    async fn predict(&self, question: &str, passages: Vec<String>) -> Result<Vec<f32>, AppError>;
}

/// Pool of fastembed cross-encoder engines. The semaphore caps concurrent
/// reranks; engines are picked round-robin to avoid always hammering index 0.
pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl RerankerPool {
    pub fn new(pool_size: usize) -> Result<Arc<Self>, AppError> {
        Self::new_with_options(pool_size, RerankInitOptions::default())
    }

    fn new_with_options(
        pool_size: usize,
        init_options: RerankInitOptions,
    ) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation(
                "reranking_pool_size must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(&init_options.cache_dir)?;

        let mut engines = Vec::with_capacity(pool_size);
        for x in 0..pool_size {
            debug!("Creating reranking engine: {x}");
            let model = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            engines.push(Arc::new(Mutex::new(model)));
        }

        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }))
    }

    /// Initialize a pool using application configuration. Disabled reranking
    /// yields `None`; the pipeline then keeps raw retrieval order.
    pub fn maybe_from_config(config: &AppConfig) -> Result<Option<Arc<Self>>, AppError> {
        if !config.reranking_enabled {
            return Ok(None);
        }

        let pool_size = config.reranking_pool_size.unwrap_or_else(default_pool_size);

        let mut options = RerankInitOptions::default();
        options.cache_dir = Path::new(&config.data_dir)
            .join("fastembed")
            .join("reranker");
        Self::new_with_options(pool_size, options).map(Some)
    }
}

fn default_pool_size() -> usize {
    available_parallelism()
        .map(|value| value.get().min(2))
        .unwrap_or(2)
        .max(1)
}

#[async_trait]
impl RelevanceModel for RerankerPool {
    async fn predict(&self, question: &str, passages: Vec<String>) -> Result<Vec<f32>, AppError> {
        let passage_count = passages.len();
        if passage_count == 0 {
            return Ok(Vec::new());
        }

        // The permit enforces backpressure across in-flight reranks.
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::InternalError("reranker pool closed".to_string()))?;

        let idx = pick_engine_index(self.engines.len());
        let engine = self
            .engines
            .get(idx)
            .cloned()
            .ok_or_else(|| AppError::InternalError("reranker pool is empty".to_string()))?;

        // Lock this specific engine so we get &mut TextRerank.
        let mut guard = engine.lock().await;
        let results = guard
            .rerank(question.to_owned(), passages, false, Some(RERANK_BATCH_SIZE))
            .map_err(|e| AppError::InternalError(e.to_string()))?;

        // The engine returns results ranked; callers expect input order.
        let mut scores = vec![0.0f32; passage_count];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }
}

/// Second, finer-grained relevance pass. Scores every candidate against the
/// literal question, keeps the best `top_k` (stable on ties), and min-max
/// normalizes the kept scores. Empty input short-circuits without touching
/// the model.
pub async fn rerank_candidates(
    model: &dyn RelevanceModel,
    question: &str,
    candidates: Vec<RetrievedChunk>,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>, AppError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let passages: Vec<String> = candidates
        .iter()
        .map(|entry| entry.chunk.content.clone())
        .collect();
    let raw_scores = model.predict(question, passages).await?;

    if raw_scores.len() != candidates.len() {
        return Err(AppError::InternalError(format!(
            "reranker returned {} scores for {} candidates",
            raw_scores.len(),
            candidates.len()
        )));
    }

    // Stable sort keeps original retrieval order on ties.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        let score_a = raw_scores.get(*a).copied().unwrap_or(0.0);
        let score_b = raw_scores.get(*b).copied().unwrap_or(0.0);
        score_b.partial_cmp(&score_a).unwrap_or(Ordering::Equal)
    });
    order.truncate(top_k);

    let kept_raw: Vec<f32> = order
        .iter()
        .map(|i| raw_scores.get(*i).copied().unwrap_or(0.0))
        .collect();
    let normalized = min_max_normalize(&kept_raw);

    let mut by_index: Vec<Option<RetrievedChunk>> = candidates.into_iter().map(Some).collect();
    let reranked = order
        .iter()
        .zip(normalized)
        .filter_map(|(i, score)| {
            by_index.get_mut(*i).and_then(Option::take).map(|mut entry| {
                entry.score = score;
                entry
            })
        })
        .collect();

    Ok(reranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::document_chunk::DocumentChunk;

    struct FixedScores(Vec<f32>);

    #[async_trait]
    impl RelevanceModel for FixedScores {
        async fn predict(
            &self,
            _question: &str,
            passages: Vec<String>,
        ) -> Result<Vec<f32>, AppError> {
            assert_eq!(passages.len(), self.0.len());
            Ok(self.0.clone())
        }
    }

    struct PanicModel;

    #[async_trait]
    impl RelevanceModel for PanicModel {
        async fn predict(
            &self,
            _question: &str,
            _passages: Vec<String>,
        ) -> Result<Vec<f32>, AppError> {
            panic!("model must not be invoked for empty candidate sets");
        }
    }

    fn candidate(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: DocumentChunk::new(
                "src".into(),
                "file.pdf".into(),
                1,
                "Payments".into(),
                content.into(),
            ),
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn keeps_top_k_in_descending_normalized_order() {
        let candidates = vec![
            candidate("a"),
            candidate("b"),
            candidate("c"),
            candidate("d"),
        ];
        let model = FixedScores(vec![0.1, 0.9, 0.5, 0.3]);

        let reranked = rerank_candidates(&model, "q", candidates, 3).await.unwrap();

        assert_eq!(reranked.len(), 3);
        let contents: Vec<&str> = reranked
            .iter()
            .map(|e| e.chunk.content.as_str())
            .collect();
        assert_eq!(contents, vec!["b", "c", "d"]);
        // Min-max over the kept subset.
        assert!((reranked[0].score - 1.0).abs() < 1e-6);
        assert!(reranked[2].score.abs() < 1e-6);
        for pair in reranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn all_equal_scores_normalize_to_one() {
        let candidates = vec![candidate("a"), candidate("b")];
        let model = FixedScores(vec![0.7, 0.7]);

        let reranked = rerank_candidates(&model, "q", candidates, 5).await.unwrap();
        assert!(reranked.iter().all(|e| (e.score - 1.0).abs() < 1e-6));
        // Stable: ties keep retrieval order.
        assert_eq!(reranked[0].chunk.content, "a");
    }

    #[tokio::test]
    async fn empty_candidates_skip_the_model() {
        let reranked = rerank_candidates(&PanicModel, "q", Vec::new(), 5)
            .await
            .unwrap();
        assert!(reranked.is_empty());
    }

    #[tokio::test]
    async fn score_count_mismatch_is_an_error() {
        let candidates = vec![candidate("a"), candidate("b")];

        struct ShortModel;

        #[async_trait]
        impl RelevanceModel for ShortModel {
            async fn predict(
                &self,
                _question: &str,
                _passages: Vec<String>,
            ) -> Result<Vec<f32>, AppError> {
                Ok(vec![0.5])
            }
        }

        let result = rerank_candidates(&ShortModel, "q", candidates, 5).await;
        assert!(matches!(result, Err(AppError::InternalError(_))));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let result = RerankerPool::new(0);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
