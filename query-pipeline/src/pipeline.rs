use std::sync::Arc;
use std::time::Instant;

use common::{error::AppError, utils::config::AppConfig};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::{
    generation::{score_faithfulness, LanguageModel},
    memory::ConversationMemory,
    prompt::{build_context, compose_within_budget},
    reranking::{rerank_candidates, RelevanceModel},
    resources::SharedResources,
    retrieval::{Retriever, SimilarityIndex},
    scoring::{blend_confidence, ConfidenceWeights},
    RetrievedChunk, SourceReference,
};

/// Returned when the generation backend is down. Never replaced by a raw
/// error: degraded results always carry a human-readable answer.
pub const APOLOGY_MESSAGE: &str = "Service temporarily unavailable.";

/// Returned when the evidence base is empty or the model declined to answer.
pub const REFUSAL_MESSAGE: &str =
    "I cannot answer this based on available regulations. Contact: compliance@regulator.example";

/// Marker the generation model emits when it cannot ground an answer.
const CANNOT_ANSWER_MARKER: &str = "cannot answer";

/// Final structured result of one query. Transient: handed back once,
/// never retained by the pipeline.
#[derive(Debug, Serialize)]
pub struct AnswerResult {
    pub question: String,
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<SourceReference>,
    pub time_taken_seconds: f64,
    /// True when the department-scoped query came back empty and the
    /// unfiltered recall safety net supplied the candidates.
    pub used_fallback: bool,
}

/// Sequences retrieve, rerank, compose, generate and score for one question,
/// converting each stage failure into a degraded-but-valid partial result.
pub struct QueryPipeline {
    retriever: Retriever,
    reranker: Option<Arc<dyn RelevanceModel>>,
    generator: Arc<dyn LanguageModel>,
    weights: ConfidenceWeights,
    top_k: usize,
    prompt_token_budget: usize,
}

impl QueryPipeline {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        reranker: Option<Arc<dyn RelevanceModel>>,
        generator: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(index, config.initial_k),
            reranker,
            generator,
            weights: ConfidenceWeights::default(),
            top_k: config.top_k,
            prompt_token_budget: config.prompt_token_budget,
        }
    }

    /// Builds a pipeline from the lazily-initialized shared singletons.
    /// Only resource construction failures propagate; per-query stage
    /// failures are absorbed by `process_query`.
    pub async fn from_resources(resources: &SharedResources) -> Result<Self, AppError> {
        let index = resources.index().await?;
        let reranker = resources.reranker().await?;
        let generator = resources.generator().await?;
        Ok(Self::new(index, reranker, generator, resources.config()))
    }

    #[instrument(skip_all, fields(user_id, department))]
    pub async fn process_query(
        &self,
        question: &str,
        user_id: &str,
        department: &str,
        memory: &ConversationMemory,
    ) -> AnswerResult {
        let start = Instant::now();

        // Retrieve. An unreachable index degrades to an empty evidence base;
        // scoring forces confidence to zero further down.
        let (candidates, used_fallback) =
            match self.retriever.retrieve(question, department).await {
                Ok(outcome) => (outcome.candidates, outcome.used_fallback),
                Err(e) => {
                    error!("Retrieval failed: {e}");
                    (Vec::new(), false)
                }
            };

        // Rerank. Reranking is an optimization, not a correctness
        // requirement: a failure keeps the raw retrieval order.
        let reranked = match &self.reranker {
            Some(model) if !candidates.is_empty() => {
                match rerank_candidates(
                    model.as_ref(),
                    question,
                    candidates.clone(),
                    self.top_k,
                )
                .await
                {
                    Ok(reranked) => reranked,
                    Err(e) => {
                        warn!("Reranking failed, keeping retrieval order: {e}");
                        truncate_to_top_k(candidates, self.top_k)
                    }
                }
            }
            _ => truncate_to_top_k(candidates, self.top_k),
        };

        let sources: Vec<SourceReference> =
            reranked.iter().map(SourceReference::from_chunk).collect();

        let (answer, confidence) = if reranked.is_empty() {
            // Empty evidence bypasses generation and the blended formula
            // entirely; there is nothing to ground an answer in.
            (REFUSAL_MESSAGE.to_owned(), 0.0)
        } else {
            self.generate_and_score(question, department, &reranked, &sources, memory)
                .await
        };

        // Finalize records the question exactly once, degraded turns
        // included, so later back-references still resolve.
        memory.add(question).await;

        let result = AnswerResult {
            question: question.to_owned(),
            answer,
            confidence: round3(confidence),
            sources,
            time_taken_seconds: round3_f64(start.elapsed().as_secs_f64()),
            used_fallback,
        };
        info!(
            confidence = result.confidence,
            sources = result.sources.len(),
            used_fallback = result.used_fallback,
            elapsed_s = result.time_taken_seconds,
            "Query processed"
        );
        result
    }

    async fn generate_and_score(
        &self,
        question: &str,
        department: &str,
        reranked: &[RetrievedChunk],
        sources: &[SourceReference],
        memory: &ConversationMemory,
    ) -> (String, f32) {
        let history = memory.snapshot().await;
        let prompt = compose_within_budget(
            department,
            &history,
            reranked,
            question,
            self.prompt_token_budget,
        );

        let answer = match self.generator.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Generation failed: {e}");
                return (APOLOGY_MESSAGE.to_owned(), 0.0);
            }
        };

        if answer.to_lowercase().contains(CANNOT_ANSWER_MARKER) {
            return (REFUSAL_MESSAGE.to_owned(), 0.0);
        }

        let context = build_context(reranked);
        let faithfulness =
            score_faithfulness(self.generator.as_ref(), &context, question, &answer).await;

        let retrieval_scores: Vec<f32> = reranked.iter().map(|entry| entry.score).collect();
        let pages: Vec<u32> = sources.iter().map(|source| source.page).collect();
        let confidence = blend_confidence(self.weights, &retrieval_scores, faithfulness, &pages);

        (answer, confidence)
    }
}

/// Rerank-failure fallback: keep raw retrieval order, bounded to `top_k`.
/// Raw similarity scores travel with the kept chunks unchanged.
fn truncate_to_top_k(mut candidates: Vec<RetrievedChunk>, top_k: usize) -> Vec<RetrievedChunk> {
    candidates.truncate(top_k);
    candidates
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

fn round3_f64(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
