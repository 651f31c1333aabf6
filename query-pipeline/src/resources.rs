use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError, storage::db::SurrealDbClient, utils::config::AppConfig,
    utils::embedding::EmbeddingProvider,
};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    generation::{LanguageModel, OpenAiGenerator},
    reranking::{RelevanceModel, RerankerPool},
    retrieval::{SimilarityIndex, SurrealIndex},
};

/// Lazily constructs and caches the three expensive singletons the pipeline
/// depends on. `OnceCell` gives the check-lock-recheck discipline: concurrent
/// first callers race to one construction, everyone else awaits it, later
/// reads are lock-free.
pub struct SharedResources {
    config: AppConfig,
    db: Arc<SurrealDbClient>,
    openai_client: Arc<Client<OpenAIConfig>>,
    index: OnceCell<Arc<dyn SimilarityIndex>>,
    reranker: OnceCell<Option<Arc<dyn RelevanceModel>>>,
    generator: OnceCell<Arc<dyn LanguageModel>>,
}

impl SharedResources {
    pub fn new(config: AppConfig, db: Arc<SurrealDbClient>) -> Self {
        let openai_client = Arc::new(Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        Self {
            config,
            db,
            openai_client,
            index: OnceCell::new(),
            reranker: OnceCell::new(),
            generator: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Similarity index handle. Failure to reach the embedding or index
    /// backend here is fatal for this resource and propagates to the caller;
    /// already-initialized resources are unaffected.
    pub async fn index(&self) -> Result<Arc<dyn SimilarityIndex>, AppError> {
        self.index
            .get_or_try_init(|| async {
                let embedder =
                    EmbeddingProvider::from_config(&self.config, Some(self.openai_client.clone()))
                        .await?;
                info!(
                    backend = embedder.backend_label(),
                    dimension = embedder.dimension(),
                    "Embedding provider initialized"
                );
                self.db.ensure_indexes(embedder.dimension()).await?;

                let index: Arc<dyn SimilarityIndex> =
                    Arc::new(SurrealIndex::new(self.db.clone(), Arc::new(embedder)));
                Ok(index)
            })
            .await
            .cloned()
    }

    /// Reranking model, or `None` when reranking is disabled by config.
    pub async fn reranker(&self) -> Result<Option<Arc<dyn RelevanceModel>>, AppError> {
        self.reranker
            .get_or_try_init(|| async {
                let pool = RerankerPool::maybe_from_config(&self.config)?;
                Ok(pool.map(|pool| pool as Arc<dyn RelevanceModel>))
            })
            .await
            .cloned()
    }

    /// Generation model handle. Construction performs one trivial warm-up
    /// call so the first real request does not pay cold-start latency; a
    /// warm-up failure is logged but the resource is still marked ready and
    /// real calls surface the underlying failure.
    pub async fn generator(&self) -> Result<Arc<dyn LanguageModel>, AppError> {
        self.generator
            .get_or_try_init(|| async {
                let generator: Arc<dyn LanguageModel> = Arc::new(OpenAiGenerator::new(
                    self.openai_client.clone(),
                    self.config.generation_model.clone(),
                ));

                if let Err(e) = generator.generate("Hello").await {
                    warn!("Generator warm-up failed, continuing: {e}");
                }

                Ok(generator)
            })
            .await
            .cloned()
    }
}
