use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, interaction_log::InteractionLogger},
};
use query_pipeline::{memory::SessionRegistry, resources::SharedResources};

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub db: Arc<SurrealDbClient>,
    pub resources: Arc<SharedResources>,
    pub sessions: Arc<SessionRegistry>,
    pub interactions: Arc<InteractionLogger>,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        Ok(Self::with_db(config, db))
    }

    /// Wires the state around an existing database handle. Tests use this
    /// with an in-memory instance.
    pub fn with_db(config: &AppConfig, db: Arc<SurrealDbClient>) -> Self {
        let resources = Arc::new(SharedResources::new(config.clone(), db.clone()));

        Self {
            config: config.clone(),
            db,
            resources,
            sessions: Arc::new(SessionRegistry::new(config.max_turns)),
            interactions: Arc::new(InteractionLogger::new(&config.data_dir)),
        }
    }
}
