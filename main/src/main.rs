use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::utils::config::get_config;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    // Set up router state; connects to the database
    let state = ApiState::new(&config).await?;

    // Pre-warm the shared resources so the first request does not pay the
    // construction cost. The index is load-bearing: without it every query
    // degrades to a refusal, so failure here is fatal. The reranker and
    // generator warm up opportunistically.
    state.resources.index().await?;
    if let Err(e) = state.resources.reranker().await {
        warn!("Reranker unavailable, continuing without reranking: {e}");
    }
    if let Err(e) = state.resources.generator().await {
        warn!("Generator pre-warm failed, continuing: {e}");
    }

    // Create Axum router
    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::storage::db::SurrealDbClient;
    use common::utils::config::{AppConfig, EmbeddingBackendKind};
    use query_pipeline::REFUSAL_MESSAGE;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str, data_dir: &str) -> AppConfig {
        AppConfig {
            openai_api_key: "test-key".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            http_port: 0,
            data_dir: data_dir.into(),
            // Unroutable so model calls fail fast without network.
            openai_base_url: "http://127.0.0.1:1".into(),
            generation_model: "gpt-4o-mini".into(),
            embedding_backend: EmbeddingBackendKind::Hashed,
            embedding_model: None,
            embedding_dimensions: 64,
            reranking_enabled: false,
            reranking_pool_size: None,
            initial_k: 20,
            top_k: 5,
            max_turns: 5,
            prompt_token_budget: 8192,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let data_dir = std::env::temp_dir().join(format!("stadga_smoke_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&data_dir)
            .await
            .expect("failed to create temp data directory");

        let config = smoke_test_config(
            namespace,
            &database,
            &data_dir.to_string_lossy(),
        );
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        let state = ApiState::with_db(&config, db);

        state.resources.index().await.expect("index not ready");

        let app = Router::new()
            .nest("/api/v1", api_routes_v1())
            .with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);

        // Full chat round-trip against the empty index: the service stays
        // up and answers with the refusal message.
        let chat_response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/chat")
                    .header("content-type", "application/json")
                    .header("x-user-id", "analyst_1")
                    .header("x-department", "Payments")
                    .body(Body::from(r#"{"question":"minimum capital?"}"#))
                    .expect("request"),
            )
            .await
            .expect("chat response");
        assert_eq!(chat_response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(chat_response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["answer"], REFUSAL_MESSAGE);

        tokio::fs::remove_dir_all(&data_dir).await.ok();
    }
}
