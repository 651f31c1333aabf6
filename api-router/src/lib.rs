use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use routes::{
    chat::{chat, clear_memory},
    liveness::live,
    readiness::ready,
};

pub mod api_state;
pub mod error;
pub mod identity;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Identity headers are enforced per-handler by the extractor.
    let chat_routes = Router::new()
        .route("/chat", post(chat))
        .route("/chat/memory", delete(clear_memory));

    public.merge(chat_routes)
}
