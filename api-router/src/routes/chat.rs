use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use common::utils::interaction_log::InteractionRecord;
use query_pipeline::{QueryPipeline, SourceReference};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, identity::Identity};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    #[serde(default = "default_include_confidence")]
    pub include_confidence: bool,
}

fn default_include_confidence() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub question: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub sources: Vec<SourceReference>,
    pub time_taken_seconds: f64,
    pub used_fallback: bool,
}

pub async fn chat(
    State(state): State<ApiState>,
    identity: Identity,
    Query(params): Query<ChatParams>,
    Json(input): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = input.question.trim();
    if question.is_empty() {
        return Err(ApiError::ValidationError(
            "question must not be empty".to_string(),
        ));
    }

    info!(
        user_id = %identity.user_id,
        department = %identity.department,
        question_bytes = question.len(),
        "Received chat request"
    );

    let pipeline = QueryPipeline::from_resources(&state.resources).await?;
    let memory = state.sessions.memory_for(&identity.user_id).await;

    let result = pipeline
        .process_query(question, &identity.user_id, &identity.department, &memory)
        .await;

    let record = InteractionRecord {
        user: identity.user_id,
        time: Utc::now().to_rfc3339(),
        query: result.question.clone(),
        answer: result.answer.clone(),
        sources: serde_json::to_value(&result.sources).unwrap_or(serde_json::Value::Null),
        confidence: result.confidence,
    };
    let interactions = state.interactions.clone();
    tokio::spawn(async move {
        interactions.log_interaction(record).await;
    });

    Ok((
        StatusCode::OK,
        Json(ChatResponse {
            question: result.question,
            answer: result.answer,
            confidence: params.include_confidence.then_some(result.confidence),
            sources: result.sources,
            time_taken_seconds: result.time_taken_seconds,
            used_fallback: result.used_fallback,
        }),
    ))
}

/// Drops the caller's conversation memory. The next question starts a
/// fresh session with the "None" history placeholder.
pub async fn clear_memory(
    State(state): State<ApiState>,
    identity: Identity,
) -> impl IntoResponse {
    state.sessions.clear_user(&identity.user_id).await;
    info!(user_id = %identity.user_id, "Cleared conversation memory");

    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
