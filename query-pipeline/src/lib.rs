pub mod generation;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod reranking;
pub mod resources;
pub mod retrieval;
pub mod scoring;

use common::storage::types::document_chunk::DocumentChunk;
use serde::Serialize;

pub use pipeline::{AnswerResult, QueryPipeline, APOLOGY_MESSAGE, REFUSAL_MESSAGE};

// Captures a candidate chunk plus its relevance score for downstream stages.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Read-only view of a chunk exposed in responses. Built fresh per answer;
/// the download locator is emitted unverified, file serving checks existence.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReference {
    pub source_id: String,
    pub file_name: String,
    pub page: u32,
    pub download_url: String,
}

impl SourceReference {
    pub fn from_chunk(retrieved: &RetrievedChunk) -> Self {
        let chunk = &retrieved.chunk;
        Self {
            source_id: chunk.source_id.clone(),
            file_name: chunk.file_name.clone(),
            page: chunk.page,
            download_url: format!("/files/{}", chunk.file_name),
        }
    }
}
