use crate::RetrievedChunk;

/// Rough token estimate used to keep prompts inside the model context window.
const AVG_CHARS_PER_TOKEN: usize = 4;

/// When the assembled prompt risks blowing the budget, context is cut down to
/// this many chunks and the prompt recomposed once.
const TRUNCATED_CONTEXT_CHUNKS: usize = 5;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(AVG_CHARS_PER_TOKEN)
}

/// Concatenates chunk texts in reranked order, blank line between chunks.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|entry| entry.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pure four-slot template instantiation. Same inputs, same prompt.
pub fn compose(department: &str, history: &str, context: &str, question: &str) -> String {
    format!(
        r"You are the regulatory compliance assistant for the {department} department.

Answer **only** the current question using the Context below.
Do **not** refer to previous topics unless explicitly mentioned.

Context:
{context}

History (user questions only, newest last):
{history}

Current question: {question}
"
    )
}

/// Composes the generation prompt, retrying once with truncated context if the
/// estimate exceeds the token budget. A single bounded retry, not a loop.
pub fn compose_within_budget(
    department: &str,
    history: &str,
    chunks: &[RetrievedChunk],
    question: &str,
    token_budget: usize,
) -> String {
    let prompt = compose(department, history, &build_context(chunks), question);
    if estimate_tokens(&prompt) <= token_budget {
        return prompt;
    }

    let kept = chunks.len().min(TRUNCATED_CONTEXT_CHUNKS);
    tracing::warn!(
        estimated_tokens = estimate_tokens(&prompt),
        token_budget,
        kept_chunks = kept,
        "Prompt over budget, truncating context"
    );
    let truncated = chunks.get(..kept).unwrap_or(chunks);
    compose(department, history, &build_context(truncated), question)
}
