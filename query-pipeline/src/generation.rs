use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use tracing::warn;

/// Generation model collaborator. Implementations normalize whatever shape
/// the backend returns into plain text; ambiguity never leaks upstream.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

/// Chat-completions backed generator for OpenAI-compatible endpoints.
pub struct OpenAiGenerator {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LanguageModel for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.0)
            .messages([ChatCompletionRequestUserMessage::from(prompt).into()])
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| AppError::Generation("model returned no content".into()))
    }
}

/// Characters of context shown to the faithfulness probe.
const FAITHFULNESS_CONTEXT_CHARS: usize = 2000;

/// Strict yes/no grounding check over a bounded slice of the context.
/// "yes" scores 1.0, any other parseable reply 0.0, a failed call the
/// explicit neutral 0.5 so a flaky backend never zeroes the blend silently.
pub async fn score_faithfulness(
    model: &dyn LanguageModel,
    context: &str,
    question: &str,
    answer: &str,
) -> f32 {
    let bounded_context: String = context.chars().take(FAITHFULNESS_CONTEXT_CHARS).collect();
    let prompt = format!(
        "Based on the Context, is the Answer factually grounded and relevant to the Question? \
         Respond ONLY with 'Yes' or 'No'.\n\n\
         Context: {bounded_context}\n\
         Question: {question}\n\
         Answer: {answer}\n\n\
         Response:"
    );

    match model.generate(&prompt).await {
        Ok(response) => {
            if response.trim().to_lowercase().contains("yes") {
                1.0
            } else {
                0.0
            }
        }
        Err(e) => {
            warn!("Faithfulness check failed: {e}");
            0.5
        }
    }
}
