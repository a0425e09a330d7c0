//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the generative model.
//! It implements the `GenerationService` port from the `core` crate. Answers
//! and follow-up questions may be routed to different models.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use neurocom_core::ports::{
    GenerationKind, GenerationRequest, GenerationService, PortError, PortResult,
};
use tracing::debug;

/// An adapter that implements `GenerationService` using an OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    answer_model: String,
    followup_model: String,
}

impl OpenAiChatAdapter {
    pub fn new(client: Client<OpenAIConfig>, answer_model: String, followup_model: String) -> Self {
        Self {
            client,
            answer_model,
            followup_model,
        }
    }

    fn model_for(&self, kind: GenerationKind) -> &str {
        match kind {
            GenerationKind::Answer => &self.answer_model,
            GenerationKind::Followups => &self.followup_model,
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiChatAdapter {
    /// The prompt is already fully composed by the core, so it goes out as one user message.
    async fn generate(&self, request: &GenerationRequest<'_>) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        )];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model_for(request.kind)).messages(messages);
        if let Some(max_tokens) = request.max_output_tokens {
            args.max_tokens(max_tokens);
        }
        let completion = args
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(completion)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Malformed or empty replies become "", which the core treats as degraded.
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(kind = ?request.kind, chars = text.len(), "Model replied");
        Ok(text)
    }
}
