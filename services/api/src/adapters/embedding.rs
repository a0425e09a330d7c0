//! services/api/src/adapters/embedding.rs
//!
//! This module contains the adapter for the text-embedding model.
//! It implements the `EmbeddingService` port from the `core` crate. Shape
//! validation (empty input, dimensionality) is done by the core `Embedder`.

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use neurocom_core::ports::{EmbeddingService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `EmbeddingService` using an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiEmbeddingAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbeddingAdapter {
    /// Creates a new `OpenAiEmbeddingAdapter` asking for `dimensions`-long vectors.
    pub fn new(client: Client<OpenAIConfig>, model: String, dimensions: u32) -> Self {
        Self {
            client,
            model,
            dimensions,
        }
    }
}

//=========================================================================================
// `EmbeddingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingAdapter {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .dimensions(self.dimensions)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| PortError::Unexpected("Embedding response had no data".to_string()))
    }
}
