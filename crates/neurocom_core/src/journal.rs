//! crates/neurocom_core/src/journal.rs
//!
//! The user's reflections diary.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::domain::{NewReflection, Reflection};
use crate::embedding::Embedder;
use crate::error::{CoreError, CoreResult};
use crate::ports::ReflectionRepository;

/// Kind given to reflections submitted without one.
pub const DEFAULT_KIND: &str = "livre";
pub const DEFAULT_REFLECTIONS_LIMIT: u32 = 20;
pub const MAX_REFLECTIONS_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct Journal {
    repo: Arc<dyn ReflectionRepository>,
    embedder: Embedder,
}

impl Journal {
    pub fn new(repo: Arc<dyn ReflectionRepository>, embedder: Embedder) -> Self {
        Self { repo, embedder }
    }

    /// Stores a reflection. Its embedding feeds the guardian's retrieval and
    /// is skipped when it cannot be computed.
    pub async fn record(
        &self,
        user_id: Uuid,
        mut reflection: NewReflection,
    ) -> CoreResult<Reflection> {
        reflection.content = reflection.content.trim().to_string();
        if reflection.content.is_empty() {
            return Err(CoreError::Validation("content must not be empty".to_string()));
        }
        reflection.kind = match reflection.kind.trim() {
            "" => DEFAULT_KIND.to_string(),
            kind => kind.to_string(),
        };
        reflection.title = reflection
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        reflection.embedding = match self.embedder.embed(&reflection.content).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Storing reflection without embedding: {}", e);
                None
            }
        };

        Ok(self.repo.insert_reflection(user_id, &reflection).await?)
    }

    /// Newest first, optionally of one kind.
    pub async fn recent(
        &self,
        user_id: Uuid,
        kind: Option<&str>,
        limit: Option<u32>,
    ) -> CoreResult<Vec<Reflection>> {
        let limit = limit
            .unwrap_or(DEFAULT_REFLECTIONS_LIMIT)
            .clamp(1, MAX_REFLECTIONS_LIMIT);
        let kind = kind.map(str::trim).filter(|k| !k.is_empty());
        Ok(self.repo.recent_reflections(user_id, kind, limit).await?)
    }
}
