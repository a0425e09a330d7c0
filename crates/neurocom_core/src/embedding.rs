//! crates/neurocom_core/src/embedding.rs
//!
//! Shape-checked access to the embedding model.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::ports::EmbeddingService;

/// Wraps an [`EmbeddingService`] with an input check, a deadline and a
/// dimensionality check against the deployed model's vector size.
#[derive(Clone)]
pub struct Embedder {
    service: Arc<dyn EmbeddingService>,
    dimensions: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(service: Arc<dyn EmbeddingService>, dimensions: usize, timeout: Duration) -> Self {
        Self {
            service,
            dimensions,
            timeout,
        }
    }

    /// Turns `text` into a vector of exactly the configured number of values.
    pub async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(CoreError::Embedding("input text is empty".to_string()));
        }

        let vector = tokio::time::timeout(self.timeout, self.service.embed(text))
            .await
            .map_err(|_| {
                CoreError::Embedding(format!("embedding call exceeded {:?}", self.timeout))
            })?
            .map_err(|e| CoreError::Embedding(e.to_string()))?;

        check_dimensions(vector, self.dimensions)
    }
}

fn check_dimensions(vector: Vec<f32>, expected: usize) -> CoreResult<Vec<f32>> {
    if vector.is_empty() {
        return Err(CoreError::Embedding("model returned an empty vector".to_string()));
    }
    if vector.len() != expected {
        return Err(CoreError::Embedding(format!(
            "dimension mismatch: got {}, expected {}",
            vector.len(),
            expected
        )));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_mismatched_vectors() {
        assert!(matches!(
            check_dimensions(vec![], 4),
            Err(CoreError::Embedding(_))
        ));
        assert!(matches!(
            check_dimensions(vec![0.1; 3], 4),
            Err(CoreError::Embedding(_))
        ));
        assert_eq!(check_dimensions(vec![0.5; 4], 4).unwrap().len(), 4);
    }
}
