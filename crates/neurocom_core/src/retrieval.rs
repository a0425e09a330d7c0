//! crates/neurocom_core/src/retrieval.rs
//!
//! The vector store gateway. Backend failures never escape this module: they
//! are logged and reported to the caller as "no answer from this call".

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::ScoredRecord;
use crate::error::CoreError;
use crate::ports::{CombinedQuery, PortResult, SimilarityQuery, VectorStore};

#[derive(Clone)]
pub struct VectorGateway {
    store: Arc<dyn VectorStore>,
    timeout: Duration,
}

impl VectorGateway {
    pub fn new(store: Arc<dyn VectorStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Single-collection search. `None` means the backend was unavailable.
    pub async fn search(&self, query: &SimilarityQuery<'_>) -> Option<Vec<ScoredRecord>> {
        let outcome = tokio::time::timeout(self.timeout, self.store.search(query)).await;
        self.settle("search", outcome)
            .map(|records| rank(records, None))
    }

    /// Multi-collection search. `None` means the backend was unavailable.
    pub async fn search_combined(&self, query: &CombinedQuery<'_>) -> Option<Vec<ScoredRecord>> {
        let outcome = tokio::time::timeout(self.timeout, self.store.search_combined(query)).await;
        self.settle("combined search", outcome)
            .map(|records| rank(records, query.total_limit))
    }

    fn settle(
        &self,
        call: &str,
        outcome: Result<PortResult<Vec<ScoredRecord>>, tokio::time::error::Elapsed>,
    ) -> Option<Vec<ScoredRecord>> {
        let error = match outcome {
            Ok(Ok(records)) => return Some(records),
            Ok(Err(e)) => CoreError::Retrieval(e.to_string()),
            Err(_) => CoreError::Retrieval(format!("{} exceeded {:?}", call, self.timeout)),
        };
        warn!("Vector {} unavailable: {}", call, error);
        None
    }
}

/// Orders hits by similarity, highest first, and applies an optional cap.
fn rank(mut records: Vec<ScoredRecord>, limit: Option<u32>) -> Vec<ScoredRecord> {
    records.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    if let Some(limit) = limit {
        records.truncate(limit as usize);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Collection;

    fn hit(id: &str, similarity: f32) -> ScoredRecord {
        ScoredRecord {
            id: id.to_string(),
            content: id.to_string(),
            similarity,
            kind: Collection::Documents,
        }
    }

    #[test]
    fn rank_sorts_descending_and_caps() {
        let ranked = rank(vec![hit("a", 0.3), hit("b", 0.9), hit("c", 0.5)], Some(2));
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
    }
}
