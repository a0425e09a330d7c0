//! crates/neurocom_core/src/error.rs
//!
//! The closed set of failures the core services can report.

use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Resource, Tier};
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Plan '{current}' does not grant access to this resource")]
    InsufficientTier { current: Tier, allowed: Vec<Tier> },

    #[error("Monthly {resource} limit reached ({used}/{limit})")]
    QuotaExceeded {
        resource: Resource,
        limit: u32,
        used: u32,
        current: Tier,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Model returned no usable text")]
    SynthesisDegraded,

    #[error("Model call exceeded its {0:?} deadline")]
    SynthesisTimeout(Duration),

    #[error(transparent)]
    Port(#[from] PortError),
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;
