//! services/api/src/lib.rs
//!
//! The HTTP service: concrete adapters for the core ports, configuration,
//! the error-to-HTTP mapping and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
