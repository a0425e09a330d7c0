//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and the one
//! place where errors become HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use neurocom_core::domain::{Resource, Tier};
use neurocom_core::ports::PortError;
use neurocom_core::CoreError;
use serde_json::{json, Value};
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A failure reported by a core service, including guard refusals.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing, malformed or expired bearer credential.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

//=========================================================================================
// Error-to-HTTP Mapping
//=========================================================================================

const GENERIC_FAILURE: &str = "Erro interno do servidor";

impl ApiError {
    /// The status code and JSON body for this error. Every endpoint goes
    /// through here, so all refusals share one shape.
    pub fn to_response_parts(&self) -> (StatusCode, Value) {
        match self {
            ApiError::Core(err) => core_parts(err),
            ApiError::Port(err) => port_parts(err),
            ApiError::Unauthenticated(msg) => body(StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            ApiError::BadRequest(msg) => body(StatusCode::BAD_REQUEST, "validation", msg),
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => internal(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, payload) = self.to_response_parts();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        (status, Json(payload)).into_response()
    }
}

fn core_parts(err: &CoreError) -> (StatusCode, Value) {
    match err {
        CoreError::Unauthenticated => body(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "Token inválido ou ausente",
        ),
        CoreError::UserNotFound(_) => {
            body(StatusCode::NOT_FOUND, "user_not_found", "Usuário não encontrado")
        }
        CoreError::InsufficientTier { current, allowed } => {
            let required = allowed.iter().min_by_key(|t| t.rank()).copied();
            (
                StatusCode::FORBIDDEN,
                json!({
                    "erro": "Recurso exclusivo para assinantes",
                    "code": "insufficient_tier",
                    "plano_atual": current.as_str(),
                    "planos_permitidos": allowed.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                    "requer_plano": required.map(Tier::as_str),
                    "sugestao": match required {
                        Some(tier) => format!("Faça upgrade para o plano {} ou superior", tier),
                        None => "Faça upgrade do seu plano para acessar este recurso".to_string(),
                    },
                }),
            )
        }
        CoreError::QuotaExceeded {
            resource,
            limit,
            used,
            current,
        } => (
            StatusCode::FORBIDDEN,
            json!({
                "erro": format!("Limite de {} atingido", resource_label(*resource)),
                "code": "quota_exceeded",
                "limite": limit,
                "usados": used,
                "plano_atual": current.as_str(),
                "sugestao": "Faça upgrade para o plano full para acesso ilimitado",
            }),
        ),
        CoreError::NotFound(msg) => body(StatusCode::NOT_FOUND, "not_found", msg),
        CoreError::Validation(msg) => body(StatusCode::BAD_REQUEST, "validation", msg),
        CoreError::SynthesisTimeout(_) => body(
            StatusCode::GATEWAY_TIMEOUT,
            "synthesis_timeout",
            "Falha ao processar pergunta, tente novamente",
        ),
        CoreError::Port(err) => port_parts(err),
        CoreError::Embedding(_) | CoreError::Retrieval(_) | CoreError::SynthesisDegraded => {
            internal()
        }
    }
}

fn port_parts(err: &PortError) -> (StatusCode, Value) {
    match err {
        PortError::NotFound(msg) => body(StatusCode::NOT_FOUND, "not_found", msg),
        PortError::Conflict(msg) => body(StatusCode::CONFLICT, "conflict", msg),
        PortError::Unauthorized => body(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "Token inválido ou ausente",
        ),
        PortError::Unexpected(_) => internal(),
    }
}

fn resource_label(resource: Resource) -> &'static str {
    match resource {
        Resource::Messages => "mensagens",
        Resource::Consultations => "consultas",
    }
}

fn body(status: StatusCode, code: &str, message: &str) -> (StatusCode, Value) {
    (status, json!({ "erro": message, "code": code }))
}

fn internal() -> (StatusCode, Value) {
    body(StatusCode::INTERNAL_SERVER_ERROR, "internal", GENERIC_FAILURE)
}
