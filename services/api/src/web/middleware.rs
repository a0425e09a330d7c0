//! services/api/src/web/middleware.rs
//!
//! Authentication and access-guard middleware for protected routes.

use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::Next,
    response::Response,
    RequestExt,
};
use neurocom_core::{AccessChain, RequestContext};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Path parameters that name the addressed content item, in lookup order.
const CONTENT_PARAMS: [&str; 2] = ["slug", "id"];

/// Middleware that validates the bearer token and extracts the user_id.
///
/// If valid, inserts a [`RequestContext`] into request extensions for handlers
/// and guards to use. If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    // 1. Extract the Authorization header
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthenticated("Token inválido ou ausente".to_string()))?;

    // 2. Verify signature and expiry
    let user_id = state.jwt.verify(token)?;

    // 3. Insert the caller into request extensions
    req.extensions_mut().insert(RequestContext::authenticated(user_id));

    Ok(next.run(req).await)
}

/// State for [`require_access`]: the guards one route runs after authentication.
#[derive(Clone)]
pub struct GuardState {
    pub app: Arc<AppState>,
    pub chain: AccessChain,
}

impl GuardState {
    pub fn new(app: Arc<AppState>, chain: AccessChain) -> Self {
        Self { app, chain }
    }
}

/// Runs the route's access chain. On success the request continues with the
/// caller's resolved record in its [`RequestContext`]; on refusal the guard's
/// error is returned as-is and the handler never runs.
pub async fn require_access(
    State(guard): State<GuardState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthenticated("Token inválido ou ausente".to_string()))?;

    let content_id = match req.extract_parts::<Path<HashMap<String, String>>>().await {
        Ok(Path(params)) => CONTENT_PARAMS
            .iter()
            .find_map(|name| params.get(*name).cloned()),
        Err(_) => None,
    };

    let ctx = guard
        .app
        .access
        .enforce(&guard.chain, ctx, content_id.as_deref())
        .await?;
    debug!("Access granted to user {} for {}", ctx.user_id, req.uri().path());

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
