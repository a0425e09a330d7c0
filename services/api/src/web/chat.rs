//! services/api/src/web/chat.rs
//!
//! Handlers for the two assistants: the session-scoped conversational chat and
//! the guardian, which keeps one continuous stream per user.

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use neurocom_core::{ConversationScope, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::rest::TurnDto;
use crate::web::state::AppState;

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 200;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// Continue this session; a new one is created when absent.
    pub session_id: Option<Uuid>,
    /// `false` skips follow-up question generation for this turn.
    #[serde(alias = "gerar_perguntas")]
    pub followups: Option<bool>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: Uuid,
    pub followups: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct GuideChatRequest {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuideChatResponse {
    pub answer: String,
    /// Absent when the turn could not be stored.
    pub turn_id: Option<i64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct GuideHistoryResponse {
    pub turns: Vec<TurnDto>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// One turn of the conversational assistant.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer for the turn", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 404, description = "No such session for this user"),
        (status = 504, description = "The model did not answer in time")
    ),
    security(("bearer" = []))
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let reply = state
        .chat
        .converse(ctx.user_id, &req.message, req.session_id, req.followups)
        .await?;
    Ok(Json(ChatResponse {
        answer: reply.answer,
        session_id: reply.session_id,
        followups: reply.followups,
    }))
}

/// One turn of the guardian assistant.
#[utoipa::path(
    post,
    path = "/guide/chat",
    request_body = GuideChatRequest,
    responses(
        (status = 200, description = "Answer for the turn", body = GuideChatResponse),
        (status = 400, description = "Empty message"),
        (status = 504, description = "The model did not answer in time")
    ),
    security(("bearer" = []))
)]
pub async fn guide_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<GuideChatRequest>,
) -> ApiResult<Json<GuideChatResponse>> {
    let reply = state.chat.guide(ctx.user_id, &req.message).await?;
    Ok(Json(GuideChatResponse {
        answer: reply.answer,
        turn_id: reply.turn_id,
    }))
}

/// A page of the guardian stream counted back from the newest turn,
/// returned oldest first.
#[utoipa::path(
    get,
    path = "/guide/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Chronological page of turns", body = GuideHistoryResponse)
    ),
    security(("bearer" = []))
)]
pub async fn guide_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<GuideHistoryResponse>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let page = state
        .conversations
        .history(ctx.user_id, ConversationScope::Continuous, Some(limit), offset)
        .await?;
    Ok(Json(GuideHistoryResponse {
        turns: page.turns.into_iter().map(Into::into).collect(),
        total: page.total,
        limit,
        offset,
    }))
}
