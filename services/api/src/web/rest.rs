//! services/api/src/web/rest.rs
//!
//! Contains the session and history handlers, the shared response shapes, and
//! the master definition for the OpenAPI specification.

use crate::error::ApiResult;
use crate::web::state::AppState;
use crate::web::{auth, chat, content, inbox, learning};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use neurocom_core::domain::SessionSummary;
use neurocom_core::{RequestContext, Session, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::me_handler,
        create_session_handler,
        list_sessions_handler,
        rename_session_handler,
        chat_history_handler,
        chat::chat_handler,
        chat::guide_chat_handler,
        chat::guide_history_handler,
        inbox::list_messages_handler,
        inbox::send_message_handler,
        inbox::list_bookings_handler,
        inbox::book_consultation_handler,
        inbox::cancel_booking_handler,
        content::get_video_handler,
        content::video_progress_handler,
        learning::list_tracks_handler,
        learning::get_track_handler,
        learning::start_track_handler,
        learning::complete_step_handler,
        learning::get_profile_handler,
        learning::update_profile_handler,
        content::create_reflection_handler,
        content::list_reflections_handler,
    ),
    components(
        schemas(
            HealthResponse, SessionDto, SessionSummaryDto, TurnDto,
            CreateSessionRequest, RenameSessionRequest, SessionResponse,
            SessionListResponse, ChatHistoryResponse,
            auth::SignupRequest, auth::LoginRequest, auth::UserDto,
            auth::AuthResponse, auth::MeResponse,
            chat::ChatRequest, chat::ChatResponse, chat::GuideChatRequest,
            chat::GuideChatResponse, chat::GuideHistoryResponse,
            inbox::SendMessageRequest, inbox::MessageDto, inbox::MessageResponse,
            inbox::MessageListResponse, inbox::BookConsultationRequest, inbox::BookingDto,
            inbox::BookingResponse, inbox::BookingListResponse, inbox::CancelBookingResponse,
            content::VideoDto, content::VideoProgressDto, content::VideoResponse,
            content::CreateReflectionRequest, content::ReflectionDto,
            content::ReflectionResponse, content::ReflectionListResponse,
            content::VideoProgressRequest, content::VideoProgressResponse,
            learning::TrackDto, learning::TrackSummaryDto, learning::TrackListResponse,
            learning::StepDto, learning::EnrollmentDto, learning::TrackDetailResponse,
            learning::EnrollmentResponse, learning::CompleteStepRequest,
            learning::StepCompletionResponse, learning::ProfileDto, learning::ProfileResponse,
            learning::UpdateProfileRequest,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Neurocom API", description = "Assistants, expert inbox and gated learning content.")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionDto {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionDto {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            title: session.title,
            created_at: session.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionSummaryDto {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<SessionSummary> for SessionSummaryDto {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            created_at: summary.created_at,
            last_activity: summary.last_activity,
        }
    }
}

/// One exchange of a turn stream. `created_order` is the stream's ordering key.
#[derive(Serialize, ToSchema)]
pub struct TurnDto {
    pub question: String,
    pub answer: String,
    pub followups: Vec<String>,
    pub created_order: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Turn> for TurnDto {
    fn from(turn: Turn) -> Self {
        Self {
            question: turn.question,
            answer: turn.answer,
            followups: turn.followups,
            created_order: turn.id,
            created_at: turn.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RenameSessionRequest {
    pub title: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub session: SessionDto,
}

#[derive(Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummaryDto>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatHistoryResponse {
    pub turns: Vec<TurnDto>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Create a new conversation session for the authenticated user.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .conversations
        .create_session(ctx.user_id, req.title.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session: session.into(),
        }),
    ))
}

/// List the caller's sessions, most recently active first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "The caller's sessions", body = SessionListResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<SessionListResponse>> {
    let sessions = state.conversations.list_sessions(ctx.user_id).await?;
    Ok(Json(SessionListResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

/// Rename a session the caller owns.
#[utoipa::path(
    patch,
    path = "/sessions/{id}",
    request_body = RenameSessionRequest,
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session renamed", body = SessionResponse),
        (status = 400, description = "Blank title"),
        (status = 404, description = "No such session for this user")
    ),
    security(("bearer" = []))
)]
pub async fn rename_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RenameSessionRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state
        .conversations
        .rename_session(session_id, ctx.user_id, &req.title)
        .await?;
    Ok(Json(SessionResponse {
        session: session.into(),
    }))
}

/// Full history of a session the caller owns, oldest first.
#[utoipa::path(
    get,
    path = "/chat-history/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Chronological turns", body = ChatHistoryResponse),
        (status = 404, description = "No such session for this user")
    ),
    security(("bearer" = []))
)]
pub async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ChatHistoryResponse>> {
    let turns = state
        .conversations
        .session_history(session_id, ctx.user_id)
        .await?;
    Ok(Json(ChatHistoryResponse {
        turns: turns.into_iter().map(Into::into).collect(),
    }))
}
