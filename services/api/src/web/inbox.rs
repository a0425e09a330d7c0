//! services/api/src/web/inbox.rs
//!
//! Handlers for the expert inbox and consultation bookings. Every route here
//! sits behind the subscriber tier guard; the write routes also carry the
//! monthly quota guard for their resource.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use neurocom_core::domain::NewBooking;
use neurocom_core::{Booking, CoreError, ExpertMessage, RequestContext, Resource, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::state::AppState;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub text: String,
    pub file_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageDto {
    pub id: Uuid,
    pub text: String,
    pub file_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<ExpertMessage> for MessageDto {
    fn from(message: ExpertMessage) -> Self {
        Self {
            id: message.id,
            text: message.text,
            file_url: message.file_url,
            status: message.status,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: MessageDto,
}

/// `limite_mensal` is null for plans without a monthly cap.
#[derive(Serialize, ToSchema)]
pub struct MessageListResponse {
    pub messages: Vec<MessageDto>,
    pub limite_mensal: Option<u32>,
    pub enviadas_mes: u32,
    pub pode_enviar: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct BookConsultationRequest {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct BookingDto {
    pub id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingDto {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            starts_at: booking.starts_at,
            ends_at: booking.ends_at,
            notes: booking.notes,
            status: booking.status.as_str().to_string(),
            created_at: booking.created_at,
            canceled_at: booking.canceled_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookingResponse {
    pub booking: BookingDto,
}

#[derive(Serialize, ToSchema)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingDto>,
    pub limite_mensal: Option<u32>,
    pub agendadas_mes: u32,
    pub pode_agendar: bool,
}

#[derive(Serialize, ToSchema)]
pub struct CancelBookingResponse {
    pub ok: bool,
    pub booking: BookingDto,
}

/// The caller's record as loaded by the access guard.
async fn caller(state: &AppState, ctx: RequestContext) -> ApiResult<User> {
    let ctx = state.access.resolve(ctx).await?;
    let user = ctx.user().cloned().ok_or(CoreError::UserNotFound(ctx.user_id))?;
    Ok(user)
}

//=========================================================================================
// Expert Messages
//=========================================================================================

/// The caller's messages to the expert, newest first, with their monthly usage.
#[utoipa::path(
    get,
    path = "/messages",
    responses(
        (status = 200, description = "Messages and usage", body = MessageListResponse),
        (status = 403, description = "Plan does not include the expert inbox")
    ),
    security(("bearer" = []))
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<MessageListResponse>> {
    let user = caller(&state, ctx).await?;
    let messages = state.inbox.list_messages(user.id).await?;
    let status = state.inbox.status(&user, Resource::Messages);

    Ok(Json(MessageListResponse {
        messages: messages.into_iter().map(Into::into).collect(),
        limite_mensal: status.limit.value(),
        enviadas_mes: status.used,
        pode_enviar: status.can_use(),
    }))
}

/// Send a message to the expert. Counts against the monthly message quota.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Empty text"),
        (status = 403, description = "Plan too low or monthly limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = state
        .inbox
        .send_message(ctx.user_id, &req.text, req.file_url.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: message.into(),
        }),
    ))
}

//=========================================================================================
// Consultations
//=========================================================================================

/// The caller's bookings ordered by start time, with their monthly usage.
#[utoipa::path(
    get,
    path = "/schedule",
    responses(
        (status = 200, description = "Bookings and usage", body = BookingListResponse),
        (status = 403, description = "Plan does not include consultations")
    ),
    security(("bearer" = []))
)]
pub async fn list_bookings_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<BookingListResponse>> {
    let user = caller(&state, ctx).await?;
    let bookings = state.inbox.list_bookings(user.id).await?;
    let status = state.inbox.status(&user, Resource::Consultations);

    Ok(Json(BookingListResponse {
        bookings: bookings.into_iter().map(Into::into).collect(),
        limite_mensal: status.limit.value(),
        agendadas_mes: status.used,
        pode_agendar: status.can_use(),
    }))
}

/// Book a consultation. Counts against the monthly consultation quota.
#[utoipa::path(
    post,
    path = "/schedule",
    request_body = BookConsultationRequest,
    responses(
        (status = 201, description = "Consultation booked", body = BookingResponse),
        (status = 400, description = "starts_at is not before ends_at"),
        (status = 403, description = "Plan too low or monthly limit reached")
    ),
    security(("bearer" = []))
)]
pub async fn book_consultation_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<BookConsultationRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state
        .inbox
        .book_consultation(
            ctx.user_id,
            NewBooking {
                starts_at: req.starts_at,
                ends_at: req.ends_at,
                notes: req.notes,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            booking: booking.into(),
        }),
    ))
}

/// Cancel a booking the caller owns. Used quota is not refunded.
#[utoipa::path(
    delete,
    path = "/schedule/{id}",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking canceled", body = CancelBookingResponse),
        (status = 404, description = "No such booking for this user")
    ),
    security(("bearer" = []))
)]
pub async fn cancel_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<CancelBookingResponse>> {
    let booking = state.inbox.cancel_booking(ctx.user_id, booking_id).await?;
    Ok(Json(CancelBookingResponse {
        ok: true,
        booking: booking.into(),
    }))
}
