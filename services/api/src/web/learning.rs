//! services/api/src/web/learning.rs
//!
//! Learning tracks, their steps and the developer profile used by the guardian.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use neurocom_core::domain::{ProfileUpdate, StepFeedback, Track, TrackEnrollment};
use neurocom_core::learning::StepState;
use neurocom_core::{CoreError, RequestContext, TrackOverview, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::state::AppState;

//=========================================================================================
// Tracks
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct TrackDto {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub level: String,
}

impl From<Track> for TrackDto {
    fn from(track: Track) -> Self {
        Self {
            id: track.id,
            slug: track.slug,
            title: track.title,
            description: track.description,
            level: track.level.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EnrollmentDto {
    pub track_id: Uuid,
    pub status: String,
    pub percent: i32,
    pub current_step_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<TrackEnrollment> for EnrollmentDto {
    fn from(e: TrackEnrollment) -> Self {
        Self {
            track_id: e.track_id,
            status: e.status.as_str().to_string(),
            percent: e.percent,
            current_step_id: e.current_step_id,
            completed_at: e.completed_at,
            updated_at: e.updated_at,
        }
    }
}

/// A catalog entry. `status` is absent for tracks the caller never started.
#[derive(Serialize, ToSchema)]
pub struct TrackSummaryDto {
    #[serde(flatten)]
    pub track: TrackDto,
    pub status: Option<String>,
    pub percent: i32,
}

impl From<TrackOverview> for TrackSummaryDto {
    fn from(overview: TrackOverview) -> Self {
        Self {
            status: overview
                .enrollment
                .as_ref()
                .map(|e| e.status.as_str().to_string()),
            percent: overview.enrollment.map_or(0, |e| e.percent),
            track: overview.track.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TrackListResponse {
    pub tracks: Vec<TrackSummaryDto>,
}

#[derive(Serialize, ToSchema)]
pub struct StepDto {
    pub id: Uuid,
    pub position: i32,
    pub title: String,
    pub video_id: Option<Uuid>,
    /// `completed` or `pending`.
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<StepState> for StepDto {
    fn from(state: StepState) -> Self {
        Self {
            id: state.step.id,
            position: state.step.position,
            title: state.step.title,
            video_id: state.step.video_id,
            status: if state.completed_at.is_some() {
                "completed"
            } else {
                "pending"
            }
            .to_string(),
            completed_at: state.completed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TrackDetailResponse {
    pub track: TrackDto,
    pub steps: Vec<StepDto>,
    pub progress: Option<EnrollmentDto>,
}

#[derive(Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub progress: EnrollmentDto,
}

/// Tracks open to the caller's plan, in catalog order.
#[utoipa::path(
    get,
    path = "/tracks",
    responses((status = 200, description = "Track catalog", body = TrackListResponse)),
    security(("bearer" = []))
)]
pub async fn list_tracks_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<TrackListResponse>> {
    let ctx = state.access.resolve(ctx).await?;
    let user = ctx.user().ok_or(CoreError::UserNotFound(ctx.user_id))?;
    let tracks = state.learning.catalog(user).await?;
    Ok(Json(TrackListResponse {
        tracks: tracks.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/tracks/{slug}",
    params(("slug" = String, Path, description = "Track slug or id")),
    responses(
        (status = 200, description = "Track with its steps", body = TrackDetailResponse),
        (status = 403, description = "Plan below the track's level"),
        (status = 404, description = "Unknown track")
    ),
    security(("bearer" = []))
)]
pub async fn get_track_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
) -> ApiResult<Json<TrackDetailResponse>> {
    let detail = state.learning.track(ctx.user_id, &slug).await?;
    Ok(Json(TrackDetailResponse {
        track: detail.track.into(),
        steps: detail.steps.into_iter().map(Into::into).collect(),
        progress: detail.enrollment.map(Into::into),
    }))
}

#[utoipa::path(
    post,
    path = "/tracks/{slug}/start",
    params(("slug" = String, Path, description = "Track slug or id")),
    responses(
        (status = 200, description = "The caller's enrollment", body = EnrollmentResponse),
        (status = 403, description = "Plan below the track's level"),
        (status = 404, description = "Unknown track")
    ),
    security(("bearer" = []))
)]
pub async fn start_track_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
) -> ApiResult<Json<EnrollmentResponse>> {
    let enrollment = state.learning.start_track(ctx.user_id, &slug).await?;
    Ok(Json(EnrollmentResponse {
        progress: enrollment.into(),
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct CompleteStepRequest {
    /// 1 to 5.
    pub rating: Option<i16>,
    pub feedback: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StepCompletionResponse {
    pub ok: bool,
    pub percent: i32,
    pub next_step_id: Option<Uuid>,
    pub track_completed: bool,
}

#[utoipa::path(
    post,
    path = "/steps/{id}/complete",
    params(("id" = Uuid, Path, description = "Step id")),
    request_body = CompleteStepRequest,
    responses(
        (status = 200, description = "Updated track progress", body = StepCompletionResponse),
        (status = 400, description = "Rating out of range"),
        (status = 403, description = "Plan below the track's level"),
        (status = 404, description = "Unknown step")
    ),
    security(("bearer" = []))
)]
pub async fn complete_step_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(step_id): Path<Uuid>,
    Json(req): Json<CompleteStepRequest>,
) -> ApiResult<Json<StepCompletionResponse>> {
    let ctx = state.access.resolve(ctx).await?;
    let user = ctx.user().ok_or(CoreError::UserNotFound(ctx.user_id))?;

    let outcome = state
        .learning
        .complete_step(
            user,
            step_id,
            StepFeedback {
                rating: req.rating,
                feedback: req.feedback,
            },
        )
        .await?;
    Ok(Json(StepCompletionResponse {
        ok: true,
        percent: outcome.enrollment.percent,
        next_step_id: outcome.next_step_id,
        track_completed: outcome.track_completed(),
    }))
}

//=========================================================================================
// Developer Profile
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ProfileDto {
    pub goals: Vec<String>,
    pub interests: Vec<String>,
    pub experience_level: Option<String>,
}

impl From<UserProfile> for ProfileDto {
    fn from(p: UserProfile) -> Self {
        Self {
            goals: p.goals,
            interests: p.interests,
            experience_level: p.experience_level,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub profile: Option<ProfileDto>,
}

/// Omitted fields keep their stored value.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub goals: Option<Vec<String>>,
    pub interests: Option<Vec<String>>,
    pub experience_level: Option<String>,
}

#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "The caller's profile, if any", body = ProfileResponse)),
    security(("bearer" = []))
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state.learning.profile(ctx.user_id).await?;
    Ok(Json(ProfileResponse {
        profile: profile.map(Into::into),
    }))
}

#[utoipa::path(
    patch,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "The stored profile", body = ProfileResponse)),
    security(("bearer" = []))
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state
        .learning
        .update_profile(
            ctx.user_id,
            ProfileUpdate {
                goals: req.goals,
                interests: req.interests,
                experience_level: req.experience_level,
            },
        )
        .await?;
    Ok(Json(ProfileResponse {
        profile: Some(profile.into()),
    }))
}
