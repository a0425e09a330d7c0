//! services/api/src/web/content.rs
//!
//! Gated learning content and the user's reflection journal.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use neurocom_core::domain::{NewReflection, Video, VideoProgress, VideoProgressUpdate};
use neurocom_core::{Reflection, RequestContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct VideoDto {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub theme: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub level: String,
}

impl From<Video> for VideoDto {
    fn from(video: Video) -> Self {
        Self {
            id: video.id,
            slug: video.slug,
            title: video.title,
            theme: video.theme,
            description: video.description,
            url: video.url,
            duration_seconds: video.duration_seconds,
            level: video.level.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VideoProgressDto {
    pub video_id: Uuid,
    pub position_seconds: i32,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoProgress> for VideoProgressDto {
    fn from(progress: VideoProgress) -> Self {
        Self {
            video_id: progress.video_id,
            position_seconds: progress.position_seconds,
            completed: progress.completed,
            updated_at: progress.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VideoResponse {
    pub video: VideoDto,
    pub progress: Option<VideoProgressDto>,
}

/// GET /videos/{slug}. The content-level guard has already run when this executes.
#[utoipa::path(
    get,
    path = "/videos/{slug}",
    params(("slug" = String, Path, description = "Video slug")),
    responses(
        (status = 200, description = "The video and the caller's progress", body = VideoResponse),
        (status = 403, description = "Plan below the video's level"),
        (status = 404, description = "Unknown video")
    ),
    security(("bearer" = []))
)]
pub async fn get_video_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
) -> ApiResult<Json<VideoResponse>> {
    let (video, progress) = state.learning.video(ctx.user_id, &slug).await?;

    Ok(Json(VideoResponse {
        video: video.into(),
        progress: progress.map(Into::into),
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct VideoProgressRequest {
    pub position_seconds: i32,
    /// Forces the completion flag; otherwise derived from the position.
    pub completed: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct VideoProgressResponse {
    pub progress: VideoProgressDto,
}

/// POST /videos/{slug}/progress. Gated like the video itself.
#[utoipa::path(
    post,
    path = "/videos/{slug}/progress",
    params(("slug" = String, Path, description = "Video slug")),
    request_body = VideoProgressRequest,
    responses(
        (status = 200, description = "Stored position", body = VideoProgressResponse),
        (status = 400, description = "Negative position"),
        (status = 403, description = "Plan below the video's level"),
        (status = 404, description = "Unknown video")
    ),
    security(("bearer" = []))
)]
pub async fn video_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
    Json(req): Json<VideoProgressRequest>,
) -> ApiResult<Json<VideoProgressResponse>> {
    let progress = state
        .learning
        .record_video_progress(
            ctx.user_id,
            &slug,
            VideoProgressUpdate {
                position_seconds: req.position_seconds,
                completed: req.completed,
            },
        )
        .await?;
    Ok(Json(VideoProgressResponse {
        progress: progress.into(),
    }))
}

//=========================================================================================
// Reflections
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateReflectionRequest {
    /// Free-form category, `livre` when omitted.
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: Option<String>,
    pub content: String,
    pub track_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub video_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReflectionDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub content: String,
    pub track_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub video_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Reflection> for ReflectionDto {
    fn from(r: Reflection) -> Self {
        Self {
            id: r.id,
            kind: r.kind,
            title: r.title,
            content: r.content,
            track_id: r.track_id,
            step_id: r.step_id,
            video_id: r.video_id,
            tags: r.tags,
            created_at: r.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReflectionResponse {
    pub reflection: ReflectionDto,
}

#[derive(Serialize, ToSchema)]
pub struct ReflectionListResponse {
    pub reflections: Vec<ReflectionDto>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReflectionParams {
    pub kind: Option<String>,
    pub limit: Option<u32>,
}

#[utoipa::path(
    post,
    path = "/reflections",
    request_body = CreateReflectionRequest,
    responses(
        (status = 201, description = "Reflection stored", body = ReflectionResponse),
        (status = 400, description = "Empty content")
    ),
    security(("bearer" = []))
)]
pub async fn create_reflection_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateReflectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let reflection = state
        .journal
        .record(
            ctx.user_id,
            NewReflection {
                kind: req.kind,
                title: req.title,
                content: req.content,
                track_id: req.track_id,
                step_id: req.step_id,
                video_id: req.video_id,
                tags: req.tags,
                embedding: None,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReflectionResponse {
            reflection: reflection.into(),
        }),
    ))
}

/// The caller's reflections, newest first.
#[utoipa::path(
    get,
    path = "/reflections",
    params(ReflectionParams),
    responses((status = 200, description = "Recent reflections", body = ReflectionListResponse)),
    security(("bearer" = []))
)]
pub async fn list_reflections_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ReflectionParams>,
) -> ApiResult<Json<ReflectionListResponse>> {
    let reflections = state
        .journal
        .recent(ctx.user_id, params.kind.as_deref(), params.limit)
        .await?;
    Ok(Json(ReflectionListResponse {
        reflections: reflections.into_iter().map(Into::into).collect(),
    }))
}
