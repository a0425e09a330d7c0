//! crates/neurocom_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the platform's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or model APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Booking, Collection, ContentKind, ContentLevel, ConversationScope, ExpertMessage,
    HistoryPage, NewBooking, NewReflection, NewTurn, RecentVideo, Reflection, Resource,
    ScoredRecord, Session, SessionSummary, StepCompletion, StepFeedback, Track,
    TrackEnrollment, TrackProgress, TrackStep, Turn, User, UserCredentials, UserProfile, Video,
    VideoProgress,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> PortResult<Option<User>>;

    async fn create_user(
        &self,
        name: Option<&str>,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>>;

    async fn find_profile(&self, user_id: Uuid) -> PortResult<Option<UserProfile>>;

    /// Inserts or replaces the user's profile.
    async fn save_profile(&self, user_id: Uuid, profile: &UserProfile) -> PortResult<UserProfile>;

    /// Atomically adds one to the monthly counter and returns the new value.
    async fn increment_usage(&self, user_id: Uuid, resource: Resource) -> PortResult<u32>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    // --- Sessions ---
    async fn create_session(&self, user_id: Uuid, title: Option<&str>) -> PortResult<Session>;

    /// Returns the session only if it exists AND belongs to `user_id`.
    async fn find_owned_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Session>>;

    /// Sessions ordered by last activity, most recent first.
    async fn list_sessions(&self, user_id: Uuid) -> PortResult<Vec<SessionSummary>>;

    /// Returns `None` when no session owned by `user_id` matched.
    async fn update_session_title(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> PortResult<Option<Session>>;

    // --- Turns ---
    async fn insert_turn(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        turn: &NewTurn,
    ) -> PortResult<Turn>;

    /// The last `limit` turns of the stream, returned in chronological order.
    async fn recent_turns(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: u32,
    ) -> PortResult<Vec<Turn>>;

    /// A page counted back from the newest turn, returned in chronological order.
    /// `limit = None` returns the whole stream.
    async fn history_page(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: Option<u32>,
        offset: u32,
    ) -> PortResult<HistoryPage>;

    async fn count_turns(&self, user_id: Uuid, scope: ConversationScope) -> PortResult<u64>;
}

#[async_trait]
pub trait ReflectionRepository: Send + Sync {
    async fn insert_reflection(
        &self,
        user_id: Uuid,
        reflection: &NewReflection,
    ) -> PortResult<Reflection>;

    /// Newest first.
    async fn recent_reflections(
        &self,
        user_id: Uuid,
        kind: Option<&str>,
        limit: u32,
    ) -> PortResult<Vec<Reflection>>;
}

#[async_trait]
pub trait LearningRepository: Send + Sync {
    /// Resolves the access level of a content item by slug or id.
    async fn content_level(
        &self,
        kind: ContentKind,
        identifier: &str,
    ) -> PortResult<Option<ContentLevel>>;

    async fn find_video(&self, slug: &str) -> PortResult<Option<Video>>;

    async fn video_progress(
        &self,
        user_id: Uuid,
        video_id: Uuid,
    ) -> PortResult<Option<VideoProgress>>;

    /// Upserts the caller's position in a video.
    async fn save_video_progress(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        position_seconds: i32,
        completed: bool,
    ) -> PortResult<VideoProgress>;

    async fn tracks_in_progress(&self, user_id: Uuid) -> PortResult<Vec<TrackProgress>>;

    async fn recent_videos(&self, user_id: Uuid, limit: u32) -> PortResult<Vec<RecentVideo>>;

    // --- Tracks ---

    /// Tracks at the given levels, in catalog order.
    async fn list_tracks(&self, levels: &[ContentLevel]) -> PortResult<Vec<Track>>;

    /// Looks a track up by slug or id.
    async fn find_track(&self, identifier: &str) -> PortResult<Option<Track>>;

    /// Ordered by position.
    async fn track_steps(&self, track_id: Uuid) -> PortResult<Vec<TrackStep>>;

    async fn find_step(&self, step_id: Uuid) -> PortResult<Option<TrackStep>>;

    async fn enrollments(&self, user_id: Uuid) -> PortResult<Vec<TrackEnrollment>>;

    /// Inserts or replaces the enrollment for `(user_id, enrollment.track_id)`.
    async fn save_enrollment(
        &self,
        user_id: Uuid,
        enrollment: &TrackEnrollment,
    ) -> PortResult<TrackEnrollment>;

    /// Marks a step done. Completing it again refreshes the feedback.
    async fn save_step_completion(
        &self,
        user_id: Uuid,
        step_id: Uuid,
        feedback: &StepFeedback,
    ) -> PortResult<StepCompletion>;

    /// The caller's completed steps within one track.
    async fn step_completions(
        &self,
        user_id: Uuid,
        track_id: Uuid,
    ) -> PortResult<Vec<StepCompletion>>;
}

#[async_trait]
pub trait InboxRepository: Send + Sync {
    async fn insert_booking(&self, user_id: Uuid, booking: &NewBooking) -> PortResult<Booking>;

    /// Ordered by `starts_at` ascending.
    async fn list_bookings(&self, user_id: Uuid) -> PortResult<Vec<Booking>>;

    async fn cancel_booking(&self, user_id: Uuid, booking_id: Uuid)
        -> PortResult<Option<Booking>>;

    async fn insert_message(
        &self,
        user_id: Uuid,
        text: &str,
        file_url: Option<&str>,
    ) -> PortResult<ExpertMessage>;

    /// Newest first.
    async fn list_messages(&self, user_id: Uuid) -> PortResult<Vec<ExpertMessage>>;
}

//=========================================================================================
// Retrieval Ports
//=========================================================================================

/// A single-collection similarity search.
#[derive(Debug, Clone)]
pub struct SimilarityQuery<'a> {
    pub collection: Collection,
    pub vector: &'a [f32],
    pub user_id: Uuid,
    pub scope: ConversationScope,
    pub k: u32,
    pub min_similarity: f32,
    /// How many nearest candidates the backend scans before applying the floor.
    pub candidate_pool: Option<u32>,
}

/// Per-collection limits inside a combined search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindLimit {
    pub collection: Collection,
    pub k: u32,
    pub min_similarity: f32,
}

/// A multi-collection similarity search returning one ranked list.
#[derive(Debug, Clone)]
pub struct CombinedQuery<'a> {
    pub vector: &'a [f32],
    pub user_id: Uuid,
    pub scope: ConversationScope,
    pub kinds: Vec<KindLimit>,
    pub recency_half_life_secs: Option<u64>,
    pub total_limit: Option<u32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query: &SimilarityQuery<'_>) -> PortResult<Vec<ScoredRecord>>;

    async fn search_combined(&self, query: &CombinedQuery<'_>) -> PortResult<Vec<ScoredRecord>>;
}

//=========================================================================================
// Model Ports
//=========================================================================================

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Returns the raw vector produced by the embedding model.
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>>;
}

/// Which generation a prompt is for; adapters may route them to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Answer,
    Followups,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub kind: GenerationKind,
    pub prompt: &'a str,
    pub max_output_tokens: Option<u32>,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Returns the plain text of the model's reply; empty when none could be extracted.
    async fn generate(&self, request: &GenerationRequest<'_>) -> PortResult<String>;
}
