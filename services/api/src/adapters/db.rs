//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the persistence and retrieval ports from the `core` crate. It handles all
//! interactions with PostgreSQL (with the pgvector extension) using `sqlx`.
//!
//! Vectors travel as their text form (`[0.1,0.2,...]`) and are cast with
//! `::text::vector` inside the statement. Similarity is `1 - cosine distance`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neurocom_core::domain::{
    Booking, BookingStatus, Collection, ContentKind, ContentLevel, ConversationScope,
    ExpertMessage, HistoryPage, NewBooking, NewReflection, NewTurn, RecentVideo, Reflection,
    Resource, ScoredRecord, Session, SessionSummary, StepCompletion, StepFeedback, Tier, Track,
    TrackEnrollment, TrackProgress, TrackStatus, TrackStep, Turn, User, UserCredentials,
    UserProfile, Video, VideoProgress,
};
use neurocom_core::ports::{
    CombinedQuery, ConversationRepository, InboxRepository, LearningRepository, PortError,
    PortResult, ReflectionRepository, SimilarityQuery, UserRepository, VectorStore,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every persistence port plus `VectorStore`.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Renders a vector in pgvector's text input format.
pub(crate) fn vector_to_pg(vec: &[f32]) -> String {
    let mut out = String::with_capacity(vec.len() * 8);
    out.push('[');
    for (i, value) in vec.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

fn collection_kind(collection: Collection) -> &'static str {
    match collection {
        Collection::Documents => "documents",
        Collection::Reflections => "reflections",
        Collection::SessionHistory => "session_history",
        Collection::ContinuousHistory => "continuous_history",
    }
}

fn parse_collection(kind: &str) -> PortResult<Collection> {
    match kind {
        "documents" => Ok(Collection::Documents),
        "reflections" => Ok(Collection::Reflections),
        "session_history" => Ok(Collection::SessionHistory),
        "continuous_history" => Ok(Collection::ContinuousHistory),
        other => Err(PortError::Unexpected(format!("Unknown collection '{}'", other))),
    }
}

/// The rows a collection searches over, as `(id, content, embedding, created_at)`.
/// `$2` is the user id and `$3` the session id (NULL for the continuous stream).
fn collection_source(collection: Collection) -> &'static str {
    match collection {
        Collection::Documents => {
            "SELECT id::text AS id, content, embedding, created_at FROM documents"
        }
        Collection::Reflections => {
            "SELECT id::text AS id, content, embedding, created_at FROM reflections \
             WHERE user_id = $2 AND embedding IS NOT NULL"
        }
        Collection::SessionHistory | Collection::ContinuousHistory => {
            "SELECT id::text AS id, question || E'\\n' || answer AS content, embedding, created_at \
             FROM turns \
             WHERE user_id = $2 AND session_id IS NOT DISTINCT FROM $3 AND embedding IS NOT NULL"
        }
    }
}

fn usage_column(resource: Resource) -> &'static str {
    match resource {
        Resource::Messages => "messages_sent_this_month",
        Resource::Consultations => "consultations_booked_this_month",
    }
}

fn to_u32(value: i32) -> u32 {
    value.max(0) as u32
}

fn parse_level(raw: &str) -> PortResult<ContentLevel> {
    raw.parse::<Tier>()
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, email, tier, messages_sent_this_month, \
                            consultations_booked_this_month, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: Option<String>,
    email: String,
    tier: String,
    messages_sent_this_month: i32,
    consultations_booked_this_month: i32,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        let tier = self.tier.parse::<Tier>().unwrap_or_else(|e| {
            warn!("User {} has {}; treating as free", self.id, e);
            Tier::Free
        });
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            tier,
            messages_sent_this_month: to_u32(self.messages_sent_this_month),
            consultations_booked_this_month: to_u32(self.consultations_booked_this_month),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}

#[derive(FromRow)]
struct ProfileRecord {
    goals: Vec<String>,
    interests: Vec<String>,
    experience_level: Option<String>,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            goals: self.goals,
            interests: self.interests,
            experience_level: self.experience_level,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    title: Option<String>,
    created_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SessionSummaryRecord {
    id: Uuid,
    title: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

const TURN_COLUMNS: &str = "id, user_id, session_id, question, answer, followups, created_at";

#[derive(FromRow)]
struct TurnRecord {
    id: i64,
    user_id: Uuid,
    session_id: Option<Uuid>,
    question: String,
    answer: String,
    followups: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}
impl TurnRecord {
    fn to_domain(self) -> Turn {
        Turn {
            id: self.id,
            user_id: self.user_id,
            session_id: self.session_id,
            question: self.question,
            answer: self.answer,
            followups: self.followups.0,
            created_at: self.created_at,
        }
    }
}

const REFLECTION_COLUMNS: &str =
    "id, user_id, kind, title, content, track_id, step_id, video_id, tags, created_at";

#[derive(FromRow)]
struct ReflectionRecord {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: Option<String>,
    content: String,
    track_id: Option<Uuid>,
    step_id: Option<Uuid>,
    video_id: Option<Uuid>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
}
impl ReflectionRecord {
    fn to_domain(self) -> Reflection {
        Reflection {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            content: self.content,
            track_id: self.track_id,
            step_id: self.step_id,
            video_id: self.video_id,
            tags: self.tags,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct VideoRecord {
    id: Uuid,
    slug: String,
    title: String,
    theme: Option<String>,
    description: Option<String>,
    url: Option<String>,
    duration_seconds: Option<i32>,
    level: String,
}
impl VideoRecord {
    fn to_domain(self) -> PortResult<Video> {
        Ok(Video {
            level: parse_level(&self.level)?,
            id: self.id,
            slug: self.slug,
            title: self.title,
            theme: self.theme,
            description: self.description,
            url: self.url,
            duration_seconds: self.duration_seconds,
        })
    }
}

#[derive(FromRow)]
struct VideoProgressRecord {
    video_id: Uuid,
    position_seconds: i32,
    completed: bool,
    updated_at: DateTime<Utc>,
}
impl VideoProgressRecord {
    fn to_domain(self) -> VideoProgress {
        VideoProgress {
            video_id: self.video_id,
            position_seconds: self.position_seconds,
            completed: self.completed,
            updated_at: self.updated_at,
        }
    }
}

const TRACK_COLUMNS: &str = "id, slug, title, description, level, position";

#[derive(FromRow)]
struct TrackRecord {
    id: Uuid,
    slug: String,
    title: String,
    description: Option<String>,
    level: String,
    position: i32,
}
impl TrackRecord {
    fn to_domain(self) -> PortResult<Track> {
        Ok(Track {
            level: parse_level(&self.level)?,
            id: self.id,
            slug: self.slug,
            title: self.title,
            description: self.description,
            position: self.position,
        })
    }
}

const STEP_COLUMNS: &str = "id, track_id, position, title, video_id";

#[derive(FromRow)]
struct TrackStepRecord {
    id: Uuid,
    track_id: Uuid,
    position: i32,
    title: String,
    video_id: Option<Uuid>,
}
impl TrackStepRecord {
    fn to_domain(self) -> TrackStep {
        TrackStep {
            id: self.id,
            track_id: self.track_id,
            position: self.position,
            title: self.title,
            video_id: self.video_id,
        }
    }
}

const ENROLLMENT_COLUMNS: &str =
    "track_id, status, percent, current_step_id, completed_at, updated_at";

#[derive(FromRow)]
struct EnrollmentRecord {
    track_id: Uuid,
    status: String,
    percent: i32,
    current_step_id: Option<Uuid>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}
impl EnrollmentRecord {
    fn to_domain(self) -> PortResult<TrackEnrollment> {
        Ok(TrackEnrollment {
            status: self
                .status
                .parse::<TrackStatus>()
                .map_err(PortError::Unexpected)?,
            track_id: self.track_id,
            percent: self.percent,
            current_step_id: self.current_step_id,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct StepCompletionRecord {
    step_id: Uuid,
    completed_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TrackProgressRecord {
    track_id: Uuid,
    title: String,
    percent: i32,
}

#[derive(FromRow)]
struct RecentVideoRecord {
    title: String,
    theme: Option<String>,
    completed: bool,
}

const BOOKING_COLUMNS: &str =
    "id, user_id, starts_at, ends_at, notes, status, created_at, canceled_at";

#[derive(FromRow)]
struct BookingRecord {
    id: Uuid,
    user_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    notes: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    canceled_at: Option<DateTime<Utc>>,
}
impl BookingRecord {
    fn to_domain(self) -> PortResult<Booking> {
        Ok(Booking {
            status: self
                .status
                .parse::<BookingStatus>()
                .map_err(PortError::Unexpected)?,
            id: self.id,
            user_id: self.user_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            notes: self.notes,
            created_at: self.created_at,
            canceled_at: self.canceled_at,
        })
    }
}

#[derive(FromRow)]
struct ExpertMessageRecord {
    id: Uuid,
    user_id: Uuid,
    text: String,
    file_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}
impl ExpertMessageRecord {
    fn to_domain(self) -> ExpertMessage {
        ExpertMessage {
            id: self.id,
            user_id: self.user_id,
            text: self.text,
            file_url: self.file_url,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ScoredRow {
    id: String,
    content: String,
    similarity: f32,
    kind: String,
}
impl ScoredRow {
    fn to_domain(self) -> PortResult<ScoredRecord> {
        Ok(ScoredRecord {
            kind: parse_collection(&self.kind)?,
            id: self.id,
            content: self.content,
            similarity: self.similarity,
        })
    }
}

//=========================================================================================
// `UserRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserRepository for DbAdapter {
    async fn find_user(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn create_user(
        &self,
        name: Option<&str>,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (name, email, hashed_password) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("Email {} is already registered", email))
            }
            other => unexpected(other),
        })?;
        Ok(record.to_domain())
    }

    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| UserCredentials {
            user_id: r.id,
            email: r.email,
            hashed_password: r.hashed_password,
        }))
    }

    async fn find_profile(&self, user_id: Uuid) -> PortResult<Option<UserProfile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT goals, interests, experience_level FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProfileRecord::to_domain))
    }

    async fn save_profile(&self, user_id: Uuid, profile: &UserProfile) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "INSERT INTO user_profiles (user_id, goals, interests, experience_level) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET goals = EXCLUDED.goals, \
             interests = EXCLUDED.interests, experience_level = EXCLUDED.experience_level, \
             updated_at = now() \
             RETURNING goals, interests, experience_level",
        )
        .bind(user_id)
        .bind(&profile.goals)
        .bind(&profile.interests)
        .bind(&profile.experience_level)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn increment_usage(&self, user_id: Uuid, resource: Resource) -> PortResult<u32> {
        // Single statement so concurrent requests cannot lose an increment.
        let column = usage_column(resource);
        let sql = format!(
            "UPDATE users SET {col} = {col} + 1 WHERE id = $1 RETURNING {col}",
            col = column
        );
        let used = sqlx::query_scalar::<_, i32>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(to_u32(used))
    }
}

//=========================================================================================
// `ConversationRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConversationRepository for DbAdapter {
    async fn create_session(&self, user_id: Uuid, title: Option<&str>) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO chat_sessions (user_id, title) VALUES ($1, $2) \
             RETURNING id, user_id, title, created_at",
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn find_owned_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, user_id, title, created_at FROM chat_sessions \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn list_sessions(&self, user_id: Uuid) -> PortResult<Vec<SessionSummary>> {
        let records = sqlx::query_as::<_, SessionSummaryRecord>(
            "SELECT s.id, s.title, s.created_at, \
                    GREATEST(s.created_at, COALESCE(MAX(t.created_at), s.created_at)) AS last_activity \
             FROM chat_sessions s \
             LEFT JOIN turns t ON t.session_id = s.id \
             WHERE s.user_id = $1 \
             GROUP BY s.id \
             ORDER BY last_activity DESC, MAX(t.id) DESC NULLS LAST",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| SessionSummary {
                id: r.id,
                title: r.title,
                created_at: r.created_at,
                last_activity: r.last_activity,
            })
            .collect())
    }

    async fn update_session_title(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "UPDATE chat_sessions SET title = $3 WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, title, created_at",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn insert_turn(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        turn: &NewTurn,
    ) -> PortResult<Turn> {
        let record = sqlx::query_as::<_, TurnRecord>(&format!(
            "INSERT INTO turns (user_id, session_id, question, answer, followups, embedding) \
             VALUES ($1, $2, $3, $4, $5, $6::text::vector) RETURNING {}",
            TURN_COLUMNS
        ))
        .bind(user_id)
        .bind(scope.session_id())
        .bind(&turn.question)
        .bind(&turn.answer)
        .bind(Json(&turn.followups))
        .bind(turn.embedding.as_deref().map(vector_to_pg))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn recent_turns(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: u32,
    ) -> PortResult<Vec<Turn>> {
        let records = sqlx::query_as::<_, TurnRecord>(&format!(
            "SELECT {} FROM turns \
             WHERE user_id = $1 AND session_id IS NOT DISTINCT FROM $2 \
             ORDER BY id DESC LIMIT $3",
            TURN_COLUMNS
        ))
        .bind(user_id)
        .bind(scope.session_id())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().rev().map(TurnRecord::to_domain).collect())
    }

    async fn history_page(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: Option<u32>,
        offset: u32,
    ) -> PortResult<HistoryPage> {
        // LIMIT NULL means no limit.
        let records = sqlx::query_as::<_, TurnRecord>(&format!(
            "SELECT {} FROM turns \
             WHERE user_id = $1 AND session_id IS NOT DISTINCT FROM $2 \
             ORDER BY id DESC LIMIT $3 OFFSET $4",
            TURN_COLUMNS
        ))
        .bind(user_id)
        .bind(scope.session_id())
        .bind(limit.map(i64::from))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        let total = self.count_turns(user_id, scope).await?;
        Ok(HistoryPage {
            turns: records.into_iter().rev().map(TurnRecord::to_domain).collect(),
            total,
        })
    }

    async fn count_turns(&self, user_id: Uuid, scope: ConversationScope) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM turns WHERE user_id = $1 AND session_id IS NOT DISTINCT FROM $2",
        )
        .bind(user_id)
        .bind(scope.session_id())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count.max(0) as u64)
    }
}

//=========================================================================================
// `ReflectionRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReflectionRepository for DbAdapter {
    async fn insert_reflection(
        &self,
        user_id: Uuid,
        reflection: &NewReflection,
    ) -> PortResult<Reflection> {
        let record = sqlx::query_as::<_, ReflectionRecord>(&format!(
            "INSERT INTO reflections \
                (user_id, kind, title, content, track_id, step_id, video_id, tags, embedding) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::text::vector) RETURNING {}",
            REFLECTION_COLUMNS
        ))
        .bind(user_id)
        .bind(&reflection.kind)
        .bind(&reflection.title)
        .bind(&reflection.content)
        .bind(reflection.track_id)
        .bind(reflection.step_id)
        .bind(reflection.video_id)
        .bind(&reflection.tags)
        .bind(reflection.embedding.as_deref().map(vector_to_pg))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn recent_reflections(
        &self,
        user_id: Uuid,
        kind: Option<&str>,
        limit: u32,
    ) -> PortResult<Vec<Reflection>> {
        let records = sqlx::query_as::<_, ReflectionRecord>(&format!(
            "SELECT {} FROM reflections \
             WHERE user_id = $1 AND ($2::text IS NULL OR kind = $2) \
             ORDER BY created_at DESC LIMIT $3",
            REFLECTION_COLUMNS
        ))
        .bind(user_id)
        .bind(kind)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(ReflectionRecord::to_domain).collect())
    }
}

//=========================================================================================
// `LearningRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl LearningRepository for DbAdapter {
    async fn content_level(
        &self,
        kind: ContentKind,
        identifier: &str,
    ) -> PortResult<Option<ContentLevel>> {
        let table = match kind {
            ContentKind::Video => "videos",
            ContentKind::Track => "tracks",
        };
        let level = sqlx::query_scalar::<_, String>(&format!(
            "SELECT level FROM {} WHERE slug = $1 OR id::text = $1 LIMIT 1",
            table
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        level.as_deref().map(parse_level).transpose()
    }

    async fn find_video(&self, slug: &str) -> PortResult<Option<Video>> {
        let record = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, slug, title, theme, description, url, duration_seconds, level \
             FROM videos WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(VideoRecord::to_domain).transpose()
    }

    async fn video_progress(
        &self,
        user_id: Uuid,
        video_id: Uuid,
    ) -> PortResult<Option<VideoProgress>> {
        let record = sqlx::query_as::<_, VideoProgressRecord>(
            "SELECT video_id, position_seconds, completed, updated_at FROM video_progress \
             WHERE user_id = $1 AND video_id = $2",
        )
        .bind(user_id)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(VideoProgressRecord::to_domain))
    }

    async fn save_video_progress(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        position_seconds: i32,
        completed: bool,
    ) -> PortResult<VideoProgress> {
        let record = sqlx::query_as::<_, VideoProgressRecord>(
            "INSERT INTO video_progress (user_id, video_id, position_seconds, completed) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, video_id) DO UPDATE SET \
             position_seconds = EXCLUDED.position_seconds, completed = EXCLUDED.completed, \
             updated_at = now() \
             RETURNING video_id, position_seconds, completed, updated_at",
        )
        .bind(user_id)
        .bind(video_id)
        .bind(position_seconds)
        .bind(completed)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn tracks_in_progress(&self, user_id: Uuid) -> PortResult<Vec<TrackProgress>> {
        let records = sqlx::query_as::<_, TrackProgressRecord>(
            "SELECT tp.track_id, t.title, tp.percent \
             FROM track_progress tp JOIN tracks t ON t.id = tp.track_id \
             WHERE tp.user_id = $1 AND tp.status = 'in_progress' \
             ORDER BY tp.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| TrackProgress {
                track_id: r.track_id,
                title: r.title,
                percent: r.percent,
            })
            .collect())
    }

    async fn recent_videos(&self, user_id: Uuid, limit: u32) -> PortResult<Vec<RecentVideo>> {
        let records = sqlx::query_as::<_, RecentVideoRecord>(
            "SELECT v.title, v.theme, vp.completed \
             FROM video_progress vp JOIN videos v ON v.id = vp.video_id \
             WHERE vp.user_id = $1 \
             ORDER BY vp.updated_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| RecentVideo {
                title: r.title,
                theme: r.theme,
                completed: r.completed,
            })
            .collect())
    }

    async fn list_tracks(&self, levels: &[ContentLevel]) -> PortResult<Vec<Track>> {
        let levels: Vec<String> = levels.iter().map(|l| l.as_str().to_string()).collect();
        let records = sqlx::query_as::<_, TrackRecord>(&format!(
            "SELECT {} FROM tracks WHERE level = ANY($1) ORDER BY position, title",
            TRACK_COLUMNS
        ))
        .bind(&levels)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(TrackRecord::to_domain).collect()
    }

    async fn find_track(&self, identifier: &str) -> PortResult<Option<Track>> {
        let record = sqlx::query_as::<_, TrackRecord>(&format!(
            "SELECT {} FROM tracks WHERE slug = $1 OR id::text = $1 LIMIT 1",
            TRACK_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(TrackRecord::to_domain).transpose()
    }

    async fn track_steps(&self, track_id: Uuid) -> PortResult<Vec<TrackStep>> {
        let records = sqlx::query_as::<_, TrackStepRecord>(&format!(
            "SELECT {} FROM track_steps WHERE track_id = $1 ORDER BY position",
            STEP_COLUMNS
        ))
        .bind(track_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(TrackStepRecord::to_domain).collect())
    }

    async fn find_step(&self, step_id: Uuid) -> PortResult<Option<TrackStep>> {
        let record = sqlx::query_as::<_, TrackStepRecord>(&format!(
            "SELECT {} FROM track_steps WHERE id = $1",
            STEP_COLUMNS
        ))
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(TrackStepRecord::to_domain))
    }

    async fn enrollments(&self, user_id: Uuid) -> PortResult<Vec<TrackEnrollment>> {
        let records = sqlx::query_as::<_, EnrollmentRecord>(&format!(
            "SELECT {} FROM track_progress WHERE user_id = $1 ORDER BY updated_at DESC",
            ENROLLMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(EnrollmentRecord::to_domain).collect()
    }

    async fn save_enrollment(
        &self,
        user_id: Uuid,
        enrollment: &TrackEnrollment,
    ) -> PortResult<TrackEnrollment> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(&format!(
            "INSERT INTO track_progress \
             (user_id, track_id, status, percent, current_step_id, completed_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, track_id) DO UPDATE SET status = EXCLUDED.status, \
             percent = EXCLUDED.percent, current_step_id = EXCLUDED.current_step_id, \
             completed_at = EXCLUDED.completed_at, updated_at = EXCLUDED.updated_at \
             RETURNING {}",
            ENROLLMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(enrollment.track_id)
        .bind(enrollment.status.as_str())
        .bind(enrollment.percent)
        .bind(enrollment.current_step_id)
        .bind(enrollment.completed_at)
        .bind(enrollment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn save_step_completion(
        &self,
        user_id: Uuid,
        step_id: Uuid,
        feedback: &StepFeedback,
    ) -> PortResult<StepCompletion> {
        let record = sqlx::query_as::<_, StepCompletionRecord>(
            "INSERT INTO step_completions (user_id, step_id, rating, feedback) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, step_id) DO UPDATE SET \
             rating = EXCLUDED.rating, feedback = EXCLUDED.feedback \
             RETURNING step_id, completed_at",
        )
        .bind(user_id)
        .bind(step_id)
        .bind(feedback.rating)
        .bind(&feedback.feedback)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(StepCompletion {
            step_id: record.step_id,
            completed_at: record.completed_at,
        })
    }

    async fn step_completions(
        &self,
        user_id: Uuid,
        track_id: Uuid,
    ) -> PortResult<Vec<StepCompletion>> {
        let records = sqlx::query_as::<_, StepCompletionRecord>(
            "SELECT sc.step_id, sc.completed_at \
             FROM step_completions sc JOIN track_steps ts ON ts.id = sc.step_id \
             WHERE sc.user_id = $1 AND ts.track_id = $2",
        )
        .bind(user_id)
        .bind(track_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| StepCompletion {
                step_id: r.step_id,
                completed_at: r.completed_at,
            })
            .collect())
    }
}

//=========================================================================================
// `InboxRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl InboxRepository for DbAdapter {
    async fn insert_booking(&self, user_id: Uuid, booking: &NewBooking) -> PortResult<Booking> {
        let record = sqlx::query_as::<_, BookingRecord>(&format!(
            "INSERT INTO bookings (user_id, starts_at, ends_at, notes) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .bind(booking.starts_at)
        .bind(booking.ends_at)
        .bind(&booking.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn list_bookings(&self, user_id: Uuid) -> PortResult<Vec<Booking>> {
        let records = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY starts_at ASC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(BookingRecord::to_domain).collect()
    }

    async fn cancel_booking(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
    ) -> PortResult<Option<Booking>> {
        let record = sqlx::query_as::<_, BookingRecord>(&format!(
            "UPDATE bookings SET status = 'canceled', canceled_at = COALESCE(canceled_at, now()) \
             WHERE id = $1 AND user_id = $2 RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(BookingRecord::to_domain).transpose()
    }

    async fn insert_message(
        &self,
        user_id: Uuid,
        text: &str,
        file_url: Option<&str>,
    ) -> PortResult<ExpertMessage> {
        let record = sqlx::query_as::<_, ExpertMessageRecord>(
            "INSERT INTO expert_messages (user_id, text, file_url) VALUES ($1, $2, $3) \
             RETURNING id, user_id, text, file_url, status, created_at",
        )
        .bind(user_id)
        .bind(text)
        .bind(file_url)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_messages(&self, user_id: Uuid) -> PortResult<Vec<ExpertMessage>> {
        let records = sqlx::query_as::<_, ExpertMessageRecord>(
            "SELECT id, user_id, text, file_url, status, created_at FROM expert_messages \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(ExpertMessageRecord::to_domain).collect())
    }
}

//=========================================================================================
// `VectorStore` Trait Implementation
//=========================================================================================

/// Top `$4` candidates by distance, then the `$5` floor, then the best `$6`.
fn similarity_sql(collection: Collection) -> String {
    format!(
        "WITH q AS (SELECT $1::text::vector AS v) \
         SELECT id, content, similarity, '{kind}'::text AS kind FROM ( \
             SELECT src.id, src.content, (1 - (src.embedding <=> q.v))::real AS similarity \
             FROM ({source}) src, q \
             ORDER BY src.embedding <=> q.v \
             LIMIT $4 \
         ) candidates \
         WHERE similarity >= $5 \
         ORDER BY similarity DESC \
         LIMIT $6",
        kind = collection_kind(collection),
        source = collection_source(collection),
    )
}

/// One CTE per requested kind, unioned and ranked in a single statement.
///
/// Parameters: `$1` vector, `$2` user, `$3` session, `$4` recency half-life in
/// seconds (NULL disables weighting), `$5` total limit (NULL for all), then a
/// `(k, floor)` pair per kind. Documents are never recency-weighted.
fn combined_sql(kinds: &[Collection]) -> String {
    let mut ctes = vec!["q AS (SELECT $1::text::vector AS v)".to_string()];
    let mut branches = Vec::with_capacity(kinds.len());
    for (i, collection) in kinds.iter().enumerate() {
        let k_param = 6 + 2 * i;
        let floor_param = k_param + 1;
        ctes.push(format!(
            "c{i} AS ( \
                 SELECT src.id, src.content, \
                        (1 - (src.embedding <=> q.v))::real AS similarity, \
                        '{kind}'::text AS kind, src.created_at \
                 FROM ({source}) src, q \
                 ORDER BY src.embedding <=> q.v \
                 LIMIT ${k_param} \
             )",
            kind = collection_kind(*collection),
            source = collection_source(*collection),
        ));
        branches.push(format!(
            "SELECT * FROM c{i} WHERE similarity >= ${floor_param}"
        ));
    }
    format!(
        "WITH {ctes} \
         SELECT id, content, similarity, kind FROM ({branches}) hits \
         ORDER BY similarity * CASE \
             WHEN $4::float8 IS NULL OR kind = 'documents' THEN 1.0::float8 \
             ELSE power(0.5::float8, EXTRACT(EPOCH FROM (now() - created_at))::float8 / $4::float8) \
         END DESC \
         LIMIT $5",
        ctes = ctes.join(", "),
        branches = branches.join(" UNION ALL "),
    )
}

#[async_trait]
impl VectorStore for DbAdapter {
    async fn search(&self, query: &SimilarityQuery<'_>) -> PortResult<Vec<ScoredRecord>> {
        let pool = query.candidate_pool.unwrap_or(query.k).max(query.k);
        let rows = sqlx::query_as::<_, ScoredRow>(&similarity_sql(query.collection))
            .bind(vector_to_pg(query.vector))
            .bind(query.user_id)
            .bind(query.scope.session_id())
            .bind(pool as i64)
            .bind(query.min_similarity)
            .bind(query.k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        rows.into_iter().map(ScoredRow::to_domain).collect()
    }

    async fn search_combined(&self, query: &CombinedQuery<'_>) -> PortResult<Vec<ScoredRecord>> {
        if query.kinds.is_empty() {
            return Ok(Vec::new());
        }
        let kinds: Vec<Collection> = query.kinds.iter().map(|k| k.collection).collect();
        let sql = combined_sql(&kinds);

        let mut statement = sqlx::query_as::<_, ScoredRow>(&sql)
            .bind(vector_to_pg(query.vector))
            .bind(query.user_id)
            .bind(query.scope.session_id())
            .bind(query.recency_half_life_secs.map(|s| s as f64))
            .bind(query.total_limit.map(i64::from));
        for kind in &query.kinds {
            statement = statement.bind(kind.k as i64).bind(kind.min_similarity);
        }

        let rows = statement.fetch_all(&self.pool).await.map_err(unexpected)?;
        rows.into_iter().map(ScoredRow::to_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_render_in_pgvector_text_format() {
        assert_eq!(vector_to_pg(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_to_pg(&[]), "[]");
    }

    #[test]
    fn combined_sql_numbers_parameters_per_kind() {
        let sql = combined_sql(&[Collection::Documents, Collection::SessionHistory]);

        assert!(sql.contains("c0 AS"));
        assert!(sql.contains("c1 AS"));
        assert!(sql.contains("LIMIT $6"));
        assert!(sql.contains("similarity >= $7"));
        assert!(sql.contains("LIMIT $8"));
        assert!(sql.contains("similarity >= $9"));
        assert!(sql.contains("UNION ALL"));
        assert!(sql.contains("session_id IS NOT DISTINCT FROM $3"));
    }

    #[test]
    fn collection_names_round_trip() {
        for collection in [
            Collection::Documents,
            Collection::Reflections,
            Collection::SessionHistory,
            Collection::ContinuousHistory,
        ] {
            assert_eq!(parse_collection(collection_kind(collection)).unwrap(), collection);
        }
        assert!(parse_collection("videos").is_err());
    }
}
