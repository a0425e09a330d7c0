//! crates/neurocom_core/src/memory.rs
//!
//! In-memory implementations of every port, for tests and local runs.
//!
//! [`InMemoryStore`] keeps all state in `HashMap`s and `Vec`s behind one
//! `std::sync::RwLock`. Vector search is brute-force cosine similarity; the
//! recency weighting of combined searches is ignored. Individual operations
//! can be made to fail with [`InMemoryStore::inject`] to exercise the
//! degradation paths.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Booking, BookingStatus, Collection, ContentKind, ContentLevel, ConversationScope,
    ExpertMessage, HistoryPage, NewBooking, NewReflection, NewTurn, RecentVideo, Reflection,
    Resource, ScoredRecord, Session, SessionSummary, StepCompletion, StepFeedback, Tier, Track,
    TrackEnrollment, TrackProgress, TrackStatus, TrackStep, Turn, User, UserCredentials,
    UserProfile, Video, VideoProgress,
};
use crate::ports::{
    CombinedQuery, ConversationRepository, EmbeddingService, GenerationKind, GenerationRequest,
    GenerationService, InboxRepository, LearningRepository, PortError, PortResult,
    ReflectionRepository, SimilarityQuery, UserRepository, VectorStore,
};

//=========================================================================================
// Store
//=========================================================================================

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    /// Single-collection similarity search.
    VectorSearch,
    /// The multi-collection similarity search.
    CombinedSearch,
    /// Any turn insert that carries an embedding.
    EmbeddedTurnInsert,
    /// Every turn insert.
    TurnInsert,
    BookingWrite,
    MessageWrite,
    UsageIncrement,
}

struct StoredTurn {
    turn: Turn,
    embedding: Option<Vec<f32>>,
}

struct StoredReflection {
    reflection: Reflection,
    embedding: Option<Vec<f32>>,
}

struct StoredDocument {
    id: Uuid,
    content: String,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    credentials: HashMap<String, UserCredentials>,
    profiles: HashMap<Uuid, UserProfile>,
    sessions: HashMap<Uuid, Session>,
    turns: Vec<StoredTurn>,
    next_turn_id: i64,
    reflections: Vec<StoredReflection>,
    documents: Vec<StoredDocument>,
    videos: Vec<Video>,
    video_progress: HashMap<(Uuid, Uuid), VideoProgress>,
    tracks: Vec<Track>,
    steps: Vec<TrackStep>,
    enrollments: HashMap<(Uuid, Uuid), TrackEnrollment>,
    completions: HashMap<(Uuid, Uuid), (StepCompletion, StepFeedback)>,
    bookings: Vec<Booking>,
    messages: Vec<ExpertMessage>,
}

pub struct InMemoryStore {
    state: RwLock<State>,
    failures: RwLock<HashSet<Failure>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> PortError {
    PortError::Unexpected("in-memory store lock poisoned".to_string())
}

fn injected(failure: Failure) -> PortError {
    PortError::Unexpected(format!("injected failure: {:?}", failure))
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn in_scope(turn: &Turn, user_id: Uuid, scope: ConversationScope) -> bool {
    turn.user_id == user_id && turn.session_id == scope.session_id()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_turn_id: 1,
                ..State::default()
            }),
            failures: RwLock::new(HashSet::new()),
        }
    }

    pub fn inject(&self, failure: Failure) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(failure);
        }
    }

    pub fn clear(&self, failure: Failure) {
        if let Ok(mut failures) = self.failures.write() {
            failures.remove(&failure);
        }
    }

    fn check(&self, failure: Failure) -> PortResult<()> {
        let failures = self.failures.read().map_err(poisoned)?;
        if failures.contains(&failure) {
            Err(injected(failure))
        } else {
            Ok(())
        }
    }

    // --- Seeding ---

    /// Adds a user with zeroed counters.
    pub fn seed_user(&self, email: &str, tier: Tier) -> User {
        let user = User {
            id: Uuid::new_v4(),
            name: None,
            email: email.to_string(),
            tier,
            messages_sent_this_month: 0,
            consultations_booked_this_month: 0,
            created_at: Utc::now(),
        };
        if let Ok(mut state) = self.state.write() {
            state.users.insert(user.id, user.clone());
        }
        user
    }

    pub fn set_usage(&self, user_id: Uuid, resource: Resource, used: u32) {
        if let Ok(mut state) = self.state.write() {
            if let Some(user) = state.users.get_mut(&user_id) {
                match resource {
                    Resource::Messages => user.messages_sent_this_month = used,
                    Resource::Consultations => user.consultations_booked_this_month = used,
                }
            }
        }
    }

    pub fn set_profile(&self, user_id: Uuid, profile: UserProfile) {
        if let Ok(mut state) = self.state.write() {
            state.profiles.insert(user_id, profile);
        }
    }

    pub fn add_document(&self, content: &str, embedding: Vec<f32>) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut state) = self.state.write() {
            state.documents.push(StoredDocument {
                id,
                content: content.to_string(),
                embedding,
            });
        }
        id
    }

    pub fn add_video(&self, slug: &str, title: &str, level: ContentLevel) -> Video {
        let video = Video {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: title.to_string(),
            theme: None,
            description: None,
            url: None,
            duration_seconds: None,
            level,
        };
        if let Ok(mut state) = self.state.write() {
            state.videos.push(video.clone());
        }
        video
    }

    pub fn set_video_progress(&self, user_id: Uuid, video_id: Uuid, position: i32, completed: bool) {
        if let Ok(mut state) = self.state.write() {
            state.video_progress.insert(
                (user_id, video_id),
                VideoProgress {
                    video_id,
                    position_seconds: position,
                    completed,
                    updated_at: Utc::now(),
                },
            );
        }
    }

    pub fn set_video_duration(&self, video_id: Uuid, seconds: i32) {
        if let Ok(mut state) = self.state.write() {
            if let Some(video) = state.videos.iter_mut().find(|v| v.id == video_id) {
                video.duration_seconds = Some(seconds);
            }
        }
    }

    /// Adds a track at the end of the catalog.
    pub fn add_track(&self, slug: &str, title: &str, level: ContentLevel) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut state) = self.state.write() {
            let position = state.tracks.len() as i32 + 1;
            state.tracks.push(Track {
                id,
                slug: slug.to_string(),
                title: title.to_string(),
                description: None,
                level,
                position,
            });
        }
        id
    }

    /// Appends a step to a track.
    pub fn add_step(&self, track_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut state) = self.state.write() {
            let position = state.steps.iter().filter(|s| s.track_id == track_id).count() as i32 + 1;
            state.steps.push(TrackStep {
                id,
                track_id,
                position,
                title: title.to_string(),
                video_id: None,
            });
        }
        id
    }

    pub fn set_track_progress(&self, user_id: Uuid, track_id: Uuid, percent: i32) {
        if let Ok(mut state) = self.state.write() {
            let now = Utc::now();
            let completed = percent >= 100;
            state.enrollments.insert(
                (user_id, track_id),
                TrackEnrollment {
                    track_id,
                    status: if completed {
                        TrackStatus::Completed
                    } else {
                        TrackStatus::InProgress
                    },
                    percent,
                    current_step_id: None,
                    completed_at: completed.then_some(now),
                    updated_at: now,
                },
            );
        }
    }

    /// The stored rating and notes of a completed step.
    pub fn step_feedback(&self, user_id: Uuid, step_id: Uuid) -> Option<StepFeedback> {
        let state = self.state.read().ok()?;
        state
            .completions
            .get(&(user_id, step_id))
            .map(|(_, feedback)| feedback.clone())
    }

    // --- Inspection ---

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.read().ok()?.users.get(&user_id).cloned()
    }

    /// Every stored turn of a stream, in insertion order, with whether it
    /// carries an embedding.
    pub fn stored_turns(&self, user_id: Uuid, scope: ConversationScope) -> Vec<(Turn, bool)> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        state
            .turns
            .iter()
            .filter(|t| in_scope(&t.turn, user_id, scope))
            .map(|t| (t.turn.clone(), t.embedding.is_some()))
            .collect()
    }

    fn similar(&self, state: &State, query: &SimilarityQuery<'_>) -> Vec<ScoredRecord> {
        let candidates: Vec<(String, String, &[f32])> = match query.collection {
            Collection::Documents => state
                .documents
                .iter()
                .map(|d| (d.id.to_string(), d.content.clone(), d.embedding.as_slice()))
                .collect(),
            Collection::SessionHistory | Collection::ContinuousHistory => state
                .turns
                .iter()
                .filter(|t| in_scope(&t.turn, query.user_id, query.scope))
                .filter_map(|t| {
                    t.embedding.as_deref().map(|e| {
                        (
                            t.turn.id.to_string(),
                            format!("{}\n{}", t.turn.question, t.turn.answer),
                            e,
                        )
                    })
                })
                .collect(),
            Collection::Reflections => state
                .reflections
                .iter()
                .filter(|r| r.reflection.user_id == query.user_id)
                .filter_map(|r| {
                    r.embedding.as_deref().map(|e| {
                        (
                            r.reflection.id.to_string(),
                            r.reflection.content.clone(),
                            e,
                        )
                    })
                })
                .collect(),
        };

        let mut scored: Vec<ScoredRecord> = candidates
            .into_iter()
            .map(|(id, content, embedding)| ScoredRecord {
                id,
                content,
                similarity: cosine_sim(query.vector, embedding),
                kind: query.collection,
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        if let Some(pool) = query.candidate_pool {
            scored.truncate(pool as usize);
        }
        scored
            .into_iter()
            .filter(|r| r.similarity >= query.min_similarity)
            .take(query.k as usize)
            .collect()
    }
}

//=========================================================================================
// Persistence Ports
//=========================================================================================

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_user(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn create_user(
        &self,
        name: Option<&str>,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut state = self.state.write().map_err(poisoned)?;
        let key = email.to_lowercase();
        if state.credentials.contains_key(&key) {
            return Err(PortError::Conflict(format!("email {} already registered", email)));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.map(str::to_string),
            email: email.to_string(),
            tier: Tier::Free,
            messages_sent_this_month: 0,
            consultations_booked_this_month: 0,
            created_at: Utc::now(),
        };
        state.credentials.insert(
            key,
            UserCredentials {
                user_id: user.id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.credentials.get(&email.to_lowercase()).cloned())
    }

    async fn find_profile(&self, user_id: Uuid) -> PortResult<Option<UserProfile>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.profiles.get(&user_id).cloned())
    }

    async fn save_profile(&self, user_id: Uuid, profile: &UserProfile) -> PortResult<UserProfile> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.profiles.insert(user_id, profile.clone());
        Ok(profile.clone())
    }

    async fn increment_usage(&self, user_id: Uuid, resource: Resource) -> PortResult<u32> {
        self.check(Failure::UsageIncrement)?;
        let mut state = self.state.write().map_err(poisoned)?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        let counter = match resource {
            Resource::Messages => &mut user.messages_sent_this_month,
            Resource::Consultations => &mut user.consultations_booked_this_month,
        };
        *counter += 1;
        Ok(*counter)
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn create_session(&self, user_id: Uuid, title: Option<&str>) -> PortResult<Session> {
        let mut state = self.state.write().map_err(poisoned)?;
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            title: title.map(str::to_string),
            created_at: Utc::now(),
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_owned_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Session>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn list_sessions(&self, user_id: Uuid) -> PortResult<Vec<SessionSummary>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut summaries: Vec<SessionSummary> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| {
                let last_turn = state
                    .turns
                    .iter()
                    .filter(|t| t.turn.session_id == Some(s.id))
                    .map(|t| t.turn.created_at)
                    .max();
                SessionSummary {
                    id: s.id,
                    title: s.title.clone(),
                    created_at: s.created_at,
                    last_activity: last_turn.unwrap_or(s.created_at).max(s.created_at),
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    async fn update_session_title(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> PortResult<Option<Session>> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state
            .sessions
            .get_mut(&session_id)
            .filter(|s| s.user_id == user_id)
            .map(|s| {
                s.title = Some(title.to_string());
                s.clone()
            }))
    }

    async fn insert_turn(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        turn: &NewTurn,
    ) -> PortResult<Turn> {
        self.check(Failure::TurnInsert)?;
        if turn.embedding.is_some() {
            self.check(Failure::EmbeddedTurnInsert)?;
        }
        let mut state = self.state.write().map_err(poisoned)?;
        let id = state.next_turn_id;
        state.next_turn_id += 1;
        let stored = Turn {
            id,
            user_id,
            session_id: scope.session_id(),
            question: turn.question.clone(),
            answer: turn.answer.clone(),
            followups: turn.followups.clone(),
            created_at: Utc::now(),
        };
        state.turns.push(StoredTurn {
            turn: stored.clone(),
            embedding: turn.embedding.clone(),
        });
        Ok(stored)
    }

    async fn recent_turns(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: u32,
    ) -> PortResult<Vec<Turn>> {
        let page = self.history_page(user_id, scope, Some(limit), 0).await?;
        Ok(page.turns)
    }

    async fn history_page(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: Option<u32>,
        offset: u32,
    ) -> PortResult<HistoryPage> {
        let state = self.state.read().map_err(poisoned)?;
        let mut turns: Vec<Turn> = state
            .turns
            .iter()
            .filter(|t| in_scope(&t.turn, user_id, scope))
            .map(|t| t.turn.clone())
            .collect();
        let total = turns.len() as u64;

        turns.sort_by(|a, b| b.id.cmp(&a.id));
        let mut page: Vec<Turn> = turns
            .into_iter()
            .skip(offset as usize)
            .take(limit.map_or(usize::MAX, |l| l as usize))
            .collect();
        page.reverse();
        Ok(HistoryPage { turns: page, total })
    }

    async fn count_turns(&self, user_id: Uuid, scope: ConversationScope) -> PortResult<u64> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .turns
            .iter()
            .filter(|t| in_scope(&t.turn, user_id, scope))
            .count() as u64)
    }
}

#[async_trait]
impl ReflectionRepository for InMemoryStore {
    async fn insert_reflection(
        &self,
        user_id: Uuid,
        reflection: &NewReflection,
    ) -> PortResult<Reflection> {
        let mut state = self.state.write().map_err(poisoned)?;
        let stored = Reflection {
            id: Uuid::new_v4(),
            user_id,
            kind: reflection.kind.clone(),
            title: reflection.title.clone(),
            content: reflection.content.clone(),
            track_id: reflection.track_id,
            step_id: reflection.step_id,
            video_id: reflection.video_id,
            tags: reflection.tags.clone(),
            created_at: Utc::now(),
        };
        state.reflections.push(StoredReflection {
            reflection: stored.clone(),
            embedding: reflection.embedding.clone(),
        });
        Ok(stored)
    }

    async fn recent_reflections(
        &self,
        user_id: Uuid,
        kind: Option<&str>,
        limit: u32,
    ) -> PortResult<Vec<Reflection>> {
        let state = self.state.read().map_err(poisoned)?;
        // Insertion order is creation order.
        Ok(state
            .reflections
            .iter()
            .rev()
            .map(|r| &r.reflection)
            .filter(|r| r.user_id == user_id)
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LearningRepository for InMemoryStore {
    async fn content_level(
        &self,
        kind: ContentKind,
        identifier: &str,
    ) -> PortResult<Option<ContentLevel>> {
        let state = self.state.read().map_err(poisoned)?;
        let level = match kind {
            ContentKind::Video => state
                .videos
                .iter()
                .find(|v| v.slug == identifier || v.id.to_string() == identifier)
                .map(|v| v.level),
            ContentKind::Track => state
                .tracks
                .iter()
                .find(|t| t.slug == identifier || t.id.to_string() == identifier)
                .map(|t| t.level),
        };
        Ok(level)
    }

    async fn find_video(&self, slug: &str) -> PortResult<Option<Video>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.videos.iter().find(|v| v.slug == slug).cloned())
    }

    async fn video_progress(
        &self,
        user_id: Uuid,
        video_id: Uuid,
    ) -> PortResult<Option<VideoProgress>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.video_progress.get(&(user_id, video_id)).cloned())
    }

    async fn save_video_progress(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        position_seconds: i32,
        completed: bool,
    ) -> PortResult<VideoProgress> {
        let mut state = self.state.write().map_err(poisoned)?;
        let progress = VideoProgress {
            video_id,
            position_seconds,
            completed,
            updated_at: Utc::now(),
        };
        state
            .video_progress
            .insert((user_id, video_id), progress.clone());
        Ok(progress)
    }

    async fn tracks_in_progress(&self, user_id: Uuid) -> PortResult<Vec<TrackProgress>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .tracks
            .iter()
            .filter_map(|t| {
                let enrollment = state.enrollments.get(&(user_id, t.id))?;
                (enrollment.status == TrackStatus::InProgress).then(|| TrackProgress {
                    track_id: t.id,
                    title: t.title.clone(),
                    percent: enrollment.percent,
                })
            })
            .collect())
    }

    async fn recent_videos(&self, user_id: Uuid, limit: u32) -> PortResult<Vec<RecentVideo>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut touched: Vec<(&VideoProgress, &Video)> = state
            .video_progress
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .filter_map(|((_, video_id), progress)| {
                state
                    .videos
                    .iter()
                    .find(|v| v.id == *video_id)
                    .map(|v| (progress, v))
            })
            .collect();
        touched.sort_by(|a, b| b.0.updated_at.cmp(&a.0.updated_at));
        Ok(touched
            .into_iter()
            .take(limit as usize)
            .map(|(progress, video)| RecentVideo {
                title: video.title.clone(),
                theme: video.theme.clone(),
                completed: progress.completed,
            })
            .collect())
    }

    async fn list_tracks(&self, levels: &[ContentLevel]) -> PortResult<Vec<Track>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut tracks: Vec<Track> = state
            .tracks
            .iter()
            .filter(|t| levels.contains(&t.level))
            .cloned()
            .collect();
        tracks.sort_by_key(|t| t.position);
        Ok(tracks)
    }

    async fn find_track(&self, identifier: &str) -> PortResult<Option<Track>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .tracks
            .iter()
            .find(|t| t.slug == identifier || t.id.to_string() == identifier)
            .cloned())
    }

    async fn track_steps(&self, track_id: Uuid) -> PortResult<Vec<TrackStep>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut steps: Vec<TrackStep> = state
            .steps
            .iter()
            .filter(|s| s.track_id == track_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.position);
        Ok(steps)
    }

    async fn find_step(&self, step_id: Uuid) -> PortResult<Option<TrackStep>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.steps.iter().find(|s| s.id == step_id).cloned())
    }

    async fn enrollments(&self, user_id: Uuid) -> PortResult<Vec<TrackEnrollment>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .enrollments
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|(_, enrollment)| enrollment.clone())
            .collect())
    }

    async fn save_enrollment(
        &self,
        user_id: Uuid,
        enrollment: &TrackEnrollment,
    ) -> PortResult<TrackEnrollment> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .enrollments
            .insert((user_id, enrollment.track_id), enrollment.clone());
        Ok(enrollment.clone())
    }

    async fn save_step_completion(
        &self,
        user_id: Uuid,
        step_id: Uuid,
        feedback: &StepFeedback,
    ) -> PortResult<StepCompletion> {
        let mut state = self.state.write().map_err(poisoned)?;
        let completed_at = state
            .completions
            .get(&(user_id, step_id))
            .map_or_else(Utc::now, |(previous, _)| previous.completed_at);
        let completion = StepCompletion {
            step_id,
            completed_at,
        };
        state
            .completions
            .insert((user_id, step_id), (completion.clone(), feedback.clone()));
        Ok(completion)
    }

    async fn step_completions(
        &self,
        user_id: Uuid,
        track_id: Uuid,
    ) -> PortResult<Vec<StepCompletion>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .steps
            .iter()
            .filter(|s| s.track_id == track_id)
            .filter_map(|s| state.completions.get(&(user_id, s.id)))
            .map(|(completion, _)| completion.clone())
            .collect())
    }
}

#[async_trait]
impl InboxRepository for InMemoryStore {
    async fn insert_booking(&self, user_id: Uuid, booking: &NewBooking) -> PortResult<Booking> {
        self.check(Failure::BookingWrite)?;
        let mut state = self.state.write().map_err(poisoned)?;
        let stored = Booking {
            id: Uuid::new_v4(),
            user_id,
            starts_at: booking.starts_at,
            ends_at: booking.ends_at,
            notes: booking.notes.clone(),
            status: BookingStatus::Booked,
            created_at: Utc::now(),
            canceled_at: None,
        };
        state.bookings.push(stored.clone());
        Ok(stored)
    }

    async fn list_bookings(&self, user_id: Uuid) -> PortResult<Vec<Booking>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.starts_at);
        Ok(bookings)
    }

    async fn cancel_booking(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
    ) -> PortResult<Option<Booking>> {
        self.check(Failure::BookingWrite)?;
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id && b.user_id == user_id)
            .map(|b| {
                b.status = BookingStatus::Canceled;
                b.canceled_at = Some(Utc::now());
                b.clone()
            }))
    }

    async fn insert_message(
        &self,
        user_id: Uuid,
        text: &str,
        file_url: Option<&str>,
    ) -> PortResult<ExpertMessage> {
        self.check(Failure::MessageWrite)?;
        let mut state = self.state.write().map_err(poisoned)?;
        let message = ExpertMessage {
            id: Uuid::new_v4(),
            user_id,
            text: text.to_string(),
            file_url: file_url.map(str::to_string),
            status: "pending".to_string(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, user_id: Uuid) -> PortResult<Vec<ExpertMessage>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// Retrieval Port
//=========================================================================================

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn search(&self, query: &SimilarityQuery<'_>) -> PortResult<Vec<ScoredRecord>> {
        self.check(Failure::VectorSearch)?;
        let state = self.state.read().map_err(poisoned)?;
        Ok(self.similar(&state, query))
    }

    async fn search_combined(&self, query: &CombinedQuery<'_>) -> PortResult<Vec<ScoredRecord>> {
        self.check(Failure::CombinedSearch)?;
        let state = self.state.read().map_err(poisoned)?;
        let mut records: Vec<ScoredRecord> = query
            .kinds
            .iter()
            .flat_map(|kind| {
                self.similar(
                    &state,
                    &SimilarityQuery {
                        collection: kind.collection,
                        vector: query.vector,
                        user_id: query.user_id,
                        scope: query.scope,
                        k: kind.k,
                        min_similarity: kind.min_similarity,
                        candidate_pool: None,
                    },
                )
            })
            .collect();
        records.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        if let Some(limit) = query.total_limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }
}

//=========================================================================================
// Model Ports
//=========================================================================================

/// A deterministic bag-of-words embedder: each lowercase token is hashed into
/// one of `dimensions` buckets. Texts sharing words are similar.
pub struct KeywordEmbedder {
    dimensions: usize,
    output_dimensions: AtomicUsize,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            output_dimensions: AtomicUsize::new(dimensions),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the embedder return vectors of the given length from now on.
    pub fn set_output_dimensions(&self, dimensions: usize) {
        self.output_dimensions.store(dimensions, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector this embedder produces for `text`, at its configured length.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        bag_of_words(text, self.dimensions)
    }
}

fn bag_of_words(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimensions];
    if dimensions == 0 {
        return vector;
    }
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        vector[(hasher.finish() % dimensions as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingService for KeywordEmbedder {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("embedding service unreachable".to_string()));
        }
        Ok(bag_of_words(text, self.output_dimensions.load(Ordering::SeqCst)))
    }
}

/// A generator that replays fixed texts and records every prompt it receives.
pub struct ScriptedGenerator {
    answer: Mutex<String>,
    followups: Mutex<String>,
    delay: Option<Duration>,
    failing: AtomicBool,
    prompts: Mutex<Vec<(GenerationKind, String)>>,
}

impl ScriptedGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: Mutex::new(answer.to_string()),
            followups: Mutex::new(String::new()),
            delay: None,
            failing: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_followups(self, followups: &str) -> Self {
        if let Ok(mut f) = self.followups.lock() {
            *f = followups.to_string();
        }
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_answer(&self, answer: &str) {
        if let Ok(mut a) = self.answer.lock() {
            *a = answer.to_string();
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total calls of any kind.
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Prompts of the given kind, in call order.
    pub fn prompts(&self, kind: GenerationKind) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|(k, _)| *k == kind)
                    .map(|(_, prompt)| prompt.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> PortResult<String> {
        self.prompts
            .lock()
            .map_err(poisoned)?
            .push((request.kind, request.prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("model unreachable".to_string()));
        }
        let text = match request.kind {
            GenerationKind::Answer => self.answer.lock().map_err(poisoned)?.clone(),
            GenerationKind::Followups => self.followups.lock().map_err(poisoned)?.clone(),
        };
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_words_are_similar() {
        let a = bag_of_words("sono e foco", 64);
        let b = bag_of_words("foco no sono", 64);
        let c = bag_of_words("respiração", 64);
        assert!(cosine_sim(&a, &b) > cosine_sim(&a, &c));
    }

    #[tokio::test]
    async fn history_page_counts_back_from_newest() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        for q in ["a", "b", "c", "d"] {
            let turn = NewTurn {
                question: q.to_string(),
                answer: String::new(),
                followups: vec![],
                embedding: None,
            };
            store
                .insert_turn(user, ConversationScope::Continuous, &turn)
                .await
                .unwrap();
        }
        let page = store
            .history_page(user, ConversationScope::Continuous, Some(2), 1)
            .await
            .unwrap();
        let questions: Vec<_> = page.turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, ["b", "c"]);
        assert_eq!(page.total, 4);
    }
}
