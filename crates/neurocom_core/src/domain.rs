//! crates/neurocom_core/src/domain.rs
//!
//! Defines the pure, core data structures for the platform.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Plans and Usage
//=========================================================================================

/// A subscription plan tier. The same scale is used for content access levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Free,
    Intermediate,
    Full,
}

/// Content items are gated on the same three-level scale as plans.
pub type ContentLevel = Tier;

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Intermediate, Tier::Full];

    /// Position on the `free < intermediate < full` scale.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Intermediate => 1,
            Tier::Full => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Intermediate => "intermediate",
            Tier::Full => "full",
        }
    }

    /// Every tier at or above `self`, lowest first.
    pub fn and_above(self) -> Vec<Tier> {
        Tier::ALL
            .into_iter()
            .filter(|t| t.rank() >= self.rank())
            .collect()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown plan tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "intermediate" => Ok(Tier::Intermediate),
            "full" => Ok(Tier::Full),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// A monthly-metered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Messages,
    Consultations,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Messages => "messages",
            Resource::Consultations => "consultations",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Users
//=========================================================================================

/// Represents a user - used throughout app.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub tier: Tier,
    pub messages_sent_this_month: u32,
    pub consultations_booked_this_month: u32,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The current monthly counter for a metered resource.
    pub fn usage(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Messages => self.messages_sent_this_month,
            Resource::Consultations => self.consultations_booked_this_month,
        }
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// The self-development profile the guardian assistant tailors its answers to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub goals: Vec<String>,
    pub interests: Vec<String>,
    pub experience_level: Option<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty() && self.interests.is_empty() && self.experience_level.is_none()
    }
}

/// A partial profile edit. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub goals: Option<Vec<String>>,
    pub interests: Option<Vec<String>>,
    /// A blank value clears the field.
    pub experience_level: Option<String>,
}

//=========================================================================================
// Conversations
//=========================================================================================

/// A user-visible conversation thread of the conversational assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A session enriched with its most recent activity, for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Which turn stream a conversation operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationScope {
    /// A session-scoped thread (conversational assistant).
    Session(Uuid),
    /// The single session-less per-user stream (guardian assistant).
    Continuous,
}

impl ConversationScope {
    pub fn session_id(self) -> Option<Uuid> {
        match self {
            ConversationScope::Session(id) => Some(id),
            ConversationScope::Continuous => None,
        }
    }
}

/// A single question-and-answer exchange.
///
/// `id` is the store's monotonic sequence and is the only reliable ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: i64,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub question: String,
    pub answer: String,
    pub followups: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A turn about to be persisted. The embedding is optional by contract.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub question: String,
    pub answer: String,
    pub followups: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

/// One page of a turn stream, chronological, plus the stream's total size.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub turns: Vec<Turn>,
    pub total: u64,
}

//=========================================================================================
// Reflections and Learning Content
//=========================================================================================

/// A diary-like entry authored by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: Option<String>,
    pub content: String,
    pub track_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub video_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewReflection {
    pub kind: String,
    pub title: Option<String>,
    pub content: String,
    pub track_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub video_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

/// The kinds of gated content an identifier can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Video,
    Track,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub theme: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub level: ContentLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoProgress {
    pub video_id: Uuid,
    pub position_seconds: i32,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// A position report from the video player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProgressUpdate {
    pub position_seconds: i32,
    /// Explicit completion; otherwise derived from the position.
    pub completed: Option<bool>,
}

/// A learning track: an ordered series of steps gated on the plan scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub level: ContentLevel,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackStep {
    pub id: Uuid,
    pub track_id: Uuid,
    pub position: i32,
    pub title: String,
    pub video_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    InProgress,
    Completed,
}

impl TrackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackStatus::InProgress => "in_progress",
            TrackStatus::Completed => "completed",
        }
    }
}

impl FromStr for TrackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(TrackStatus::InProgress),
            "completed" => Ok(TrackStatus::Completed),
            other => Err(format!("Unknown track status '{}'", other)),
        }
    }
}

/// A user's standing in one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEnrollment {
    pub track_id: Uuid,
    pub status: TrackStatus,
    pub percent: i32,
    pub current_step_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// The user's rating and notes when finishing a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepFeedback {
    pub rating: Option<i16>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub step_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// A learning track the user has started but not finished.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackProgress {
    pub track_id: Uuid,
    pub title: String,
    pub percent: i32,
}

/// A video the user touched recently, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentVideo {
    pub title: String,
    pub theme: Option<String>,
    pub completed: bool,
}

//=========================================================================================
// Retrieval
//=========================================================================================

/// A logical similarity-search collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Reflections,
    SessionHistory,
    ContinuousHistory,
    Documents,
}

impl Collection {
    pub fn provenance(self) -> Provenance {
        match self {
            Collection::Reflections => Provenance::Reflection,
            Collection::SessionHistory | Collection::ContinuousHistory => Provenance::History,
            Collection::Documents => Provenance::Document,
        }
    }

    /// The history collection backing a conversation scope.
    pub fn history_for(scope: ConversationScope) -> Self {
        match scope {
            ConversationScope::Session(_) => Collection::SessionHistory,
            ConversationScope::Continuous => Collection::ContinuousHistory,
        }
    }
}

/// A similarity hit from the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub content: String,
    pub similarity: f32,
    pub kind: Collection,
}

/// Where a context snippet came from. Declaration order is the render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Provenance {
    History,
    Reflection,
    Document,
    TrackProgress,
    VideoRecent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnippet {
    pub provenance: Provenance,
    pub text: String,
    /// `None` for recency-derived snippets, which carry no score.
    pub similarity: Option<f32>,
}

/// The per-request, never-persisted set of retrieved snippets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBundle {
    pub snippets: Vec<ContextSnippet>,
}

//=========================================================================================
// Expert Inbox and Consultations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Booked,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(BookingStatus::Booked),
            "canceled" => Ok(BookingStatus::Canceled),
            other => Err(format!("Unknown booking status '{}'", other)),
        }
    }
}

/// A consultation booked with the human expert.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A message sent to the human expert's inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpertMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub file_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_parses_canonical_names_only() {
        assert_eq!("free".parse::<Tier>(), Ok(Tier::Free));
        assert_eq!(" Intermediate ".parse::<Tier>(), Ok(Tier::Intermediate));
        assert_eq!("FULL".parse::<Tier>(), Ok(Tier::Full));
        assert!("intermediario".parse::<Tier>().is_err());
    }

    #[test]
    fn and_above_lists_satisfying_tiers() {
        assert_eq!(Tier::Free.and_above(), Tier::ALL.to_vec());
        assert_eq!(Tier::Intermediate.and_above(), vec![Tier::Intermediate, Tier::Full]);
        assert_eq!(Tier::Full.and_above(), vec![Tier::Full]);
    }

    #[test]
    fn history_provenance_precedes_documents() {
        assert!(Provenance::History < Provenance::Document);
        assert!(Provenance::Document < Provenance::VideoRecent);
    }
}
