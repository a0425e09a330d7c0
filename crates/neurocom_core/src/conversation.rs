//! crates/neurocom_core/src/conversation.rs
//!
//! Conversational continuity for both assistants behind one interface.
//! Session threads and the guardian's continuous stream differ only in the
//! [`ConversationScope`] passed through.

use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{ConversationScope, HistoryPage, NewTurn, Session, SessionSummary, Turn};
use crate::embedding::Embedder;
use crate::error::{CoreError, CoreResult};
use crate::ports::ConversationRepository;

/// Characters of the first message used as an automatic session title.
pub const AUTO_TITLE_CHARS: usize = 60;

#[derive(Clone)]
pub struct ConversationStore {
    repo: Arc<dyn ConversationRepository>,
    embedder: Embedder,
}

impl ConversationStore {
    pub fn new(repo: Arc<dyn ConversationRepository>, embedder: Embedder) -> Self {
        Self { repo, embedder }
    }

    // --- Sessions ---

    pub async fn create_session(&self, user_id: Uuid, title: Option<&str>) -> CoreResult<Session> {
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        Ok(self.repo.create_session(user_id, title).await?)
    }

    /// Returns the caller's session, creating a fresh one when `session_id` is
    /// absent or names a session the caller does not own.
    pub async fn ensure_session(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> CoreResult<Session> {
        if let Some(id) = session_id {
            if let Some(session) = self.repo.find_owned_session(id, user_id).await? {
                return Ok(session);
            }
        }
        self.create_session(user_id, None).await
    }

    /// The session if the caller owns it. Foreign and missing sessions are
    /// indistinguishable to the caller.
    pub async fn owned_session(&self, session_id: Uuid, user_id: Uuid) -> CoreResult<Session> {
        self.repo
            .find_owned_session(session_id, user_id)
            .await?
            .ok_or_else(|| session_not_found(session_id))
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> CoreResult<Vec<SessionSummary>> {
        Ok(self.repo.list_sessions(user_id).await?)
    }

    pub async fn rename_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> CoreResult<Session> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::Validation("title must not be blank".to_string()));
        }
        self.repo
            .update_session_title(session_id, user_id, title)
            .await?
            .ok_or_else(|| session_not_found(session_id))
    }

    /// Names an untitled session after its first message.
    pub async fn title_if_first_turn(&self, session: &Session, first_message: &str) {
        if session.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return;
        }
        let scope = ConversationScope::Session(session.id);
        match self.repo.count_turns(session.user_id, scope).await {
            Ok(1) => {
                let title: String = first_message.trim().chars().take(AUTO_TITLE_CHARS).collect();
                if title.is_empty() {
                    return;
                }
                if let Err(e) = self
                    .repo
                    .update_session_title(session.id, session.user_id, &title)
                    .await
                {
                    warn!("Failed to auto-title session {}: {}", session.id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to count turns for session {}: {}", session.id, e),
        }
    }

    // --- Turns ---

    /// Persists a turn. The embedding of `question\nanswer` is best-effort: when
    /// it cannot be computed, or the insert carrying it fails, the turn is
    /// stored without one.
    pub async fn append_turn(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        question: &str,
        answer: &str,
        followups: Vec<String>,
    ) -> CoreResult<Turn> {
        let embedding = match self.embedder.embed(&format!("{}\n{}", question, answer)).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Storing turn without embedding: {}", e);
                None
            }
        };

        let mut turn = NewTurn {
            question: question.to_string(),
            answer: answer.to_string(),
            followups,
            embedding,
        };

        match self.repo.insert_turn(user_id, scope, &turn).await {
            Ok(stored) => Ok(stored),
            Err(e) if turn.embedding.is_some() => {
                warn!("Insert with embedding failed, retrying without: {}", e);
                turn.embedding = None;
                self.repo.insert_turn(user_id, scope, &turn).await.map_err(|e| {
                    error!("Failed to persist turn for user {}: {}", user_id, e);
                    CoreError::from(e)
                })
            }
            Err(e) => {
                error!("Failed to persist turn for user {}: {}", user_id, e);
                Err(e.into())
            }
        }
    }

    /// The last `limit` turns, oldest first.
    pub async fn recent_turns(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: u32,
    ) -> CoreResult<Vec<Turn>> {
        let mut turns = self.repo.recent_turns(user_id, scope, limit).await?;
        turns.sort_by_key(|t| t.id);
        Ok(turns)
    }

    /// A page counted back from the newest turn, returned oldest first.
    pub async fn history(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        limit: Option<u32>,
        offset: u32,
    ) -> CoreResult<HistoryPage> {
        let mut page = self.repo.history_page(user_id, scope, limit, offset).await?;
        page.turns.sort_by_key(|t| t.id);
        Ok(page)
    }

    /// The full history of a caller-owned session, oldest first.
    pub async fn session_history(&self, session_id: Uuid, user_id: Uuid) -> CoreResult<Vec<Turn>> {
        self.owned_session(session_id, user_id).await?;
        let page = self
            .history(user_id, ConversationScope::Session(session_id), None, 0)
            .await?;
        Ok(page.turns)
    }

    /// The user's own last `count` questions in the scope, oldest first.
    pub async fn recap_questions(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        count: usize,
    ) -> CoreResult<Vec<String>> {
        let turns = self.recent_turns(user_id, scope, count as u32).await?;
        Ok(turns.into_iter().map(|t| t.question).collect())
    }
}

fn session_not_found(session_id: Uuid) -> CoreError {
    CoreError::NotFound(format!("Session {} not found", session_id))
}
