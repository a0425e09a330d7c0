//! crates/neurocom_core/src/chat.rs
//!
//! Orchestrates a single chat turn for either assistant.
//!
//! Authentication, tier and quota checks happen at the edge before a turn gets
//! here. From `SessionResolved` on, only a failed or timed-out model call ends
//! the turn early; embedding, retrieval, follow-up and persistence problems
//! are logged and the turn carries on without the affected piece.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::{ContextAssembler, ContextRequest};
use crate::conversation::ConversationStore;
use crate::domain::{ConversationScope, Turn, UserProfile};
use crate::error::{CoreError, CoreResult};
use crate::ports::UserRepository;
use crate::recap::{detect_recap_request, format_recap};
use crate::synthesis::{Persona, PromptParts, Synthesizer};

/// Shown to the user when the model produced no usable text.
pub const DEGRADED_ANSWER: &str =
    "Desculpe, não consegui formular uma resposta agora. Pode reformular a pergunta ou tentar novamente?";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// Turns of the current stream included verbatim in the prompt.
    pub recent_turns: u32,
    /// Whether the conversational assistant generates follow-up questions.
    pub followups_enabled: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            recent_turns: 10,
            followups_enabled: true,
        }
    }
}

/// Progress of a chat turn, logged as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    SessionResolved,
    RecapShortCircuit,
    ContextAssembled,
    Synthesized,
    Persisted,
    Returned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationalReply {
    pub answer: String,
    pub session_id: Uuid,
    pub followups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardianReply {
    pub answer: String,
    /// `None` when the turn could not be persisted.
    pub turn_id: Option<i64>,
}

pub struct ChatService {
    conversations: ConversationStore,
    assembler: Arc<ContextAssembler>,
    synthesizer: Synthesizer,
    users: Arc<dyn UserRepository>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        conversations: ConversationStore,
        assembler: Arc<ContextAssembler>,
        synthesizer: Synthesizer,
        users: Arc<dyn UserRepository>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            conversations,
            assembler,
            synthesizer,
            users,
            settings,
        }
    }

    /// A turn of the session-scoped conversational assistant.
    ///
    /// `want_followups = Some(false)` skips follow-up generation for this turn.
    pub async fn converse(
        &self,
        user_id: Uuid,
        message: &str,
        session_id: Option<Uuid>,
        want_followups: Option<bool>,
    ) -> CoreResult<ConversationalReply> {
        let message = require_message(message)?;

        let session = self.conversations.ensure_session(user_id, session_id).await?;
        let scope = ConversationScope::Session(session.id);
        stage(user_id, TurnStage::SessionResolved);

        if let Some(count) = detect_recap_request(message) {
            let questions = self
                .conversations
                .recap_questions(user_id, scope, count)
                .await?;
            stage(user_id, TurnStage::RecapShortCircuit);
            return Ok(ConversationalReply {
                answer: format_recap(&questions),
                session_id: session.id,
                followups: Vec::new(),
            });
        }

        let answer = self
            .answer(user_id, message, scope, Persona::Conversational, None)
            .await?;

        let followups = if self.settings.followups_enabled && want_followups != Some(false) {
            self.synthesizer.followups(message, &answer).await
        } else {
            Vec::new()
        };

        if self
            .persist(user_id, scope, message, &answer, followups.clone())
            .await
            .is_some()
        {
            self.conversations.title_if_first_turn(&session, message).await;
        }

        stage(user_id, TurnStage::Returned);
        Ok(ConversationalReply {
            answer,
            session_id: session.id,
            followups,
        })
    }

    /// A turn of the guardian assistant on the user's continuous stream.
    pub async fn guide(&self, user_id: Uuid, message: &str) -> CoreResult<GuardianReply> {
        let message = require_message(message)?;
        let scope = ConversationScope::Continuous;
        stage(user_id, TurnStage::SessionResolved);

        let profile = match self.users.find_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile of user {} unavailable: {}", user_id, e);
                None
            }
        };

        let answer = self
            .answer(user_id, message, scope, Persona::Guardian, profile.as_ref())
            .await?;

        let turn_id = self
            .persist(user_id, scope, message, &answer, Vec::new())
            .await
            .map(|turn| turn.id);

        stage(user_id, TurnStage::Returned);
        Ok(GuardianReply { answer, turn_id })
    }

    /// Context, transcript and synthesis for one message.
    async fn answer(
        &self,
        user_id: Uuid,
        message: &str,
        scope: ConversationScope,
        persona: Persona,
        profile: Option<&UserProfile>,
    ) -> CoreResult<String> {
        let request = ContextRequest {
            user_id,
            query: Some(message),
            scope,
        };
        let (context, recent) = tokio::join!(
            self.assembler.assemble(request),
            self.conversations
                .recent_turns(user_id, scope, self.settings.recent_turns),
        );
        let recent = recent.unwrap_or_else(|e| {
            warn!("Recent turns unavailable for prompt: {}", e);
            Vec::new()
        });
        stage(user_id, TurnStage::ContextAssembled);

        let raw = self
            .synthesizer
            .synthesize(&PromptParts {
                persona,
                profile,
                context: &context,
                recent_turns: &recent,
                message,
            })
            .await?;
        stage(user_id, TurnStage::Synthesized);

        if raw.is_empty() {
            return Ok(DEGRADED_ANSWER.to_string());
        }
        Ok(raw)
    }

    /// Stores the turn; a failure is already logged and does not fail the reply.
    async fn persist(
        &self,
        user_id: Uuid,
        scope: ConversationScope,
        message: &str,
        answer: &str,
        followups: Vec<String>,
    ) -> Option<Turn> {
        let turn = self
            .conversations
            .append_turn(user_id, scope, message, answer, followups)
            .await
            .ok()?;
        stage(user_id, TurnStage::Persisted);
        Some(turn)
    }
}

fn require_message(message: &str) -> CoreResult<&str> {
    let message = message.trim();
    if message.is_empty() {
        return Err(CoreError::Validation("message must not be empty".to_string()));
    }
    Ok(message)
}

fn stage(user_id: Uuid, stage: TurnStage) {
    debug!("Chat turn for user {} reached {:?}", user_id, stage);
}
