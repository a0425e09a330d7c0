//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how the core services are
//! wired from a set of port implementations.

use std::sync::Arc;

use neurocom_core::access::AccessChain;
use neurocom_core::domain::{ContentKind, Resource, Tier};
use neurocom_core::ports::{
    ConversationRepository, EmbeddingService, GenerationService, InboxRepository,
    LearningRepository, ReflectionRepository, UserRepository, VectorStore,
};
use neurocom_core::{
    AccessControl, ChatService, ContextAssembler, ConversationStore, Embedder, InboxService,
    Journal, LearningService, Synthesizer, VectorGateway,
};

use crate::config::Config;
use crate::web::auth::JwtService;

/// Follow-up generation gets a tighter deadline than the answer itself.
const FOLLOWUP_TIMEOUT_DIVISOR: u32 = 4;

//=========================================================================================
// Ports
//=========================================================================================

/// Concrete implementations of every core port. In production all
/// persistence ports are the same `DbAdapter`; tests use the in-memory store.
#[derive(Clone)]
pub struct Ports {
    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub reflections: Arc<dyn ReflectionRepository>,
    pub learning: Arc<dyn LearningRepository>,
    pub inbox: Arc<dyn InboxRepository>,
    pub vectors: Arc<dyn VectorStore>,
    pub embeddings: Arc<dyn EmbeddingService>,
    pub generator: Arc<dyn GenerationService>,
}

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: JwtService,
    pub users: Arc<dyn UserRepository>,
    pub learning: LearningService,
    pub access: AccessControl,
    pub conversations: ConversationStore,
    pub chat: Arc<ChatService>,
    pub inbox: InboxService,
    pub journal: Journal,
}

impl AppState {
    pub fn new(config: Arc<Config>, ports: Ports) -> Self {
        let embedder = Embedder::new(
            ports.embeddings,
            config.embedding_dimensions,
            config.embedding_timeout,
        );
        let gateway = VectorGateway::new(ports.vectors, config.retrieval_timeout);
        let conversations = ConversationStore::new(ports.conversations.clone(), embedder.clone());
        let assembler = ContextAssembler::new(
            embedder.clone(),
            gateway,
            ports.conversations,
            ports.reflections.clone(),
            ports.learning.clone(),
            config.retrieval_settings(),
        );
        let synthesizer = Synthesizer::new(
            ports.generator,
            config.generation_timeout,
            config.generation_timeout / FOLLOWUP_TIMEOUT_DIVISOR,
        );
        let chat = ChatService::new(
            conversations.clone(),
            Arc::new(assembler),
            synthesizer,
            ports.users.clone(),
            config.chat_settings(),
        );

        Self {
            jwt: JwtService::new(&config.jwt_secret, config.jwt_ttl_minutes),
            access: AccessControl::new(ports.users.clone(), ports.learning.clone()),
            inbox: InboxService::new(ports.inbox, ports.users.clone(), config.inbox_limits()),
            journal: Journal::new(ports.reflections, embedder),
            chat: Arc::new(chat),
            learning: LearningService::new(ports.learning, ports.users.clone()),
            users: ports.users,
            conversations,
            config,
        }
    }

    //=====================================================================================
    // Guard chains per endpoint
    //=====================================================================================

    fn subscriber_tiers() -> [Tier; 2] {
        [Tier::Intermediate, Tier::Full]
    }

    /// Listing or cancelling consultations, and reading the inbox.
    pub fn subscribers_chain(&self) -> AccessChain {
        AccessChain::new().require_tier(Self::subscriber_tiers())
    }

    pub fn schedule_chain(&self) -> AccessChain {
        self.subscribers_chain().monthly_quota(
            Resource::Consultations,
            self.inbox.limits().consultations,
        )
    }

    pub fn messages_chain(&self) -> AccessChain {
        self.subscribers_chain()
            .monthly_quota(Resource::Messages, self.inbox.limits().messages)
    }

    pub fn video_chain(&self) -> AccessChain {
        AccessChain::new().content_level(ContentKind::Video)
    }

    pub fn track_chain(&self) -> AccessChain {
        AccessChain::new().content_level(ContentKind::Track)
    }
}
