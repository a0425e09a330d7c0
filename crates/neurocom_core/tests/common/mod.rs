//! Shared setup for the core integration tests.
//!
//! Wires every service over one `InMemoryStore`, a keyword embedder and a
//! scripted generator, so tests can seed state, inject failures and inspect
//! what the model was asked.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use neurocom_core::access::{AccessChain, AccessControl, RequestContext};
use neurocom_core::domain::{Resource, Tier, User};
use neurocom_core::memory::{InMemoryStore, KeywordEmbedder, ScriptedGenerator};
use neurocom_core::{
    ChatService, ChatSettings, ContextAssembler, ConversationStore, Embedder, GuardianReply,
    InboxLimits, InboxService, Journal, LearningService, RetrievalSettings, Synthesizer,
    VectorGateway,
};

pub const DIMS: usize = 64;
pub const ANSWER: &str = "Vamos olhar para isso juntos.";
pub const FOLLOWUPS: &str = "- O que mudou desde ontem?\n- Qual seria o primeiro passo?";

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub embeddings: Arc<KeywordEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    pub conversations: ConversationStore,
    pub chat: ChatService,
    pub access: AccessControl,
    pub inbox: InboxService,
    pub journal: Journal,
    pub learning: LearningService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(
            ScriptedGenerator::new(ANSWER).with_followups(FOLLOWUPS),
            Duration::from_secs(5),
            InboxLimits::default(),
        )
    }

    pub fn with_generator(generator: ScriptedGenerator, answer_timeout: Duration) -> Self {
        Self::build(generator, answer_timeout, InboxLimits::default())
    }

    pub fn with_limits(limits: InboxLimits) -> Self {
        Self::build(
            ScriptedGenerator::new(ANSWER).with_followups(FOLLOWUPS),
            Duration::from_secs(5),
            limits,
        )
    }

    pub fn build(
        generator: ScriptedGenerator,
        answer_timeout: Duration,
        limits: InboxLimits,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let embeddings = Arc::new(KeywordEmbedder::new(DIMS));
        let generator = Arc::new(generator);

        let embedder = Embedder::new(embeddings.clone(), DIMS, Duration::from_secs(1));
        let gateway = VectorGateway::new(store.clone(), Duration::from_secs(1));
        let conversations = ConversationStore::new(store.clone(), embedder.clone());
        let assembler = ContextAssembler::new(
            embedder.clone(),
            gateway,
            store.clone(),
            store.clone(),
            store.clone(),
            RetrievalSettings::default(),
        );
        let synthesizer = Synthesizer::new(generator.clone(), answer_timeout, Duration::from_secs(1));
        let chat = ChatService::new(
            conversations.clone(),
            Arc::new(assembler),
            synthesizer,
            store.clone(),
            ChatSettings::default(),
        );

        Self {
            access: AccessControl::new(store.clone(), store.clone()),
            inbox: InboxService::new(store.clone(), store.clone(), limits),
            journal: Journal::new(store.clone(), embedder),
            learning: LearningService::new(store.clone(), store.clone()),
            store,
            embeddings,
            generator,
            conversations,
            chat,
        }
    }

    pub fn user(&self, tier: Tier) -> User {
        self.store.seed_user(&format!("{}@neurocom.test", uuid::Uuid::new_v4()), tier)
    }

    pub fn usage(&self, user: &User, resource: Resource) -> u32 {
        self.store
            .user(user.id)
            .map(|u| u.usage(resource))
            .unwrap_or_default()
    }

    pub fn schedule_chain(&self) -> AccessChain {
        AccessChain::new()
            .require_tier([Tier::Intermediate, Tier::Full])
            .monthly_quota(Resource::Consultations, self.inbox.limits().consultations)
    }

    pub fn messages_chain(&self) -> AccessChain {
        AccessChain::new()
            .require_tier([Tier::Intermediate, Tier::Full])
            .monthly_quota(Resource::Messages, self.inbox.limits().messages)
    }

    /// A guardian turn that must succeed.
    pub async fn guide(&self, user_id: uuid::Uuid, message: &str) -> GuardianReply {
        self.chat.guide(user_id, message).await.unwrap()
    }

    pub fn ctx(&self, user: &User) -> RequestContext {
        RequestContext::authenticated(user.id)
    }
}
