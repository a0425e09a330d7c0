pub mod access;
pub mod chat;
pub mod context;
pub mod conversation;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod inbox;
pub mod journal;
pub mod learning;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod ports;
pub mod recap;
pub mod retrieval;
pub mod synthesis;

pub use access::{AccessChain, AccessControl, Guard, QuotaLimit, QuotaStatus, QuotaTable, RequestContext};
pub use chat::{ChatService, ChatSettings, ConversationalReply, GuardianReply};
pub use context::{ContextAssembler, ContextRequest, RetrievalSettings, RetrievalStrategy};
pub use conversation::ConversationStore;
pub use domain::{
    Booking, ContentKind, ConversationScope, ExpertMessage, Reflection, Resource, Session, Tier,
    Turn, User, UserCredentials, UserProfile,
};
pub use embedding::Embedder;
pub use error::{CoreError, CoreResult};
pub use inbox::{InboxLimits, InboxService};
pub use journal::Journal;
pub use learning::{LearningService, StepOutcome, TrackDetail, TrackOverview};
pub use ports::{
    ConversationRepository, EmbeddingService, GenerationService, InboxRepository,
    LearningRepository, PortError, PortResult, ReflectionRepository, UserRepository, VectorStore,
};
pub use retrieval::VectorGateway;
pub use synthesis::Synthesizer;
