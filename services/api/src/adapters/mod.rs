pub mod chat_llm;
pub mod db;
pub mod embedding;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use embedding::OpenAiEmbeddingAdapter;
