//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use neurocom_core::access::QuotaTable;
use neurocom_core::{ChatSettings, InboxLimits, RetrievalSettings};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub front_url: String,

    // --- Model provider ---
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub chat_model: String,
    pub followup_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    // --- Retrieval ---
    pub min_similarity_documents: f32,
    pub min_similarity_history: f32,
    pub documents_k: u32,
    pub history_k: u32,
    pub reflections_k: u32,
    pub recency_half_life_secs: u64,
    pub preview_chars: usize,
    pub max_context_chars: usize,

    // --- Deadlines ---
    pub embedding_timeout: Duration,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,

    // --- Monthly quotas for the intermediate plan ---
    pub quota_messages_intermediate: u32,
    pub quota_consultations_intermediate: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        // --- Load Server and Database Settings ---
        let bind_address = vars.parsed("BIND_ADDRESS", "0.0.0.0:3000")?;
        let database_url = vars.required("DATABASE_URL")?;

        let log_level_str = vars.get("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let jwt_secret = vars.required("JWT_SECRET")?;
        let jwt_ttl_minutes: i64 = vars.parsed("JWT_TTL_MINUTES", "60")?;
        if jwt_ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "JWT_TTL_MINUTES".to_string(),
                "must be positive".to_string(),
            ));
        }
        let front_url = vars
            .get("FRONT_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string());

        // --- Load Model Settings ---
        let openai_api_key = vars.required("OPENAI_API_KEY")?;
        let openai_api_base = vars.get("OPENAI_API_BASE");
        let chat_model = vars
            .get("CHAT_MODEL")
            .unwrap_or_else(|| "gemini-2.5-flash".to_string());
        let followup_model = vars.get("FOLLOWUP_MODEL").unwrap_or_else(|| chat_model.clone());
        let embedding_model = vars
            .get("EMBEDDING_MODEL")
            .unwrap_or_else(|| "text-embedding-004".to_string());
        let embedding_dimensions: usize = vars.parsed("EMBEDDING_DIMENSIONS", "768")?;
        if embedding_dimensions == 0 {
            return Err(ConfigError::InvalidValue(
                "EMBEDDING_DIMENSIONS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // --- Load Retrieval Settings ---
        let min_similarity_documents = vars.similarity("RAG_MIN_SIM_DOCS", "0.30")?;
        let min_similarity_history = vars.similarity("RAG_MIN_SIM_HISTORY", "0.25")?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            jwt_secret,
            jwt_ttl_minutes,
            front_url,
            openai_api_key,
            openai_api_base,
            chat_model,
            followup_model,
            embedding_model,
            embedding_dimensions,
            min_similarity_documents,
            min_similarity_history,
            documents_k: vars.parsed("RAG_DOCS_K", "8")?,
            history_k: vars.parsed("RAG_HISTORY_K", "6")?,
            reflections_k: vars.parsed("RAG_REFLECTIONS_K", "3")?,
            recency_half_life_secs: vars.parsed("RAG_RECENCY_HALF_LIFE_SECS", "86400")?,
            preview_chars: vars.parsed("RAG_PREVIEW_CHARS", "300")?,
            max_context_chars: vars.parsed("RAG_MAX_CONTEXT_CHARS", "6000")?,
            embedding_timeout: vars.millis("EMBEDDING_TIMEOUT_MS", "10000")?,
            retrieval_timeout: vars.millis("RETRIEVAL_TIMEOUT_MS", "10000")?,
            generation_timeout: vars.millis("GENERATION_TIMEOUT_MS", "60000")?,
            quota_messages_intermediate: vars.parsed("QUOTA_MESSAGES_INTERMEDIATE", "5")?,
            quota_consultations_intermediate: vars.parsed("QUOTA_CONSULTATIONS_INTERMEDIATE", "2")?,
        })
    }

    /// Retrieval tunables for the context assembler.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            min_similarity_documents: self.min_similarity_documents,
            min_similarity_history: self.min_similarity_history,
            documents_k: self.documents_k,
            history_k: self.history_k,
            reflections_k: self.reflections_k,
            recency_half_life_secs: Some(self.recency_half_life_secs).filter(|s| *s > 0),
            preview_chars: self.preview_chars,
            max_context_chars: self.max_context_chars,
            ..RetrievalSettings::default()
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings::default()
    }

    /// Monthly quotas: free 0, intermediate configurable, full unlimited.
    pub fn inbox_limits(&self) -> InboxLimits {
        InboxLimits {
            messages: QuotaTable::intermediate_only(self.quota_messages_intermediate),
            consultations: QuotaTable::intermediate_only(self.quota_consultations_intermediate),
        }
    }
}

/// Small helper over the variable source so each setting is one line.
struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
    }

    /// Parses `name`, or `default` when it is unset.
    fn parsed<T>(&self, name: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(name).unwrap_or_else(|| default.to_string());
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
    }

    fn similarity(&self, name: &str, default: &str) -> Result<f32, ConfigError> {
        let value: f32 = self.parsed(name, default)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("{} is outside 0..=1", value),
            ));
        }
        Ok(value)
    }

    fn millis(&self, name: &str, default: &str) -> Result<Duration, ConfigError> {
        let ms: u64 = self.parsed(name, default)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/neurocom"),
        ("JWT_SECRET", "segredo"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.followup_model, config.chat_model);
        assert_eq!(config.generation_timeout, Duration::from_secs(60));
        assert_eq!(config.retrieval_settings(), RetrievalSettings::default());

        let limits = config.inbox_limits();
        assert_eq!(limits.messages, QuotaTable::intermediate_only(5));
        assert_eq!(limits.consultations, QuotaTable::intermediate_only(2));
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "OPENAI_API_KEY"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RAG_MIN_SIM_DOCS", "1.5"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "RAG_MIN_SIM_DOCS"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("EMBEDDING_DIMENSIONS", "muitos"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn overrides_flow_into_core_settings() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("RAG_DOCS_K", "4"),
            ("RAG_RECENCY_HALF_LIFE_SECS", "0"),
            ("QUOTA_MESSAGES_INTERMEDIATE", "10"),
            ("FOLLOWUP_MODEL", "gemini-2.5-flash-lite"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        let retrieval = config.retrieval_settings();
        assert_eq!(retrieval.documents_k, 4);
        assert_eq!(retrieval.recency_half_life_secs, None);
        assert_eq!(config.inbox_limits().messages, QuotaTable::intermediate_only(10));
        assert_eq!(config.followup_model, "gemini-2.5-flash-lite");
    }
}
