//! Shared setup for the HTTP tests: the real router over in-memory ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use api_lib::config::Config;
use api_lib::web::app_router;
use api_lib::web::state::{AppState, Ports};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use neurocom_core::domain::{Tier, User};
use neurocom_core::memory::{InMemoryStore, KeywordEmbedder, ScriptedGenerator};
use serde_json::Value;
use tower::ServiceExt;

pub const DIMS: usize = 64;
pub const ANSWER: &str = "Vamos olhar para isso juntos.";
pub const FOLLOWUPS: &str = "- O que mudou desde ontem?\n- Qual seria o primeiro passo?";

pub fn test_config() -> Config {
    let vars: HashMap<&str, String> = [
        ("DATABASE_URL", "postgres://localhost/neurocom_test".to_string()),
        ("JWT_SECRET", "segredo-de-teste".to_string()),
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("EMBEDDING_DIMENSIONS", DIMS.to_string()),
        ("GENERATION_TIMEOUT_MS", "5000".to_string()),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

pub struct TestServer {
    pub store: Arc<InMemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub state: Arc<AppState>,
    pub router: Router,
}

impl TestServer {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new(ANSWER).with_followups(FOLLOWUPS));
        let ports = Ports {
            users: store.clone(),
            conversations: store.clone(),
            reflections: store.clone(),
            learning: store.clone(),
            inbox: store.clone(),
            vectors: store.clone(),
            embeddings: Arc::new(KeywordEmbedder::new(DIMS)),
            generator: generator.clone(),
        };
        let state = Arc::new(AppState::new(Arc::new(test_config()), ports));
        let router = app_router(state.clone()).unwrap();
        Self {
            store,
            generator,
            state,
            router,
        }
    }

    /// Seeds a user and returns it with a valid bearer token.
    pub fn user(&self, tier: Tier) -> (User, String) {
        let user = self
            .store
            .seed_user(&format!("{}@neurocom.test", uuid::Uuid::new_v4()), tier);
        let token = self.state.jwt.issue(user.id, &user.email).unwrap();
        (user, token)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }
}
