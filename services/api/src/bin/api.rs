//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiChatAdapter, OpenAiEmbeddingAdapter},
    config::Config,
    error::ApiError,
    web::{
        app_router,
        state::{AppState, Ports},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Model Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());
    if let Some(base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(base.clone());
    }
    let openai_client = Client::with_config(openai_config);

    let dimensions = u32::try_from(config.embedding_dimensions)
        .map_err(|_| ApiError::Internal("EMBEDDING_DIMENSIONS is too large".to_string()))?;
    let embedding_adapter = Arc::new(OpenAiEmbeddingAdapter::new(
        openai_client.clone(),
        config.embedding_model.clone(),
        dimensions,
    ));
    let chat_adapter = Arc::new(OpenAiChatAdapter::new(
        openai_client,
        config.chat_model.clone(),
        config.followup_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let ports = Ports {
        users: db_adapter.clone(),
        conversations: db_adapter.clone(),
        reflections: db_adapter.clone(),
        learning: db_adapter.clone(),
        inbox: db_adapter.clone(),
        vectors: db_adapter,
        embeddings: embedding_adapter,
        generator: chat_adapter,
    };
    let app_state = Arc::new(AppState::new(config.clone(), ports));

    // --- 5. Create the Web Router ---
    let app = app_router(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
