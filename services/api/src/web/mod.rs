pub mod auth;
pub mod chat;
pub mod content;
pub mod inbox;
pub mod learning;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use neurocom_core::AccessChain;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use crate::error::ApiError;
use middleware::{require_access, require_auth, GuardState};
use rest::ApiDoc;
use state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds the complete application: public and protected API routes, CORS,
/// request tracing and the Swagger UI.
pub fn app_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = state.config.front_url.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("FRONT_URL".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let guard = |chain: AccessChain| {
        axum_middleware::from_fn_with_state(GuardState::new(state.clone(), chain), require_access)
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler));

    // Protected routes (auth required, then each route's own guards)
    let protected_routes = Router::new()
        .route("/me", get(auth::me_handler))
        .route(
            "/sessions",
            post(rest::create_session_handler).get(rest::list_sessions_handler),
        )
        .route("/sessions/{id}", patch(rest::rename_session_handler))
        .route("/chat-history/{session_id}", get(rest::chat_history_handler))
        .route("/chat", post(chat::chat_handler))
        .route("/guide/chat", post(chat::guide_chat_handler))
        .route("/guide/history", get(chat::guide_history_handler))
        .route(
            "/messages",
            get(inbox::list_messages_handler)
                .route_layer(guard(state.subscribers_chain()))
                .merge(
                    post(inbox::send_message_handler)
                        .route_layer(guard(state.messages_chain())),
                ),
        )
        .route(
            "/schedule",
            get(inbox::list_bookings_handler)
                .route_layer(guard(state.subscribers_chain()))
                .merge(
                    post(inbox::book_consultation_handler)
                        .route_layer(guard(state.schedule_chain())),
                ),
        )
        .route(
            "/schedule/{id}",
            delete(inbox::cancel_booking_handler).route_layer(guard(state.subscribers_chain())),
        )
        .route(
            "/videos/{slug}",
            get(content::get_video_handler).route_layer(guard(state.video_chain())),
        )
        .route(
            "/videos/{slug}/progress",
            post(content::video_progress_handler).route_layer(guard(state.video_chain())),
        )
        .route("/tracks", get(learning::list_tracks_handler))
        .route(
            "/tracks/{slug}",
            get(learning::get_track_handler).route_layer(guard(state.track_chain())),
        )
        .route(
            "/tracks/{slug}/start",
            post(learning::start_track_handler).route_layer(guard(state.track_chain())),
        )
        .route("/steps/{id}/complete", post(learning::complete_step_handler))
        .route(
            "/profile",
            get(learning::get_profile_handler).patch(learning::update_profile_handler),
        )
        .route(
            "/reflections",
            post(content::create_reflection_handler).get(content::list_reflections_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
