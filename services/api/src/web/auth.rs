//! services/api/src/web/auth.rs
//!
//! Account endpoints (signup, login, current user) and the bearer token service.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use neurocom_core::{CoreError, PortError, RequestContext, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::state::AppState;

//=========================================================================================
// Token Service
//=========================================================================================

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl JwtService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("Failed to encode token: {}", e)))
    }

    /// Validates signature and expiry, returning the user id in `sub`.
    pub fn verify(&self, token: &str) -> ApiResult<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthenticated("Token inválido ou expirado".to_string())
        })?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ApiError::Unauthenticated("Token inválido ou expirado".to_string()))
    }
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The public view of an account, including plan and monthly usage.
#[derive(Serialize, ToSchema)]
pub struct UserDto {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub tier: String,
    pub messages_sent_this_month: u32,
    pub consultations_booked_this_month: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            tier: user.tier.as_str().to_string(),
            messages_sent_this_month: user.messages_sent_this_month,
            consultations_booked_this_month: user.consultations_booked_this_month,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserDto,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new account on the free plan
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email e senha são obrigatórios".to_string(),
        ));
    }
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create the user
    let user = state
        .users
        .create_user(name, email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => {
                ApiError::Port(PortError::Conflict("Email já cadastrado".to_string()))
            }
            other => ApiError::Port(other),
        })?;
    info!("Registered user {}", user.id);

    // 3. Issue a bearer token
    let token = state.jwt.issue(user.id, &user.email)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserDto::from(&user),
        }),
    ))
}

/// POST /auth/login - Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::Unauthenticated("Credenciais inválidas".to_string());

    // 1. Look up credentials by email
    let creds = state
        .users
        .find_credentials(req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!("Stored hash for user {} is unreadable: {:?}", creds.user_id, e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("Failed login for user {}", creds.user_id);
        return Err(invalid());
    }

    // 3. Load the account and issue a token
    let user = state
        .users
        .find_user(creds.user_id)
        .await?
        .ok_or_else(invalid)?;
    let token = state.jwt.issue(user.id, &user.email)?;

    Ok(Json(AuthResponse {
        token,
        user: UserDto::from(&user),
    }))
}

/// GET /me - The authenticated account with its plan and monthly counters
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<MeResponse>> {
    let ctx = state.access.resolve(ctx).await?;
    let user = ctx.user().ok_or(CoreError::UserNotFound(ctx.user_id))?;
    Ok(Json(MeResponse {
        user: UserDto::from(user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_to_their_subject() {
        let jwt = JwtService::new("segredo", 60);
        let user_id = Uuid::new_v4();
        let token = jwt.issue(user_id, "ana@example.com").unwrap();

        assert_eq!(jwt.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = JwtService::new("outro", 60)
            .issue(Uuid::new_v4(), "ana@example.com")
            .unwrap();
        let err = JwtService::new("segredo", 60).verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        // Past the default 60s leeway.
        let token = JwtService::new("segredo", -5)
            .issue(Uuid::new_v4(), "ana@example.com")
            .unwrap();
        assert!(JwtService::new("segredo", 60).verify(&token).is_err());
    }
}
