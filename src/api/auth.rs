use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::api::validation::validate_registration;
use crate::auth;
use crate::models::User;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Verified caller identity, attached to the request by the middleware.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl From<auth::Claims> for Identity {
    fn from(claims: auth::Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/register
/// Create an account. Returns no token; the caller logs in separately.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let username = validate_registration(&payload.username, &payload.password)?;

    let mut document = state.store.load().await;
    if document.users.iter().any(|u| u.username == username) {
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    let password_hash = auth::hash_password(&payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {e}")))?;

    document.users.push(User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash,
    });
    state.store.save(&document).await?;

    tracing::info!("Registered user: {username}");

    Ok(Json(RegisterResponse { success: true }))
}

/// POST /api/login
/// Exchange credentials for a signed bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let document = state.store.load().await;

    // One generic message for unknown user and wrong password, so a caller
    // cannot probe which usernames exist.
    let user = document
        .users
        .iter()
        .find(|u| u.username == payload.username)
        .ok_or_else(|| ApiError::validation("Invalid username or password"))?;

    let is_valid = auth::verify_password(&payload.password, &user.password_hash)
        .await
        .map_err(|e| ApiError::internal(format!("Password verification error: {e}")))?;

    if !is_valid {
        return Err(ApiError::validation("Invalid username or password"));
    }

    let token = state
        .tokens
        .issue(&user.id, &user.username)
        .map_err(|e| ApiError::internal(format!("Failed to issue token: {e}")))?;

    Ok(Json(LoginResponse { token }))
}

// ============================================================================
// Middleware
// ============================================================================

/// Bearer-token middleware for the client-records routes. On success the
/// decoded [`Identity`] is attached as a request extension.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(ApiError::unauthorized("Missing token"));
    };

    let auth_header = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid token"))?;

    let parts: Vec<&str> = auth_header.split(' ').collect();
    if parts.len() != 2 {
        return Err(ApiError::unauthorized("Invalid token"));
    }

    let claims = state
        .tokens
        .verify(parts[1])
        .map_err(|_| ApiError::Forbidden("Invalid token".to_string()))?;

    request.extensions_mut().insert(Identity::from(claims));
    Ok(next.run(request).await)
}
