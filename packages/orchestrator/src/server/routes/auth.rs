//! `POST /api/auth/login` (spec.md §6): exchange an opaque API key for a
//! bearer token carrying the scopes spec.md's §6 table names.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domains::clients::{hash_api_key, ClientStatus, Scope};

use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scopes: Vec<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if req.api_key.trim().is_empty() {
        return Err(ApiError::BadRequest("api_key must not be empty".into()));
    }

    let api_key_hash = hash_api_key(&req.api_key);
    let client = state
        .clients
        .find_by_api_key_hash(&api_key_hash)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or(ApiError::Unauthorized)?;

    if client.status != ClientStatus::Active {
        return Err(ApiError::Forbidden("client is suspended".into()));
    }

    let scopes = [Scope::Fetch, Scope::Analyze, Scope::Send];
    let token = state
        .jwt_service
        .create_token(client.id, &scopes)
        .map_err(ApiError::Internal)?;

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in: state.jwt_service.ttl_minutes() * 60,
        scopes: scopes.iter().map(|s| s.as_str().to_string()).collect(),
    }))
}
