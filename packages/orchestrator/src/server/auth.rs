//! Bearer auth for C7: verifies the JWT the teacher's `jwt_auth.rs`
//! verified for member sessions, generalized to client id + scopes
//! (spec.md §6: "Auth: Bearer"). Unlike the teacher's middleware, which
//! let unauthenticated requests continue as anonymous, every protected
//! route here requires a valid token carrying the scope it names.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::domains::clients::{Claims, JwtService, Scope};

use super::app::AppState;
use super::error::ApiError;

/// The authenticated principal for one request, extracted from the
/// `Authorization: Bearer <token>` header and verified against
/// [`JwtService`]. Route handlers that need a specific scope use
/// [`AuthenticatedClient::require_scope`] rather than re-checking
/// `claims.scopes` by hand.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    pub client_id: Uuid,
    pub claims: Claims,
}

impl AuthenticatedClient {
    pub fn require_scope(&self, scope: Scope) -> Result<(), ApiError> {
        if self.claims.has_scope(scope) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "missing required scope: {}",
                scope.as_str()
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedClient {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        let claims = verify(&state.jwt_service, token)?;
        let client_id = claims.client_id;

        if !state.rate_limiter.allow(client_id) {
            return Err(ApiError::RateLimitExceeded);
        }

        Ok(AuthenticatedClient { client_id, claims })
    }
}

fn verify(jwt_service: &JwtService, token: &str) -> Result<Claims, ApiError> {
    jwt_service
        .verify_token(token)
        .map_err(|_| ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_scope_rejects_missing_scope() {
        let service = JwtService::new("test_secret_key", "orchestrator".to_string(), 60);
        let client_id = Uuid::new_v4();
        let token = service.create_token(client_id, &[Scope::Fetch]).unwrap();
        let claims = service.verify_token(&token).unwrap();
        let client = AuthenticatedClient { client_id, claims };

        assert!(client.require_scope(Scope::Fetch).is_ok());
        assert!(client.require_scope(Scope::Send).is_err());
    }
}
