//! Bearer token issuance and verification for C7, generalized from the
//! teacher's member-scoped `JwtService` to a client id + scopes claim set
//! (spec.md §6: "Bearer auth is a JWT carrying client_id + scopes").

use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::Scope;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

impl Claims {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.iter().any(|s| s == scope.as_str())
    }
}

/// Issues and verifies bearer tokens for authenticated clients.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl_minutes: i64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            ttl_minutes,
        }
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    pub fn create_token(&self, client_id: Uuid, scopes: &[Scope]) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::minutes(self.ttl_minutes);

        let claims = Claims {
            sub: client_id.to_string(),
            client_id,
            scopes: scopes.iter().map(|s| s.as_str().to_string()).collect(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_verify_round_trips_claims() {
        let service = JwtService::new("test_secret_key", "orchestrator".to_string(), 60);
        let client_id = Uuid::new_v4();

        let token = service
            .create_token(client_id, &[Scope::Send, Scope::Analyze])
            .unwrap();

        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.client_id, client_id);
        assert!(claims.has_scope(Scope::Send));
        assert!(!claims.has_scope(Scope::Fetch));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let a = JwtService::new("secret-a", "orchestrator".to_string(), 60);
        let b = JwtService::new("secret-b", "orchestrator".to_string(), 60);
        let token = a.create_token(Uuid::new_v4(), &[Scope::Fetch]).unwrap();
        assert!(b.verify_token(&token).is_err());
    }

    #[test]
    fn invalid_token_is_rejected() {
        let service = JwtService::new("test_secret_key", "orchestrator".to_string(), 60);
        assert!(service.verify_token("not-a-token").is_err());
    }
}
