//! Browser/automation layer port (spec.md §6).
//!
//! The concrete navigation of any third-party site is an explicit
//! Non-goal (spec.md §1); this module only defines the contract use-cases
//! program against, plus a deterministic test double. A production
//! implementation would drive a real browser (e.g. via a CDP client) and
//! live in its own crate behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BrowserPortError {
    #[error("browser session authentication failed: {0}")]
    Auth(String),
    #[error("platform rate limit encountered: {0}")]
    RateLimit(String),
    #[error("browser connection error: {0}")]
    Connection(String),
    #[error("transient UI block detected: {0}")]
    TransientUiBlock(String),
    #[error("browser automation error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub username: String,
    pub followers: u64,
    pub following: u64,
    pub bio: String,
    pub is_private: bool,
}

/// Operations the core consumes from the automation layer. Every
/// implementation must be safe to call from exactly one worker at a
/// time per account (spec.md §5 "Ordering guarantees").
#[async_trait]
pub trait BrowserPort: Send + Sync {
    async fn ensure_session(&self, account: &str) -> Result<(), BrowserPortError>;

    async fn open_profile(&self, username: &str) -> Result<(), BrowserPortError>;

    async fn snapshot(&self, username: &str) -> Result<ProfileSnapshot, BrowserPortError>;

    async fn fetch_followings(
        &self,
        username: &str,
        max: usize,
    ) -> Result<Vec<String>, BrowserPortError>;

    async fn send_dm(&self, username: &str, text: &str) -> Result<bool, BrowserPortError>;
}

/// Deterministic in-memory double for tests and for local development
/// without a live browser session.
pub struct NullBrowserPort;

#[async_trait]
impl BrowserPort for NullBrowserPort {
    async fn ensure_session(&self, _account: &str) -> Result<(), BrowserPortError> {
        Ok(())
    }

    async fn open_profile(&self, _username: &str) -> Result<(), BrowserPortError> {
        Ok(())
    }

    async fn snapshot(&self, username: &str) -> Result<ProfileSnapshot, BrowserPortError> {
        Ok(ProfileSnapshot {
            username: username.to_string(),
            followers: 0,
            following: 0,
            bio: String::new(),
            is_private: false,
        })
    }

    async fn fetch_followings(
        &self,
        _username: &str,
        _max: usize,
    ) -> Result<Vec<String>, BrowserPortError> {
        Ok(Vec::new())
    }

    async fn send_dm(&self, _username: &str, _text: &str) -> Result<bool, BrowserPortError> {
        Ok(true)
    }
}
