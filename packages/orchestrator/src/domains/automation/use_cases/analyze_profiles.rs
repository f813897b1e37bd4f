//! `analyze_profiles` task kind: opens a profile and snapshots its public
//! metrics. Payload options per spec.md §6: `fetch_reels`, `max_reels`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::Arc;

use crate::kernel::jobs::{BrowserPort, UseCase, UseCaseContext, UseCaseError, UseCaseOutcome};

use super::super::map_browser_error;

#[derive(Debug, Deserialize, Default)]
struct AnalyzeProfilesPayload {
    #[serde(default)]
    fetch_reels: bool,
    #[serde(default)]
    max_reels: Option<u32>,
}

pub struct AnalyzeProfiles {
    browser: Arc<dyn BrowserPort>,
}

impl AnalyzeProfiles {
    pub fn new(browser: Arc<dyn BrowserPort>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl UseCase for AnalyzeProfiles {
    async fn run(
        &self,
        _ctx: &UseCaseContext,
        target: &str,
        payload: &Json,
    ) -> Result<UseCaseOutcome, UseCaseError> {
        let payload: AnalyzeProfilesPayload = serde_json::from_value(payload.clone())
            .map_err(|e| UseCaseError::Validation(format!("invalid analyze_profiles payload: {e}")))?;

        self.browser
            .open_profile(target)
            .await
            .map_err(map_browser_error)?;
        let snapshot = self
            .browser
            .snapshot(target)
            .await
            .map_err(map_browser_error)?;

        Ok(UseCaseOutcome::ok(Some(serde_json::json!({
            "username": snapshot.username,
            "followers": snapshot.followers,
            "following": snapshot.following,
            "bio": snapshot.bio,
            "is_private": snapshot.is_private,
            "fetch_reels": payload.fetch_reels,
            "max_reels": payload.max_reels,
        }))))
    }
}
