//! `fetch_followings` task kind: lists accounts a target follows, bounded
//! by `max_followings` (spec.md §6: "body has owner and max_followings").

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::Arc;

use crate::kernel::jobs::{BrowserPort, UseCase, UseCaseContext, UseCaseError, UseCaseOutcome};

use super::super::map_browser_error;

#[derive(Debug, Deserialize)]
struct FetchFollowingsPayload {
    #[serde(default = "default_max")]
    max_followings: usize,
}

fn default_max() -> usize {
    100
}

pub struct FetchFollowings {
    browser: Arc<dyn BrowserPort>,
}

impl FetchFollowings {
    pub fn new(browser: Arc<dyn BrowserPort>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl UseCase for FetchFollowings {
    async fn run(
        &self,
        _ctx: &UseCaseContext,
        target: &str,
        payload: &Json,
    ) -> Result<UseCaseOutcome, UseCaseError> {
        let payload: FetchFollowingsPayload = serde_json::from_value(payload.clone())
            .map_err(|e| UseCaseError::Validation(format!("invalid fetch_followings payload: {e}")))?;

        let followings = self
            .browser
            .fetch_followings(target, payload.max_followings)
            .await
            .map_err(map_browser_error)?;

        Ok(UseCaseOutcome::ok(Some(serde_json::json!({
            "owner": target,
            "followings": followings,
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::{BrowserPortError, ProfileSnapshot, RateLimiter, RateLimiterConfig};

    struct Fixed(Vec<String>);

    #[async_trait]
    impl BrowserPort for Fixed {
        async fn ensure_session(&self, _account: &str) -> Result<(), BrowserPortError> {
            Ok(())
        }
        async fn open_profile(&self, _username: &str) -> Result<(), BrowserPortError> {
            Ok(())
        }
        async fn snapshot(&self, username: &str) -> Result<ProfileSnapshot, BrowserPortError> {
            Ok(ProfileSnapshot {
                username: username.into(),
                followers: 0,
                following: 0,
                bio: String::new(),
                is_private: false,
            })
        }
        async fn fetch_followings(
            &self,
            _username: &str,
            max: usize,
        ) -> Result<Vec<String>, BrowserPortError> {
            Ok(self.0.iter().take(max).cloned().collect())
        }
        async fn send_dm(&self, _username: &str, _text: &str) -> Result<bool, BrowserPortError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn caps_followings_at_requested_max() {
        let uc = FetchFollowings::new(Arc::new(Fixed(vec![
            "a".into(),
            "b".into(),
            "c".into(),
        ])));
        let ctx = UseCaseContext {
            account: "acct-1".into(),
            rate_limiter: Arc::new(RateLimiter::new(RateLimiterConfig::default())),
        };
        let outcome = uc
            .run(&ctx, "owner", &serde_json::json!({"max_followings": 2}))
            .await
            .unwrap();
        let followings = outcome.result.unwrap()["followings"].as_array().unwrap().len();
        assert_eq!(followings, 2);
    }
}
