//! `send_messages` task kind: sends one DM to one target, composing the
//! text via the text-composition port and gating on the per-account rate
//! limiter (spec.md §4.6: "use-cases are thin orchestration over
//! BrowserPort + the rate limiter + compose_message").

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::Arc;

use crate::kernel::jobs::{
    BrowserPort, RetryReason, UseCase, UseCaseContext, UseCaseError, UseCaseOutcome, WaitOutcome,
};

use super::super::map_browser_error;
use super::super::text_composer::{MessageContext, TextComposer};

#[derive(Debug, Deserialize, Default)]
struct SendMessagePayload {
    text: Option<String>,
    template_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

pub struct SendMessages {
    browser: Arc<dyn BrowserPort>,
    composer: Arc<dyn TextComposer>,
}

impl SendMessages {
    pub fn new(browser: Arc<dyn BrowserPort>, composer: Arc<dyn TextComposer>) -> Self {
        Self { browser, composer }
    }
}

#[async_trait]
impl UseCase for SendMessages {
    async fn run(
        &self,
        ctx: &UseCaseContext,
        target: &str,
        payload: &Json,
    ) -> Result<UseCaseOutcome, UseCaseError> {
        let payload: SendMessagePayload = serde_json::from_value(payload.clone())
            .map_err(|e| UseCaseError::Validation(format!("invalid send_messages payload: {e}")))?;

        if ctx.rate_limiter.wait_for_slot(target).await == WaitOutcome::TimedOut {
            return Err(UseCaseError::Retryable {
                reason: RetryReason::RateLimited,
                message: format!("rate limit wait timed out for target {target}"),
            });
        }

        let text = match payload.text {
            Some(explicit) => explicit,
            None => self.composer.compose_message(
                &MessageContext {
                    username: target.to_string(),
                    category: payload.category.clone(),
                    ..Default::default()
                },
                payload.template_id.as_deref(),
            ),
        };

        let sent = self
            .browser
            .send_dm(target, &text)
            .await
            .map_err(map_browser_error)?;

        ctx.rate_limiter.record_event(target);

        Ok(UseCaseOutcome::ok(Some(serde_json::json!({
            "sent": sent,
            "target": target,
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::{BrowserPortError, ProfileSnapshot, RateLimiter, RateLimiterConfig};
    use async_trait::async_trait;

    struct AlwaysSends;

    #[async_trait]
    impl BrowserPort for AlwaysSends {
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
            _max: usize,
        ) -> Result<Vec<String>, BrowserPortError> {
            Ok(vec![])
        }
        async fn send_dm(&self, _username: &str, _text: &str) -> Result<bool, BrowserPortError> {
            Ok(true)
        }
    }

    fn ctx() -> UseCaseContext {
        UseCaseContext {
            account: "acct-1".into(),
            rate_limiter: Arc::new(RateLimiter::new(RateLimiterConfig::default())),
        }
    }

    #[tokio::test]
    async fn sends_with_explicit_text() {
        let uc = SendMessages::new(Arc::new(AlwaysSends), Arc::new(super::super::super::text_composer::TemplateComposer));
        let payload = serde_json::json!({"text": "hi there"});
        let outcome = uc.run(&ctx(), "alice", &payload).await.unwrap();
        assert!(!outcome.retryable);
        assert_eq!(outcome.result.unwrap()["sent"], true);
    }

    #[tokio::test]
    async fn composes_from_template_when_no_explicit_text() {
        let uc = SendMessages::new(Arc::new(AlwaysSends), Arc::new(super::super::super::text_composer::TemplateComposer));
        let payload = serde_json::json!({});
        let outcome = uc.run(&ctx(), "bob", &payload).await.unwrap();
        assert!(!outcome.retryable);
    }

    #[tokio::test]
    async fn invalid_payload_is_non_retryable_validation_error() {
        let uc = SendMessages::new(Arc::new(AlwaysSends), Arc::new(super::super::super::text_composer::TemplateComposer));
        let payload = serde_json::json!({"text": 123});
        let err = uc.run(&ctx(), "bob", &payload).await.unwrap_err();
        assert!(matches!(err, UseCaseError::Validation(_)));
    }
}
