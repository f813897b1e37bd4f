//! `login_check` task kind: confirms a worker's session is still valid
//! for its account, without performing any other action.

use async_trait::async_trait;
use serde_json::Value as Json;
use std::sync::Arc;

use crate::kernel::jobs::{BrowserPort, UseCase, UseCaseContext, UseCaseError, UseCaseOutcome};

use super::super::map_browser_error;

pub struct LoginCheck {
    browser: Arc<dyn BrowserPort>,
}

impl LoginCheck {
    pub fn new(browser: Arc<dyn BrowserPort>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl UseCase for LoginCheck {
    async fn run(
        &self,
        ctx: &UseCaseContext,
        _target: &str,
        _payload: &Json,
    ) -> Result<UseCaseOutcome, UseCaseError> {
        self.browser
            .ensure_session(&ctx.account)
            .await
            .map_err(map_browser_error)?;

        Ok(UseCaseOutcome::ok(Some(serde_json::json!({
            "account": ctx.account,
            "session_valid": true,
        }))))
    }
}
