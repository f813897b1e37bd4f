//! Task dispatcher (C6): maps a task kind to a use-case, runs it behind a
//! rate-limit gate, and wraps the outcome in a [`ResultEnvelope`]. Never
//! lets a use-case's error escape to the worker loop (spec.md §4.6).

use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

use super::model::{ResultEnvelope, RetryReason, Task};
use super::rate_limiter::RateLimiter;

/// Context a use-case needs to do its work: the account it runs as, the
/// browser/text-composition ports, and its private rate limiter.
pub struct UseCaseContext {
    pub account: String,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug)]
pub struct UseCaseOutcome {
    pub result: Option<Json>,
    pub retryable: bool,
    pub retry_reason: Option<RetryReason>,
}

impl UseCaseOutcome {
    pub fn ok(result: Option<Json>) -> Self {
        Self {
            result,
            retryable: false,
            retry_reason: None,
        }
    }

    pub fn retryable(reason: RetryReason) -> Self {
        Self {
            result: None,
            retryable: true,
            retry_reason: Some(reason),
        }
    }

    pub fn fatal() -> Self {
        Self {
            result: None,
            retryable: false,
            retry_reason: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UseCaseError {
    #[error("payload validation failed: {0}")]
    Validation(String),
    #[error("{reason:?}: {message}")]
    Retryable { reason: RetryReason, message: String },
    #[error("fatal error: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait UseCase: Send + Sync {
    async fn run(
        &self,
        ctx: &UseCaseContext,
        target: &str,
        payload: &Json,
    ) -> Result<UseCaseOutcome, UseCaseError>;
}

/// Maps task kind -> use-case instance, the Rust rendering of spec.md
/// §9's "ordered table lookup with a default fallback" pattern.
#[derive(Default)]
pub struct TaskDispatcher {
    use_cases: HashMap<String, Arc<dyn UseCase>>,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, use_case: Arc<dyn UseCase>) -> &mut Self {
        self.use_cases.insert(kind.into(), use_case);
        self
    }

    pub async fn dispatch(&self, ctx: &UseCaseContext, task: &Task) -> ResultEnvelope {
        let Some(use_case) = self.use_cases.get(&task.kind) else {
            return ResultEnvelope {
                task_id: task.id.clone(),
                job_id: task.job_id,
                account: ctx.account.clone(),
                target: task.target.clone(),
                correlation_id: None,
                attempts: task.attempts,
                ok: false,
                error: Some(format!("no use-case registered for kind {}", task.kind)),
                result: None,
                retryable: false,
                retry_reason: None,
                max_attempts: task.max_attempts,
            };
        };

        match use_case.run(ctx, &task.target, &task.payload).await {
            Ok(outcome) => ResultEnvelope {
                task_id: task.id.clone(),
                job_id: task.job_id,
                account: ctx.account.clone(),
                target: task.target.clone(),
                correlation_id: None,
                attempts: task.attempts,
                ok: !outcome.retryable,
                error: None,
                result: outcome.result,
                retryable: outcome.retryable,
                retry_reason: outcome.retry_reason,
                max_attempts: task.max_attempts,
            },
            Err(e) => {
                let (retryable, retry_reason, error) = match &e {
                    UseCaseError::Validation(msg) => (false, None, msg.clone()),
                    UseCaseError::Retryable { reason, message } => {
                        (true, Some(*reason), message.clone())
                    }
                    UseCaseError::Fatal(msg) => (false, None, msg.clone()),
                };
                ResultEnvelope {
                    task_id: task.id.clone(),
                    job_id: task.job_id,
                    account: ctx.account.clone(),
                    target: task.target.clone(),
                    correlation_id: None,
                    attempts: task.attempts,
                    ok: false,
                    error: Some(error),
                    result: None,
                    retryable,
                    retry_reason,
                    max_attempts: task.max_attempts,
                }
            }
        }
    }
}
