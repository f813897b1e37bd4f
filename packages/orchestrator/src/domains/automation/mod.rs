//! Business logic for the four task kinds the orchestrator runs
//! (spec.md §9's "registry of task kind -> use-case"). Infrastructure
//! (store, router, rate limiter) lives in `kernel::jobs`; this module is
//! the thin orchestration layer C6 dispatches into.

pub mod text_composer;
pub mod use_cases;

pub use text_composer::{MessageContext, TemplateComposer, TextComposer};

use crate::kernel::jobs::{BrowserPortError, RetryReason, UseCaseError};

/// Maps `BrowserPort` failures onto the retry taxonomy spec.md §4.4
/// names. The spec leaves `driver_dead`'s exact source incomplete
/// (§9 Design Notes); this orchestrator documents the mapping
/// explicitly rather than inheriting it silently (see DESIGN.md):
/// a dead connection to the automation layer is the `driver_dead`
/// case, an expired session is retried as `session_expired`, a
/// platform-reported block or rate limit engages the C3 cooldown via
/// `transient_ui_block`/`rate_limited`, and anything else is fatal.
pub fn map_browser_error(e: BrowserPortError) -> UseCaseError {
    match e {
        BrowserPortError::Connection(msg) => UseCaseError::Retryable {
            reason: RetryReason::DriverDead,
            message: msg,
        },
        BrowserPortError::Auth(msg) => UseCaseError::Retryable {
            reason: RetryReason::SessionExpired,
            message: msg,
        },
        BrowserPortError::RateLimit(msg) => UseCaseError::Retryable {
            reason: RetryReason::RateLimited,
            message: msg,
        },
        BrowserPortError::TransientUiBlock(msg) => UseCaseError::Retryable {
            reason: RetryReason::TransientUiBlock,
            message: msg,
        },
        BrowserPortError::Other(msg) => UseCaseError::Fatal(msg),
    }
}
