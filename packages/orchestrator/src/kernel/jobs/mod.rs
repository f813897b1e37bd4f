//! Job scheduling and task-lease subsystem.
//!
//! This is the durable job/task store (C1), the lease reaper (C2), the
//! per-account rate limiter (C3), the worker lifecycle (C4), the
//! router/dispatcher (C5), and the task dispatcher (C6). It is
//! infrastructure, not business logic: the use-cases a task kind maps to
//! live in `domains::automation`.
//!
//! # Architecture
//!
//! ```text
//! C7 (HTTP) ─▶ store.create_job / create_tasks ─▶ Postgres
//!                                                     │
//! Router (C5) ──claim_next──────────────────────────▶│
//!   │  │                                              │
//!   │  └─ task_tx ─▶ Worker (C4) ─▶ TaskDispatcher (C6) ─▶ UseCase
//!   │                    │                 │
//!   │                    └─ RateLimiter (C3)
//!   │
//!   └◀── ResultEnvelope ── Worker
//!
//! Reaper (C2) ──reclaim_expired_leases──▶ Postgres (independent loop)
//! ```

pub mod accounts;
pub mod browser_port;
pub mod dispatcher;
pub mod encryption;
#[cfg(any(test, feature = "test-support"))]
pub mod memory_store;
pub mod metrics;
pub mod model;
pub mod rate_limiter;
pub mod reaper;
pub mod router;
pub mod store;
pub mod worker;

pub use accounts::{load_accounts, AccountConfig};
pub use browser_port::{BrowserPort, BrowserPortError, NullBrowserPort, ProfileSnapshot};
pub use dispatcher::{TaskDispatcher, UseCase, UseCaseContext, UseCaseError, UseCaseOutcome};
pub use encryption::{CredentialCodec, CredentialError};
pub use metrics::Metrics;
pub use model::{
    Job, JobCounters, JobKind, JobStatus, NewTask, ResultEnvelope, RetryReason, Task, TaskStatus,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, WaitOutcome, WindowConfig};
pub use reaper::{LeaseReaper, ReaperConfig};
pub use router::{Router, RouterConfig, RouterHandle};
pub use store::{JobFilters, JobProgress, JobTaskStore, PgJobTaskStore, StoreError, StoreResult};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerState};
