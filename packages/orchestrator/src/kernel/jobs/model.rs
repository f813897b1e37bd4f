//! Job and task data model for the account-automation scheduler.
//!
//! A [`Job`] is client intent ("send these 40 people a DM"); a [`Task`] is
//! one leaf unit of that intent bound to a single target. Tasks are the
//! only thing the router leases and workers execute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::FromRow;
use uuid::Uuid;

/// The four job kinds the system knows how to decompose into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    AnalyzeProfiles,
    SendMessages,
    FetchFollowings,
    LoginCheck,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AnalyzeProfiles => "analyze_profiles",
            JobKind::SendMessages => "send_messages",
            JobKind::FetchFollowings => "fetch_followings",
            JobKind::LoginCheck => "login_check",
        }
    }

    /// The task kind a job of this kind decomposes into. Some job kinds
    /// have a single narrower task kind in this system but the taxonomy
    /// is kept separate per spec so a job kind can grow more than one
    /// task kind later without a schema change.
    pub fn task_kind(&self) -> &'static str {
        self.as_str()
    }
}

impl std::str::FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze_profiles" => Ok(JobKind::AnalyzeProfiles),
            "send_messages" => Ok(JobKind::SendMessages),
            "fetch_followings" => Ok(JobKind::FetchFollowings),
            "login_check" => Ok(JobKind::LoginCheck),
            other => Err(anyhow::anyhow!("unknown job kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Leased,
    Done,
    Error,
    Cancelled,
}

/// Aggregate counters maintained on the job row so progress queries are
/// cheap reads instead of a `GROUP BY` over `job_tasks` on every poll.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobCounters {
    pub total: i32,
    pub finished: i32,
    pub errored: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub client_id: Uuid,
    pub kind: String,
    pub priority: i16,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub counters: sqlx::types::Json<JobCounters>,
}

impl Job {
    pub fn kind(&self) -> anyhow::Result<JobKind> {
        self.kind.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: String,
    pub job_id: Uuid,
    pub kind: String,
    pub target: String,
    pub payload: sqlx::types::Json<Json>,
    pub status: TaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub leased_by: Option<String>,
    pub leased_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub lease_ttl_seconds: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Task id is stable and derived, never client-supplied: `{job_id}:{kind}:{target}`.
    pub fn make_id(job_id: Uuid, kind: &str, target: &str) -> String {
        format!("{job_id}:{kind}:{target}")
    }

    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, TaskStatus::Leased)
            && self.leased_by.is_some()
            && self.leased_at.is_some()
            && self.lease_expires_at.is_some_and(|exp| now < exp)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Done | TaskStatus::Cancelled)
            || (self.status == TaskStatus::Error)
    }
}

/// A task queued for creation as part of a job; the caller fills in
/// `target` and `payload`, the store fills in everything else.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: String,
    pub target: String,
    pub payload: Json,
    pub lease_ttl_seconds: i32,
    pub max_attempts: i32,
}

/// Canonical retry reasons a use-case may emit. Anything else is treated
/// as non-retryable by the router (spec: "Any unknown failure is
/// non-retryable by default").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryReason {
    DriverDead,
    TransientUiBlock,
    RateLimited,
    Network,
    SessionExpired,
}

impl RetryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryReason::DriverDead => "driver_dead",
            RetryReason::TransientUiBlock => "transient_ui_block",
            RetryReason::RateLimited => "rate_limited",
            RetryReason::Network => "network",
            RetryReason::SessionExpired => "session_expired",
        }
    }
}

/// What a worker hands back to the router after running a task.
#[derive(Debug, Clone)]
pub struct ResultEnvelope {
    pub task_id: String,
    pub job_id: Uuid,
    pub account: String,
    pub target: String,
    pub correlation_id: Option<String>,
    pub attempts: i32,
    pub ok: bool,
    pub error: Option<String>,
    pub result: Option<Json>,
    pub retryable: bool,
    pub retry_reason: Option<RetryReason>,
    pub max_attempts: i32,
}
