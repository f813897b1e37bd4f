//! Job-submission and progress endpoints (spec.md §6): `POST
//! /api/send/dm`, `POST /api/analyze/profiles`, `POST /api/followings`,
//! `GET /api/jobs/{id}`, `POST /api/jobs/{id}/cancel`. Every submission
//! handler does the same three things: validate, create a job plus one
//! task per target, then wake the router — no scheduling logic lives
//! here (spec.md §4.7).

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json_;
use uuid::Uuid;

use crate::domains::clients::Scope;
use crate::kernel::jobs::{JobKind, JobStatus, NewTask};

use super::super::app::AppState;
use super::super::auth::AuthenticatedClient;
use super::super::error::ApiError;

const MAX_TARGETS_PER_JOB: usize = 500;

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: &'static str,
    pub task_count: usize,
}

async fn submit_job(
    state: &AppState,
    client_id: Uuid,
    kind: JobKind,
    priority: i16,
    correlation_id: Option<String>,
    tasks: Vec<NewTask>,
) -> Result<Json<JobAccepted>, ApiError> {
    if tasks.is_empty() {
        return Err(ApiError::BadRequest("at least one target is required".into()));
    }
    if tasks.len() > MAX_TARGETS_PER_JOB {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_TARGETS_PER_JOB} targets are allowed per job"
        )));
    }

    let job = state
        .store
        .create_job(client_id, kind, priority, correlation_id)
        .await?;
    let task_count = state.store.create_tasks(job.id, tasks).await?;
    state.router_handle.wake().await;

    Ok(Json(JobAccepted {
        job_id: job.id,
        status: "pending",
        task_count,
    }))
}

fn new_task(state: &AppState, kind: &str, target: String, payload: Json_) -> NewTask {
    NewTask {
        kind: kind.to_string(),
        target,
        payload,
        lease_ttl_seconds: state.default_lease_ttl_s as i32,
        max_attempts: state.default_max_attempts,
    }
}

#[derive(Debug, Deserialize)]
pub struct SendDmRequest {
    pub targets: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: i16,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

pub async fn send_dm(
    State(state): State<AppState>,
    client: AuthenticatedClient,
    Json(req): Json<SendDmRequest>,
) -> Result<Json<JobAccepted>, ApiError> {
    client.require_scope(Scope::Send)?;

    if req.text.is_none() && req.template_id.is_none() {
        return Err(ApiError::BadRequest(
            "one of text or template_id is required".into(),
        ));
    }

    let tasks = req
        .targets
        .into_iter()
        .map(|target| {
            new_task(
                &state,
                "send_messages",
                target,
                serde_json::json!({
                    "text": req.text,
                    "template_id": req.template_id,
                    "category": req.category,
                }),
            )
        })
        .collect();

    submit_job(
        &state,
        client.client_id,
        JobKind::SendMessages,
        req.priority,
        req.correlation_id,
        tasks,
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeProfilesRequest {
    pub usernames: Vec<String>,
    #[serde(default)]
    pub fetch_reels: bool,
    #[serde(default)]
    pub max_reels: Option<u32>,
    #[serde(default)]
    pub priority: i16,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

pub async fn analyze_profiles(
    State(state): State<AppState>,
    client: AuthenticatedClient,
    Json(req): Json<AnalyzeProfilesRequest>,
) -> Result<Json<JobAccepted>, ApiError> {
    client.require_scope(Scope::Analyze)?;

    let tasks = req
        .usernames
        .into_iter()
        .map(|username| {
            new_task(
                &state,
                "analyze_profiles",
                username,
                serde_json::json!({
                    "fetch_reels": req.fetch_reels,
                    "max_reels": req.max_reels,
                }),
            )
        })
        .collect();

    submit_job(
        &state,
        client.client_id,
        JobKind::AnalyzeProfiles,
        req.priority,
        req.correlation_id,
        tasks,
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct FetchFollowingsRequest {
    pub owner: String,
    #[serde(default = "default_max_followings")]
    pub max_followings: usize,
    #[serde(default)]
    pub priority: i16,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

fn default_max_followings() -> usize {
    100
}

pub async fn fetch_followings(
    State(state): State<AppState>,
    client: AuthenticatedClient,
    Json(req): Json<FetchFollowingsRequest>,
) -> Result<Json<JobAccepted>, ApiError> {
    client.require_scope(Scope::Fetch)?;

    if req.owner.trim().is_empty() {
        return Err(ApiError::BadRequest("owner must not be empty".into()));
    }

    let task = new_task(
        &state,
        "fetch_followings",
        req.owner.clone(),
        serde_json::json!({ "max_followings": req.max_followings }),
    );

    submit_job(
        &state,
        client.client_id,
        JobKind::FetchFollowings,
        req.priority,
        req.correlation_id,
        vec![task],
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: i64,
    pub pending: i64,
    pub leased: i64,
    pub done: i64,
    pub error: i64,
    pub cancelled: i64,
}

pub async fn get_job(
    State(state): State<AppState>,
    client: AuthenticatedClient,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let progress = state.store.job_progress(id).await?;
    if progress.client_id != client.client_id {
        return Err(ApiError::NotFound(format!("job {id} not found")));
    }
    Ok(Json(JobStatusResponse {
        job_id: progress.job_id,
        status: progress.status,
        total: progress.total,
        pending: progress.pending,
        leased: progress.leased,
        done: progress.done,
        error: progress.error,
        cancelled: progress.cancelled,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub status: &'static str,
}

pub async fn cancel_job(
    State(state): State<AppState>,
    client: AuthenticatedClient,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let progress = state.store.job_progress(id).await?;
    if progress.client_id != client.client_id {
        return Err(ApiError::NotFound(format!("job {id} not found")));
    }

    state.store.cancel_job(id).await?;
    state.router_handle.cancel(id).await;

    Ok(Json(CancelResponse {
        job_id: id,
        status: "cancelled",
    }))
}
