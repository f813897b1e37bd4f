//! In-memory [`JobTaskStore`] double used by router/reaper unit tests so
//! the scheduling logic can be exercised without a live Postgres
//! instance. Mirrors the atomicity and lifecycle guarantees of
//! [`super::store::PgJobTaskStore`] exactly — if a test passes here and
//! fails against Postgres, the SQL is the bug, not the contract.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::model::{Job, JobCounters, JobKind, JobStatus, NewTask, Task, TaskStatus};
use super::store::{JobFilters, JobProgress, JobTaskStore, StoreError, StoreResult};
use async_trait::async_trait;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    tasks: HashMap<String, Task>,
}

pub struct InMemoryJobTaskStore {
    state: Mutex<State>,
}

impl Default for InMemoryJobTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobTaskStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

#[async_trait]
impl JobTaskStore for InMemoryJobTaskStore {
    async fn create_job(
        &self,
        client_id: Uuid,
        kind: JobKind,
        priority: i16,
        correlation_id: Option<String>,
    ) -> StoreResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            client_id,
            kind: kind.as_str().to_string(),
            priority,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            correlation_id,
            counters: sqlx::types::Json(JobCounters::default()),
        };
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn create_tasks(&self, job_id: Uuid, tasks: Vec<NewTask>) -> StoreResult<usize> {
        let mut state = self.state.lock().unwrap();
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::JobNotFound(job_id));
        }
        let now = Utc::now();
        let mut inserted = 0usize;
        for t in tasks {
            let id = Task::make_id(job_id, &t.kind, &t.target);
            if state.tasks.contains_key(&id) {
                continue;
            }
            state.tasks.insert(
                id.clone(),
                Task {
                    id,
                    job_id,
                    kind: t.kind,
                    target: t.target,
                    payload: sqlx::types::Json(t.payload),
                    status: TaskStatus::Pending,
                    attempts: 0,
                    max_attempts: t.max_attempts,
                    last_error: None,
                    leased_by: None,
                    leased_at: None,
                    lease_expires_at: None,
                    lease_ttl_seconds: t.lease_ttl_seconds,
                    created_at: now,
                    updated_at: now,
                },
            );
            inserted += 1;
        }
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.counters.0.total += inserted as i32;
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
            }
            job.updated_at = now;
        }
        Ok(inserted)
    }

    async fn claim_next(
        &self,
        _account_hint: &str,
        kinds: &[String],
        worker_id: &str,
        lease_ttl: Duration,
    ) -> StoreResult<Option<Task>> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let cancelled_or_terminal: std::collections::HashSet<Uuid> = state
            .jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Cancelled | JobStatus::Done | JobStatus::Failed))
            .map(|j| j.id)
            .collect();

        let mut candidates: Vec<&mut Task> = state
            .tasks
            .values_mut()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && kinds.contains(&t.kind)
                    && !cancelled_or_terminal.contains(&t.job_id)
            })
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        // priority DESC, created_at ASC: look up job priority per task.
        let priorities: HashMap<Uuid, i16> =
            state.jobs.iter().map(|(id, j)| (*id, j.priority)).collect();

        candidates.sort_by(|a, b| {
            let pa = priorities.get(&a.job_id).copied().unwrap_or(0);
            let pb = priorities.get(&b.job_id).copied().unwrap_or(0);
            pb.cmp(&pa).then(a.created_at.cmp(&b.created_at))
        });

        let chosen_id = candidates[0].id.clone();
        let task = state.tasks.get_mut(&chosen_id).unwrap();
        task.status = TaskStatus::Leased;
        task.leased_by = Some(worker_id.to_string());
        task.leased_at = Some(now);
        task.lease_expires_at = Some(now + ChronoDuration::seconds(lease_ttl.as_secs() as i64));
        task.attempts += 1;
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn mark_done(&self, task_id: &str, _result: Option<Json>) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::InvalidState(task_id.to_string()))?;
        if task.status != TaskStatus::Leased {
            return Err(StoreError::InvalidState(task_id.to_string()));
        }
        task.status = TaskStatus::Done;
        task.leased_by = None;
        task.leased_at = None;
        task.lease_expires_at = None;
        task.last_error = None;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_error(&self, task_id: &str, error: &str, terminal: bool) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::InvalidState(task_id.to_string()))?;
        if task.status != TaskStatus::Leased {
            return Err(StoreError::InvalidState(task_id.to_string()));
        }
        task.status = if terminal { TaskStatus::Error } else { TaskStatus::Pending };
        task.leased_by = None;
        task.leased_at = None;
        task.lease_expires_at = None;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn requeue_task_with_attempts_cap(
        &self,
        task_id: &str,
        reason: &str,
        max_attempts: i32,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::InvalidState(task_id.to_string()))?;
        if task.status != TaskStatus::Leased {
            return Err(StoreError::InvalidState(task_id.to_string()));
        }
        let requeue = task.attempts < max_attempts;
        task.status = if requeue { TaskStatus::Pending } else { TaskStatus::Error };
        if requeue {
            task.leased_by = None;
            task.leased_at = None;
            task.lease_expires_at = None;
        }
        task.last_error = Some(reason.to_string());
        task.updated_at = Utc::now();
        Ok(requeue)
    }

    async fn reclaim_expired_leases(&self, max_n: i64) -> StoreResult<i64> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut count = 0i64;
        for task in state.tasks.values_mut() {
            if count >= max_n {
                break;
            }
            if task.status == TaskStatus::Leased
                && task.lease_expires_at.is_some_and(|exp| exp < now)
            {
                task.status = TaskStatus::Pending;
                task.leased_by = None;
                task.leased_at = None;
                task.lease_expires_at = None;
                task.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_jobs(&self, filters: JobFilters) -> StoreResult<Vec<Job>> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| filters.client_id.map_or(true, |c| c == j.client_id))
            .filter(|j| filters.status.map_or(true, |s| s == j.status))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let limit = if filters.limit > 0 { filters.limit as usize } else { 100 };
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn job_progress(&self, job_id: Uuid) -> StoreResult<JobProgress> {
        let state = self.state.lock().unwrap();
        let job = state.jobs.get(&job_id).ok_or(StoreError::JobNotFound(job_id))?;
        let tasks: Vec<&Task> = state.tasks.values().filter(|t| t.job_id == job_id).collect();
        let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count() as i64;
        Ok(JobProgress {
            job_id,
            client_id: job.client_id,
            status: job.status,
            total: tasks.len() as i64,
            pending: count(TaskStatus::Pending),
            leased: count(TaskStatus::Leased),
            done: count(TaskStatus::Done),
            error: count(TaskStatus::Error),
            cancelled: count(TaskStatus::Cancelled),
        })
    }

    async fn all_tasks_finished(&self, job_id: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .all(|t| !matches!(t.status, TaskStatus::Pending | TaskStatus::Leased)))
    }

    async fn cancel_job(&self, job_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = JobStatus::Cancelled;
            job.updated_at = Utc::now();
        }
        for task in state.tasks.values_mut() {
            if task.job_id == job_id && task.status == TaskStatus::Pending {
                task.status = TaskStatus::Cancelled;
                task.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn sync_job_completion(&self, job_id: Uuid) -> StoreResult<()> {
        let progress = self.job_progress(job_id).await?;
        if matches!(progress.status, JobStatus::Cancelled) {
            return Ok(());
        }
        if progress.pending + progress.leased > 0 {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = if progress.error > 0 { JobStatus::Failed } else { JobStatus::Done };
            job.counters.0.finished = (progress.done + progress.error + progress.cancelled) as i32;
            job.counters.0.errored = progress.error as i32;
            job.updated_at = Utc::now();
        }
        Ok(())
    }
}
