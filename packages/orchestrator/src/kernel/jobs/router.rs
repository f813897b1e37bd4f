//! Router/dispatcher (C5): single-threaded cooperative scheduler over an
//! in-process event channel. This is the only writer of job/task state
//! besides the reaper (spec.md §4.2, §9 "cyclic relationships").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::metrics::Metrics;
use super::model::{ResultEnvelope, Task};
use super::store::JobTaskStore;

/// One entry per registered worker. `task_tx` has a small bounded
/// capacity (`worker_channel_capacity`, default 1) so a slow worker
/// back-pressures claiming rather than letting the router build an
/// unbounded in-memory queue (spec.md §5 "Back-pressure").
struct WorkerEntry {
    account: String,
    supported_kinds: Vec<String>,
    busy: bool,
    task_tx: mpsc::Sender<Task>,
}

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub max_inflight_per_account: usize,
    pub lease_ttl: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_inflight_per_account: 1,
            lease_ttl: Duration::from_secs(300),
        }
    }
}

/// Internal events the router's loop reacts to. Never exposed outside
/// this module; callers only see [`RouterHandle`].
enum RouterEvent {
    WorkerReady {
        worker_id: String,
        account: String,
        supported_kinds: Vec<String>,
        task_tx: mpsc::Sender<Task>,
    },
    Result(ResultEnvelope),
    Wake,
    Cancel(Uuid),
}

/// Cloneable sender half; C7 pushes `Wake` after creating tasks and
/// `Cancel` after a cancel request without touching router-internal
/// state directly (spec.md §5 "Router's in-memory job map: mutated only
/// on the router event loop").
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterEvent>,
}

impl RouterHandle {
    pub async fn wake(&self) {
        let _ = self.tx.send(RouterEvent::Wake).await;
    }

    pub async fn cancel(&self, job_id: Uuid) {
        let _ = self.tx.send(RouterEvent::Cancel(job_id)).await;
    }

    pub async fn register_worker(
        &self,
        worker_id: String,
        account: String,
        supported_kinds: Vec<String>,
        task_tx: mpsc::Sender<Task>,
    ) {
        let _ = self
            .tx
            .send(RouterEvent::WorkerReady { worker_id, account, supported_kinds, task_tx })
            .await;
    }

    pub async fn submit_result(&self, envelope: ResultEnvelope) {
        let _ = self.tx.send(RouterEvent::Result(envelope)).await;
    }
}

pub struct Router {
    store: Arc<dyn JobTaskStore>,
    config: RouterConfig,
    metrics: Arc<Metrics>,
    rx: mpsc::Receiver<RouterEvent>,
    handle: RouterHandle,
    workers: HashMap<String, WorkerEntry>,
    /// task_id -> (worker_id, account), populated on claim and consumed
    /// when the matching result arrives.
    in_flight: HashMap<String, (String, String)>,
    account_inflight: HashMap<String, usize>,
    cancelled_jobs: HashSet<Uuid>,
}

impl Router {
    pub fn new(
        store: Arc<dyn JobTaskStore>,
        config: RouterConfig,
        metrics: Arc<Metrics>,
    ) -> (Self, RouterHandle) {
        let (tx, rx) = mpsc::channel(256);
        let handle = RouterHandle { tx };
        (
            Self {
                store,
                config,
                metrics,
                rx,
                handle: handle.clone(),
                workers: HashMap::new(),
                in_flight: HashMap::new(),
                account_inflight: HashMap::new(),
                cancelled_jobs: HashSet::new(),
            },
            handle,
        )
    }

    pub fn handle(&self) -> RouterHandle {
        self.handle.clone()
    }

    /// Runs the cooperative loop until `shutdown` is cancelled. A
    /// periodic tick re-polls ready workers even with no external
    /// event, so a worker that finished quickly doesn't sit idle
    /// waiting on a `Wake` that never comes (spec.md §4.2 algorithm
    /// step 1: "ready workers are always re-polled").
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("router starting");
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.try_claim_for_ready_workers().await;
                }
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
            }
        }
        info!("router stopped");
    }

    async fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::WorkerReady { worker_id, account, supported_kinds, task_tx } => {
                self.workers.insert(
                    worker_id.clone(),
                    WorkerEntry { account, supported_kinds, busy: false, task_tx },
                );
                debug!(worker_id, "router: worker registered");
                self.try_claim_for_ready_workers().await;
            }
            RouterEvent::Result(envelope) => self.handle_result(envelope).await,
            RouterEvent::Wake => self.try_claim_for_ready_workers().await,
            RouterEvent::Cancel(job_id) => {
                self.cancelled_jobs.insert(job_id);
                if let Err(e) = self.store.cancel_job(job_id).await {
                    warn!(job_id = %job_id, error = %e, "router: cancel_job failed");
                }
            }
        }
    }

    async fn try_claim_for_ready_workers(&mut self) {
        let worker_ids: Vec<String> = self.workers.keys().cloned().collect();
        for worker_id in worker_ids {
            let Some(worker) = self.workers.get(&worker_id) else { continue };
            if worker.busy {
                continue;
            }
            let account_cap = *self.account_inflight.get(&worker.account).unwrap_or(&0);
            if account_cap >= self.config.max_inflight_per_account {
                continue;
            }

            let account = worker.account.clone();
            let kinds = worker.supported_kinds.clone();

            let claimed = self
                .store
                .claim_next(&account, &kinds, &worker_id, self.config.lease_ttl)
                .await;

            match claimed {
                Ok(Some(task)) => {
                    self.metrics.tasks_claimed.inc();
                    self.metrics.inflight_tasks.add(1);
                    *self.account_inflight.entry(account.clone()).or_insert(0) += 1;
                    self.in_flight.insert(task.id.clone(), (worker_id.clone(), account));
                    if let Some(w) = self.workers.get_mut(&worker_id) {
                        w.busy = true;
                        if w.task_tx.send(task).await.is_err() {
                            warn!(worker_id, "router: worker channel closed, dropping assignment");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(worker_id, error = %e, "router: claim_next failed"),
            }
        }
    }

    async fn handle_result(&mut self, envelope: ResultEnvelope) {
        if let Some((worker_id, account)) = self.in_flight.remove(&envelope.task_id) {
            if let Some(w) = self.workers.get_mut(&worker_id) {
                w.busy = false;
            }
            if let Some(count) = self.account_inflight.get_mut(&account) {
                *count = count.saturating_sub(1);
            }
        } else {
            debug!(task_id = envelope.task_id, "router: result for unknown in-flight task (stale)");
        }
        self.metrics.inflight_tasks.add(-1);

        if self.cancelled_jobs.contains(&envelope.job_id) {
            debug!(job_id = %envelope.job_id, "router: dropping result for cancelled job");
            self.try_claim_for_ready_workers().await;
            return;
        }

        if envelope.ok {
            self.metrics.tasks_done.inc();
            if let Err(e) = self.store.mark_done(&envelope.task_id, envelope.result.clone()).await {
                warn!(task_id = envelope.task_id, error = %e, "router: mark_done failed");
            }
        } else if envelope.retryable {
            self.metrics.tasks_requeued.inc();
            let reason = envelope.retry_reason.map(|r| r.as_str()).unwrap_or("unspecified");
            if let Err(e) = self
                .store
                .requeue_task_with_attempts_cap(&envelope.task_id, reason, envelope.max_attempts)
                .await
            {
                warn!(task_id = envelope.task_id, error = %e, "router: requeue failed");
            }
        } else {
            self.metrics.tasks_error.inc();
            let error = envelope.error.as_deref().unwrap_or("unknown error");
            if let Err(e) = self.store.mark_error(&envelope.task_id, error, true).await {
                warn!(task_id = envelope.task_id, error = %e, "router: mark_error failed");
            }
        }

        if let Err(e) = self.store.sync_job_completion(envelope.job_id).await {
            warn!(job_id = %envelope.job_id, error = %e, "router: sync_job_completion failed");
        }

        self.try_claim_for_ready_workers().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::memory_store::InMemoryJobTaskStore;
    use crate::kernel::jobs::model::{JobKind, NewTask, RetryReason};
    use std::time::Duration as StdDuration;

    async fn make_router() -> (Router, RouterHandle, Arc<dyn JobTaskStore>, Arc<Metrics>) {
        let store: Arc<dyn JobTaskStore> = Arc::new(InMemoryJobTaskStore::new());
        let metrics = Arc::new(Metrics::default());
        let (router, handle) = Router::new(store.clone(), RouterConfig::default(), metrics.clone());
        (router, handle, store, metrics)
    }

    #[tokio::test]
    async fn single_worker_receives_claimed_task_and_reports_done() {
        let (router, handle, store, _metrics) = make_router().await;
        let job = store
            .create_job(Uuid::new_v4(), JobKind::SendMessages, 0, None)
            .await
            .unwrap();
        store
            .create_tasks(
                job.id,
                vec![NewTask {
                    kind: "send_messages".into(),
                    target: "alice".into(),
                    payload: serde_json::Value::Null,
                    lease_ttl_seconds: 300,
                    max_attempts: 3,
                }],
            )
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let router_shutdown = shutdown.clone();
        let router_handle = tokio::spawn(router.run(router_shutdown));

        let (task_tx, mut task_rx) = mpsc::channel(1);
        handle
            .register_worker(
                "worker-a".into(),
                "acct-1".into(),
                vec!["send_messages".into()],
                task_tx,
            )
            .await;

        let task = tokio::time::timeout(StdDuration::from_secs(1), task_rx.recv())
            .await
            .expect("task delivered")
            .expect("channel open");
        assert_eq!(task.target, "alice");

        handle
            .submit_result(ResultEnvelope {
                task_id: task.id.clone(),
                job_id: job.id,
                account: "acct-1".into(),
                target: "alice".into(),
                correlation_id: None,
                attempts: task.attempts,
                ok: true,
                error: None,
                result: None,
                retryable: false,
                retry_reason: None,
                max_attempts: task.max_attempts,
            })
            .await;

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let progress = store.job_progress(job.id).await.unwrap();
        assert_eq!(progress.done, 1);

        shutdown.cancel();
        router_handle.await.unwrap();
    }

    #[tokio::test]
    async fn retryable_result_is_requeued_and_reclaimed() {
        let (router, handle, store, _metrics) = make_router().await;
        let job = store
            .create_job(Uuid::new_v4(), JobKind::SendMessages, 0, None)
            .await
            .unwrap();
        store
            .create_tasks(
                job.id,
                vec![NewTask {
                    kind: "send_messages".into(),
                    target: "alice".into(),
                    payload: serde_json::Value::Null,
                    lease_ttl_seconds: 300,
                    max_attempts: 2,
                }],
            )
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let router_handle = tokio::spawn(router.run(shutdown.clone()));

        let (task_tx, mut task_rx) = mpsc::channel(1);
        handle
            .register_worker("worker-a".into(), "acct-1".into(), vec!["send_messages".into()], task_tx)
            .await;

        let task = tokio::time::timeout(StdDuration::from_secs(1), task_rx.recv())
            .await
            .unwrap()
            .unwrap();

        handle
            .submit_result(ResultEnvelope {
                task_id: task.id.clone(),
                job_id: job.id,
                account: "acct-1".into(),
                target: "alice".into(),
                correlation_id: None,
                attempts: task.attempts,
                ok: false,
                error: Some("driver crashed".into()),
                result: None,
                retryable: true,
                retry_reason: Some(RetryReason::DriverDead),
                max_attempts: task.max_attempts,
            })
            .await;

        let retried = tokio::time::timeout(StdDuration::from_secs(1), task_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.attempts, 2);

        shutdown.cancel();
        router_handle.await.unwrap();
    }
}
