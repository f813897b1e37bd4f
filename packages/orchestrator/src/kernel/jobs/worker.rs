//! Per-account worker (C4): a long-lived execution context bound to one
//! platform account. Isolated from every other worker and from the
//! router except through channels (spec.md §4.4, §5 "Isolation").

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::browser_port::BrowserPort;
use super::dispatcher::{TaskDispatcher, UseCaseContext};
use super::model::Task;
use super::rate_limiter::RateLimiter;
use super::router::RouterHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Ready,
    Busy,
    Draining,
    Stopped,
}

/// Cloneable read handle onto a [`Worker`]'s lifecycle state, for
/// callers (health checks, metrics) that want to observe it without
/// reaching into the task that owns the worker (spec.md §4.4
/// "Lifecycle states").
#[derive(Clone)]
pub struct WorkerHandle {
    state: Arc<Mutex<WorkerState>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }
}

pub struct WorkerConfig {
    pub worker_id: String,
    pub account: String,
    pub supported_kinds: Vec<String>,
    pub channel_capacity: usize,
}

/// Consumes tasks from the router, runs them through [`TaskDispatcher`],
/// and reports results back. Never touches the store directly (spec.md
/// §3 "Lifecycle ownership": "Workers never mutate the store directly").
pub struct Worker {
    config: WorkerConfig,
    router: RouterHandle,
    dispatcher: Arc<TaskDispatcher>,
    rate_limiter: Arc<RateLimiter>,
    browser: Arc<dyn BrowserPort>,
    state: Arc<Mutex<WorkerState>>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        router: RouterHandle,
        dispatcher: Arc<TaskDispatcher>,
        rate_limiter: Arc<RateLimiter>,
        browser: Arc<dyn BrowserPort>,
    ) -> Self {
        Self {
            config,
            router,
            dispatcher,
            rate_limiter,
            browser,
            state: Arc::new(Mutex::new(WorkerState::Starting)),
        }
    }

    /// A cloneable handle onto this worker's lifecycle state, safe to
    /// hold onto after `run` takes ownership of `self`.
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle { state: self.state.clone() }
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap() = state;
    }

    /// Runs the worker until `shutdown` is cancelled. On `starting`,
    /// probes the session; on unrecoverable auth failure, the worker
    /// simply never announces readiness and exits, letting the reaper
    /// reclaim anything it might otherwise have been assigned.
    pub async fn run(self, shutdown: CancellationToken) {
        let worker_id = self.config.worker_id.clone();
        let account = self.config.account.clone();
        info!(worker_id, account, "worker starting");

        if let Err(e) = self.browser.ensure_session(&account).await {
            error!(worker_id, account, error = %e, "worker: session probe failed, not starting");
            self.set_state(WorkerState::Stopped);
            return;
        }

        let (task_tx, mut task_rx) = mpsc::channel::<Task>(self.config.channel_capacity.max(1));
        self.router
            .register_worker(
                worker_id.clone(),
                account.clone(),
                self.config.supported_kinds.clone(),
                task_tx,
            )
            .await;
        self.set_state(WorkerState::Ready);
        info!(worker_id, account, "worker ready");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                task = task_rx.recv() => {
                    match task {
                        Some(task) => self.process_task(task).await,
                        None => break,
                    }
                }
            }
        }

        self.set_state(WorkerState::Draining);
        self.set_state(WorkerState::Stopped);
        info!(worker_id, account, "worker stopped");
    }

    async fn process_task(&self, task: Task) {
        debug!(worker_id = self.config.worker_id, task_id = task.id, "worker: processing task");
        self.set_state(WorkerState::Busy);

        let ctx = UseCaseContext {
            account: self.config.account.clone(),
            rate_limiter: self.rate_limiter.clone(),
        };

        let mut envelope = self.dispatcher.dispatch(&ctx, &task).await;

        if matches!(
            envelope.retry_reason,
            Some(super::model::RetryReason::TransientUiBlock) | Some(super::model::RetryReason::RateLimited)
        ) {
            warn!(worker_id = self.config.worker_id, account = self.config.account, "worker: soft block or rate limit detected, engaging cooldown");
            self.rate_limiter.trigger_cooldown();
        }

        envelope.account = self.config.account.clone();
        self.router.submit_result(envelope).await;
        self.set_state(WorkerState::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::browser_port::NullBrowserPort;
    use crate::kernel::jobs::dispatcher::{UseCaseError, UseCaseOutcome};
    use crate::kernel::jobs::memory_store::InMemoryJobTaskStore;
    use crate::kernel::jobs::metrics::Metrics;
    use crate::kernel::jobs::model::{JobKind, NewTask, RetryReason};
    use crate::kernel::jobs::rate_limiter::RateLimiterConfig;
    use crate::kernel::jobs::router::{Router, RouterConfig};
    use crate::kernel::jobs::store::JobTaskStore;
    use async_trait::async_trait;
    use serde_json::Value as Json;
    use std::time::Duration;
    use uuid::Uuid;

    struct FlakyOnce(std::sync::atomic::AtomicBool);

    #[async_trait]
    impl crate::kernel::jobs::dispatcher::UseCase for FlakyOnce {
        async fn run(
            &self,
            _ctx: &UseCaseContext,
            _target: &str,
            _payload: &Json,
        ) -> Result<UseCaseOutcome, UseCaseError> {
            if self.0.swap(true, std::sync::atomic::Ordering::SeqCst) {
                Ok(UseCaseOutcome::ok(Some(serde_json::json!({"sent": true}))))
            } else {
                Err(UseCaseError::Retryable {
                    reason: RetryReason::DriverDead,
                    message: "first attempt flaked".into(),
                })
            }
        }
    }

    #[tokio::test]
    async fn worker_runs_task_end_to_end_through_router() {
        let store: Arc<dyn JobTaskStore> = Arc::new(InMemoryJobTaskStore::new());
        let metrics = Arc::new(Metrics::default());
        let (router, router_handle) = Router::new(store.clone(), RouterConfig::default(), metrics);

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
                    payload: Json::Null,
                    lease_ttl_seconds: 300,
                    max_attempts: 3,
                }],
            )
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let router_task = tokio::spawn(router.run(shutdown.clone()));

        let mut dispatcher = TaskDispatcher::new();
        dispatcher.register("send_messages", Arc::new(FlakyOnce(std::sync::atomic::AtomicBool::new(false))));

        let worker = Worker::new(
            WorkerConfig {
                worker_id: "worker-a".into(),
                account: "acct-1".into(),
                supported_kinds: vec!["send_messages".into()],
                channel_capacity: 1,
            },
            router_handle,
            Arc::new(dispatcher),
            Arc::new(RateLimiter::new(RateLimiterConfig::default())),
            Arc::new(NullBrowserPort),
        );
        let worker_handle = worker.handle();
        let worker_shutdown = shutdown.clone();
        let worker_task = tokio::spawn(worker.run(worker_shutdown));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let progress = store.job_progress(job.id).await.unwrap();
        assert_eq!(progress.done, 1);
        assert_eq!(worker_handle.state(), WorkerState::Ready);

        shutdown.cancel();
        router_task.await.unwrap();
        worker_task.await.unwrap();
        assert_eq!(worker_handle.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn worker_reports_stopped_when_session_probe_fails() {
        struct AlwaysFailsAuth;

        #[async_trait]
        impl crate::kernel::jobs::browser_port::BrowserPort for AlwaysFailsAuth {
            async fn ensure_session(
                &self,
                _account: &str,
            ) -> Result<(), crate::kernel::jobs::browser_port::BrowserPortError> {
                Err(crate::kernel::jobs::browser_port::BrowserPortError::Auth(
                    "invalid session".into(),
                ))
            }
            async fn open_profile(
                &self,
                _username: &str,
            ) -> Result<(), crate::kernel::jobs::browser_port::BrowserPortError> {
                unreachable!("never reached: session probe fails first")
            }
            async fn snapshot(
                &self,
                _username: &str,
            ) -> Result<
                crate::kernel::jobs::browser_port::ProfileSnapshot,
                crate::kernel::jobs::browser_port::BrowserPortError,
            > {
                unreachable!("never reached: session probe fails first")
            }
            async fn fetch_followings(
                &self,
                _username: &str,
                _max: usize,
            ) -> Result<Vec<String>, crate::kernel::jobs::browser_port::BrowserPortError> {
                unreachable!("never reached: session probe fails first")
            }
            async fn send_dm(
                &self,
                _username: &str,
                _text: &str,
            ) -> Result<bool, crate::kernel::jobs::browser_port::BrowserPortError> {
                unreachable!("never reached: session probe fails first")
            }
        }

        let store: Arc<dyn JobTaskStore> = Arc::new(InMemoryJobTaskStore::new());
        let metrics = Arc::new(Metrics::default());
        let (_router, router_handle) = Router::new(store, RouterConfig::default(), metrics);

        let worker = Worker::new(
            WorkerConfig {
                worker_id: "worker-b".into(),
                account: "acct-2".into(),
                supported_kinds: vec!["send_messages".into()],
                channel_capacity: 1,
            },
            router_handle,
            Arc::new(TaskDispatcher::new()),
            Arc::new(RateLimiter::new(RateLimiterConfig::default())),
            Arc::new(AlwaysFailsAuth),
        );
        let worker_handle = worker.handle();
        assert_eq!(worker_handle.state(), WorkerState::Starting);

        worker.run(CancellationToken::new()).await;
        assert_eq!(worker_handle.state(), WorkerState::Stopped);
    }
}
