//! `GET /health`, `/ready`, `/live` (spec.md §6: "Process and dependency
//! health"). Generalized from the teacher's single combined health
//! handler into the three separate probes a container orchestrator
//! expects: `/live` never touches a dependency, `/ready` and `/health`
//! both check the database.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::jobs::WorkerState;
use crate::server::app::{AppState, HEALTH_DB_TIMEOUT};

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    connection_pool: ConnectionPoolHealth,
    workers: WorkerPoolHealth,
}

/// Per-state counts across this process's registered workers (spec.md
/// §4.4 "Lifecycle states"). `stopped` outside of a deliberate shutdown
/// usually means a worker's session probe failed on startup.
#[derive(Serialize)]
pub struct WorkerPoolHealth {
    total: usize,
    starting: usize,
    ready: usize,
    busy: usize,
    draining: usize,
    stopped: usize,
}

fn worker_pool_health(handles: &[crate::kernel::jobs::WorkerHandle]) -> WorkerPoolHealth {
    let mut health = WorkerPoolHealth {
        total: handles.len(),
        starting: 0,
        ready: 0,
        busy: 0,
        draining: 0,
        stopped: 0,
    };
    for handle in handles {
        match handle.state() {
            WorkerState::Starting => health.starting += 1,
            WorkerState::Ready => health.ready += 1,
            WorkerState::Busy => health.busy += 1,
            WorkerState::Draining => health.draining += 1,
            WorkerState::Stopped => health.stopped += 1,
        }
    }
    health
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

async fn check_database(state: &AppState) -> DatabaseHealth {
    match tokio::time::timeout(HEALTH_DB_TIMEOUT, sqlx::query("SELECT 1").execute(&state.db_pool))
        .await
    {
        Ok(Ok(_)) => DatabaseHealth { status: "ok".to_string(), error: None },
        Ok(Err(e)) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("query failed: {e}")),
        },
        Err(_) => DatabaseHealth {
            status: "error".to_string(),
            error: Some("query timed out".to_string()),
        },
    }
}

/// Combined health: database + pool utilization. 503 if the database is
/// unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = check_database(&state).await;
    let healthy = database.status == "ok";

    let pool_options = state.db_pool.options();
    let connection_pool = ConnectionPoolHealth {
        size: state.db_pool.size(),
        idle_connections: state.db_pool.num_idle(),
        max_connections: pool_options.get_max_connections(),
    };

    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy".into() } else { "unhealthy".into() },
            database,
            connection_pool,
            workers: worker_pool_health(&state.worker_handles),
        }),
    )
}

/// Readiness: the process can accept traffic (dependencies are up).
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    if check_database(&state).await.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness: the process is up and its event loop is responsive. Never
/// touches a dependency — a stuck database must not restart the pod.
pub async fn live() -> StatusCode {
    StatusCode::OK
}
