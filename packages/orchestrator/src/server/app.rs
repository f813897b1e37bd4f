//! Application state and router assembly (C7). Thin by design (spec.md
//! §4.7): this module wires HTTP onto the C1 store and the C5 router's
//! handle, performs auth and API-level rate limiting, and validates
//! request bodies. No scheduling logic lives here.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::clients::{ClientStore, JwtService};
use crate::kernel::jobs::{CredentialCodec, JobTaskStore, Metrics, RouterHandle, WorkerHandle};

use super::rate_limit::ClientRateLimiter;
use super::routes;

/// Shared state for every C7 handler. Cloning is cheap: everything
/// inside is an `Arc` or a pool handle, following the teacher's
/// `AxumAppState` convention of a single `Clone` struct threaded
/// through `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub store: Arc<dyn JobTaskStore>,
    pub router_handle: RouterHandle,
    pub worker_handles: Vec<WorkerHandle>,
    pub clients: Arc<ClientStore>,
    pub jwt_service: Arc<JwtService>,
    pub credential_codec: Arc<CredentialCodec>,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: Arc<ClientRateLimiter>,
    pub default_lease_ttl_s: i64,
    pub default_max_attempts: i32,
}

/// Builds the Axum application: every route in spec.md §6's endpoint
/// table, CORS, tracing, and a request-body-size cap (`max_body_bytes`).
pub fn build_app(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let protected = Router::new()
        .route("/api/send/dm", post(routes::jobs::send_dm))
        .route("/api/analyze/profiles", post(routes::jobs::analyze_profiles))
        .route("/api/followings", post(routes::jobs::fetch_followings))
        .route("/api/jobs/:id", get(routes::jobs::get_job))
        .route("/api/jobs/:id/cancel", post(routes::jobs::cancel_job));

    let public = Router::new()
        .route("/api/auth/login", post(routes::auth::login))
        .route("/health", get(routes::health::health))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        .route("/metrics", get(routes::metrics::metrics));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Used by the reaper/router startup sequence to bound how long a
/// store round-trip is allowed to suspend a health check (spec.md §5
/// "Suspension points").
pub const HEALTH_DB_TIMEOUT: Duration = Duration::from_secs(5);
