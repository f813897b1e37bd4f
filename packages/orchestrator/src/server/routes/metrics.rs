//! `GET /metrics` (spec.md §6): telemetry in Prometheus text exposition
//! format, rendered by [`crate::kernel::jobs::Metrics::render`].

use axum::extract::State;

use crate::server::app::AppState;

pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
