//! HTTP front-end (C7): thin by design (spec.md §4.7). Wires the job
//! subsystem onto Axum, authenticates requests, and enforces a
//! per-client API rate limit. No scheduling logic lives here.

pub mod app;
pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod routes;

pub use app::{build_app, AppState};
