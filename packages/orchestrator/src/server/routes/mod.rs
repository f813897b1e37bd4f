//! HTTP routes (C7): one module per area of spec.md §6's endpoint table.

pub mod auth;
pub mod health;
pub mod jobs;
pub mod metrics;
