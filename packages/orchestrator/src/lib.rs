// Account-automation orchestrator.
//
// Multi-tenant job scheduling and task-lease subsystem for automating
// actions against a social-media platform (profile analysis, followings
// harvest, DM send). The core lives in `kernel::jobs` (store, router,
// reaper, rate limiter, worker, dispatcher); `domains::automation` holds
// the use-cases each task kind runs; `domains::clients` and `server`
// are the thin HTTP front-end.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
