// Kernel - core infrastructure: the job scheduling and task-lease
// subsystem (store, reaper, rate limiter, worker, router, dispatcher)
// plus the dependency container that wires them together.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic (use-cases) lives in domains::automation.

pub mod app_deps;
pub mod jobs;

pub use app_deps::AppDeps;
