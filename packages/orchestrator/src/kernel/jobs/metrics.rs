//! Minimal counters/gauges rendered by `/metrics` (spec.md §6). No metrics
//! crate is pulled in — none of the retrieved example repos depend on
//! one, so a handful of atomics rendered as Prometheus-style text is the
//! leanest ecosystem-idiomatic choice (see DESIGN.md).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn set(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub tasks_claimed: Counter,
    pub tasks_done: Counter,
    pub tasks_error: Counter,
    pub tasks_requeued: Counter,
    pub leases_reclaimed: Counter,
    pub inflight_tasks: Gauge,
}

impl Metrics {
    /// Renders the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let line = |out: &mut String, name: &str, help: &str, kind: &str, value: i64| {
            out.push_str(&format!("# HELP {name} {help}\n"));
            out.push_str(&format!("# TYPE {name} {kind}\n"));
            out.push_str(&format!("{name} {value}\n"));
        };
        line(
            &mut out,
            "tasks_claimed_total",
            "Tasks claimed by claim_next",
            "counter",
            self.tasks_claimed.get() as i64,
        );
        line(
            &mut out,
            "tasks_done_total",
            "Tasks marked done",
            "counter",
            self.tasks_done.get() as i64,
        );
        line(
            &mut out,
            "tasks_error_total",
            "Tasks marked terminally errored",
            "counter",
            self.tasks_error.get() as i64,
        );
        line(
            &mut out,
            "tasks_requeued_total",
            "Tasks requeued after a retryable failure",
            "counter",
            self.tasks_requeued.get() as i64,
        );
        line(
            &mut out,
            "leases_reclaimed_total",
            "Expired leases reclaimed by the reaper",
            "counter",
            self.leases_reclaimed.get() as i64,
        );
        line(
            &mut out,
            "inflight_tasks",
            "Tasks currently leased across all accounts",
            "gauge",
            self.inflight_tasks.get(),
        );
        out
    }
}
