//! Observability: dispatch counters and tracing setup

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice is
/// harmless; the second subscriber is ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Counters shared by a pipeline and all of its dispatches
#[derive(Debug, Default)]
pub struct Metrics {
    dispatches: AtomicU64,
    handlers_invoked: AtomicU64,
    failures_recovered: AtomicU64,
    failures_unrouted: AtomicU64,
    duplicate_continuations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch_started(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "dispatches", "Metric incremented");
    }

    pub fn handler_invoked(&self) {
        self.handlers_invoked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "handlers_invoked", "Metric incremented");
    }

    pub fn failure_recovered(&self) {
        self.failures_recovered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "failures_recovered", "Metric incremented");
    }

    pub fn failure_unrouted(&self) {
        self.failures_unrouted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "failures_unrouted", "Metric incremented");
    }

    pub fn duplicate_continuation(&self) {
        self.duplicate_continuations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "duplicate_continuations", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            handlers_invoked: self.handlers_invoked.load(Ordering::Relaxed),
            failures_recovered: self.failures_recovered.load(Ordering::Relaxed),
            failures_unrouted: self.failures_unrouted.load(Ordering::Relaxed),
            duplicate_continuations: self.duplicate_continuations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dispatches: u64,
    pub handlers_invoked: u64,
    pub failures_recovered: u64,
    pub failures_unrouted: u64,
    pub duplicate_continuations: u64,
}
