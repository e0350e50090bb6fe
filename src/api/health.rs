//! Shared health state for the /health endpoint.
//! Updated by request handlers, read by the health route.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared request/upstream counters.
#[derive(Default)]
pub struct HealthState {
    /// Analytics requests answered successfully.
    pub requests_served: AtomicU64,
    /// Requests that failed because the data source did.
    pub upstream_errors: AtomicU64,
    /// Unix seconds of the last successful upstream fetch (0 = none).
    pub last_upstream_ok_secs: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests_served(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upstream_errors(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_upstream_ok_secs(&self, secs: u64) {
        self.last_upstream_ok_secs.store(secs, Ordering::Relaxed);
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn upstream_errors(&self) -> u64 {
        self.upstream_errors.load(Ordering::Relaxed)
    }

    pub fn last_upstream_ok_secs(&self) -> u64 {
        self.last_upstream_ok_secs.load(Ordering::Relaxed)
    }
}
