//! Per-driver request diagnostics

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Request-latency timer and error-rate counter for one driver.
///
/// Cloneable; clones share the same counters. Drivers record every network
/// call here, timed separately from local post-processing, and mark the
/// error rate exactly once per failed call.
#[derive(Debug, Clone, Default)]
pub struct ProtocolDiagnostics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    request_count: AtomicU64,
    request_nanos: AtomicU64,
    max_request_nanos: AtomicU64,
    error_count: AtomicU64,
}

/// Point-in-time view of a driver's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub total_request_time: Duration,
    pub max_request_time: Duration,
}

impl ProtocolDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed network call.
    pub fn record_request(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos() as u64;
        self.inner.request_count.fetch_add(1, Ordering::Relaxed);
        self.inner.request_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.inner.max_request_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Marks one failed protocol call.
    pub fn mark_error(&self) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            request_count: self.inner.request_count.load(Ordering::Relaxed),
            error_count: self.inner.error_count.load(Ordering::Relaxed),
            total_request_time: Duration::from_nanos(self.inner.request_nanos.load(Ordering::Relaxed)),
            max_request_time: Duration::from_nanos(self.inner.max_request_nanos.load(Ordering::Relaxed)),
        }
    }
}
