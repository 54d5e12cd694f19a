use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use serde::Serialize;

use crate::protocol::StatusCode;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Metrics {
    pub uptime_seconds: u64,
    pub total_connections: u64,
    pub active_connections: u64,
    pub uploads_completed: u64,
    pub uploads_rejected: u64,
    pub uploads_failed: u64,
    pub short_transfers: u64,
    pub bytes_received: u64,
}

/// Process-wide counters shared by the listener and every session
pub struct MetricsCollector {
    start_time: Instant,
    connections: AtomicU64,
    active_connections: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    short_transfers: AtomicU64,
    bytes_received: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            short_transfers: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_short_transfer(&self) {
        self.short_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, code: StatusCode) {
        let counter = match code {
            StatusCode::Success => &self.completed,
            StatusCode::InsufficientStorage => &self.rejected,
            StatusCode::InternalError | StatusCode::Other(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self) -> Metrics {
        Metrics {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            total_connections: self.connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            uploads_completed: self.completed.load(Ordering::Relaxed),
            uploads_rejected: self.rejected.load(Ordering::Relaxed),
            uploads_failed: self.failed.load(Ordering::Relaxed),
            short_transfers: self.short_transfers.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}
