//! Logging setup and in-process counters for the time-control engine.

#![deny(unsafe_code)]

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Logging setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Another global subscriber was installed first.
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

fn json_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default().with(filter).with(fmt_layer)
}

/// Initialize structured logging (JSON on stderr) with env filter.
/// Set RUST_LOG, e.g., "info,timecontrol=debug".
pub fn init_json_logging() {
    tracing::subscriber::set_global_default(json_subscriber()).ok();
}

/// Like [`init_json_logging`] but reports when another subscriber already won.
pub fn try_init_json_logging() -> Result<(), TelemetryError> {
    tracing::subscriber::set_global_default(json_subscriber())
        .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))
}

/// Point-in-time copy of [`ClockMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pushes: u64,
    pub elapses: u64,
    pub restores: u64,
}

/// Monotonic counters shared by every pair built from the same environment.
#[derive(Clone, Default, Debug)]
pub struct ClockMetrics {
    pushes: Arc<AtomicU64>,
    elapses: Arc<AtomicU64>,
    restores: Arc<AtomicU64>,
}

impl ClockMetrics {
    pub fn new() -> Self {
        Self::default()
    }
    /// One accepted push.
    pub fn record_push(&self) {
        let _ = self.pushes.fetch_add(1, Ordering::Relaxed);
    }
    /// One elapse raised, including one replayed during a restore.
    pub fn record_elapse(&self) {
        let _ = self.elapses.fetch_add(1, Ordering::Relaxed);
    }
    /// One snapshot restored.
    pub fn record_restore(&self) {
        let _ = self.restores.fetch_add(1, Ordering::Relaxed);
    }
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            elapses: self.elapses.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
        }
    }
}
