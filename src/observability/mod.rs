//! Structured logging and per-analysis metrics.
//!
//! This module provides:
//! - [`init_logging`]: one-time structured logging setup with `RUST_LOG` support
//! - [`AnalysisMetrics`]: sizes and timing of a single analysis run

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// Defaults to `heap_retention=info` when `RUST_LOG` is not set. Logs go to
/// stderr so rendered results on stdout stay machine-readable.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("heap_retention=info"));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Sizes and timing of one analysis run.
///
/// `nodes_kept`/`edges_kept` are zero when the target is not retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub nodes_discovered: usize,
    pub edges_discovered: usize,
    pub nodes_kept: usize,
    pub edges_kept: usize,
    pub found_target: bool,
    pub duration_ms: Option<u64>,
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_duration(&mut self, elapsed: Duration) {
        self.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "nodes_discovered": self.nodes_discovered,
            "edges_discovered": self.edges_discovered,
            "nodes_kept": self.nodes_kept,
            "edges_kept": self.edges_kept,
            "found_target": self.found_target,
            "retention_ratio": self.retention_ratio(),
            "duration_ms": self.duration_ms,
        })
    }

    /// Fraction of discovered nodes that survived minimization.
    pub fn retention_ratio(&self) -> f64 {
        if self.nodes_discovered == 0 {
            return 0.0;
        }
        self.nodes_kept as f64 / self.nodes_discovered as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
