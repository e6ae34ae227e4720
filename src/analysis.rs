//! Analysis entry point: forward search, minimization, result assembly.
//!
//! Every call builds fresh graphs and shares nothing with other calls, so
//! independent analyses may run back to back (or in parallel, each with its
//! own source) without coordination.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::graph::forward;
use crate::graph::minimize::minimize;
use crate::graph::model::RetentionGraph;
use crate::observability::AnalysisMetrics;
use crate::source::HeapEdgeSource;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Verdict of one analysis.
///
/// An unreachable target and a minimization that never bottoms out at a
/// held value both produce [`RetentionResult::NotRetained`]; callers cannot
/// tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetentionResult {
    NotRetained,
    Retained { graph: RetentionGraph },
}

impl RetentionResult {
    pub fn is_retained(&self) -> bool {
        matches!(self, Self::Retained { .. })
    }

    pub fn graph(&self) -> Option<&RetentionGraph> {
        match self {
            Self::Retained { graph } => Some(graph),
            Self::NotRetained => None,
        }
    }
}

impl From<Option<RetentionGraph>> for RetentionResult {
    fn from(graph: Option<RetentionGraph>) -> Self {
        match graph {
            Some(graph) => Self::Retained { graph },
            None => Self::NotRetained,
        }
    }
}

/// A verdict plus the metrics gathered while reaching it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: RetentionResult,
    pub metrics: AnalysisMetrics,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Is `target` retained by `held`?
///
/// Errors are reserved for bad input, a failing source, or a broken source
/// contract; "not retained" is an ordinary `Ok` answer.
pub fn analyze_retention<S: HeapEdgeSource>(
    source: S,
    held: &[S::Value],
    target: &S::Value,
    strong_references_only: bool,
) -> Result<RetentionResult> {
    run_analysis(source, held, target, strong_references_only).map(|a| a.result)
}

/// [`analyze_retention`] with metrics.
pub fn run_analysis<S: HeapEdgeSource>(
    mut source: S,
    held: &[S::Value],
    target: &S::Value,
    strong_references_only: bool,
) -> Result<Analysis> {
    let started = Instant::now();
    let discovery = forward::search(&mut source, held, target, strong_references_only)?;

    let mut metrics = AnalysisMetrics::new();
    metrics.nodes_discovered = discovery.graph.node_count();
    metrics.edges_discovered = discovery
        .graph
        .edges()
        .iter()
        .filter(|e| !e.is_marker())
        .count();
    metrics.found_target = discovery.found_target;

    let result = RetentionResult::from(minimize(&discovery));
    if let Some(graph) = result.graph() {
        metrics.nodes_kept = graph.graph.node_count();
        metrics.edges_kept = graph.graph.edge_count();
    }
    metrics.record_duration(started.elapsed());

    info!(
        target_id = %discovery.target,
        retained = result.is_retained(),
        nodes_kept = metrics.nodes_kept,
        edges_kept = metrics.edges_kept,
        "analysis complete"
    );

    Ok(Analysis { result, metrics })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
