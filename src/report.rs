//! Human- and machine-readable rendering of analysis results.

use std::fmt::Write as _;

use serde_json::json;

use crate::analysis::RetentionResult;
use crate::config::OutputFormat;
use crate::error::Result;
use crate::graph::model::{HeapEdge, RetentionGraph};
use crate::observability::AnalysisMetrics;
use crate::types::NodeId;

/// Render `result` in `format`, optionally followed by `metrics`.
pub fn render(
    result: &RetentionResult,
    format: OutputFormat,
    metrics: Option<&AnalysisMetrics>,
) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = render_text(result);
            if let Some(m) = metrics {
                out.push_str(&render_metrics_text(m));
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let mut value = json_value(result);
            if let Some(m) = metrics {
                value["metrics"] = m.to_json();
            }
            let mut out = serde_json::to_string_pretty(&value)?;
            out.push('\n');
            Ok(out)
        }
    }
}

/// One line per retaining edge, held roots first.
///
/// ```text
/// retained: #3 (Object)
/// held: #1 (Array)
/// #1 --[[1]]--> #3
/// ```
pub fn render_text(result: &RetentionResult) -> String {
    let Some(rg) = result.graph() else {
        return "not retained\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "retained: {}", describe(rg, rg.target));
    let held: Vec<String> = rg.held.iter().map(|id| describe(rg, *id)).collect();
    let _ = writeln!(out, "held: {}", held.join(", "));
    for edge in rg.graph.edges() {
        let _ = writeln!(out, "{}", edge_line(edge));
    }
    out
}

/// `{ "retained": bool, "target", "held", "graph": SerializedGraph | null }`.
pub fn render_json(result: &RetentionResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&json_value(result))?)
}

fn json_value(result: &RetentionResult) -> serde_json::Value {
    match result.graph() {
        Some(rg) => json!({
            "retained": true,
            "target": rg.target,
            "held": rg.held,
            "graph": rg.to_serialized(),
        }),
        None => json!({ "retained": false, "graph": null }),
    }
}

fn render_metrics_text(m: &AnalysisMetrics) -> String {
    let duration = m
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "metrics: discovered {} nodes / {} edges, kept {} nodes / {} edges ({:.0}%), {}\n",
        m.nodes_discovered,
        m.edges_discovered,
        m.nodes_kept,
        m.edges_kept,
        m.retention_ratio() * 100.0,
        duration
    )
}

fn describe(rg: &RetentionGraph, id: NodeId) -> String {
    match rg.graph.node(id) {
        Some(node) => format!("{id} ({})", node.derived_kind),
        None => id.to_string(),
    }
}

fn edge_line(edge: &HeapEdge) -> String {
    let mut line = format!("{} --[{}]--> {}", edge.parent, edge.edge_kind, edge.child);
    if edge.is_ephemeron() {
        let owners: Vec<String> = edge.co_owners[1..].iter().map(|id| id.to_string()).collect();
        let _ = write!(line, " (with {})", owners.join(", "));
    }
    if !edge.is_strong {
        line.push_str(" (weak)");
    }
    line
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
