//! Identity-keyed heap graph.
//!
//! Nodes and edges live in arenas (`Vec`) indexed by [`NodeId`] and
//! [`EdgeId`]; adjacency is kept in both directions so callers can look an
//! edge up from its parent or from its child. The serialized form
//! ([`SerializedGraph`]) duplicates the edge list in both orders for the
//! same reason.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetentionError};
use crate::types::{BuiltinKind, EdgeId, EdgeKind, NodeId};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One heap entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapNode {
    pub id: NodeId,
    pub kind: BuiltinKind,
    /// Runtime-specific subclass name. Diagnostics only.
    pub derived_kind: String,
}

/// One directed reference `parent -> child`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapEdge {
    pub edge_id: EdgeId,
    #[serde(rename = "parentObjectKey")]
    pub parent: NodeId,
    #[serde(rename = "childObjectKey")]
    pub child: NodeId,
    pub edge_kind: EdgeKind,
    pub is_strong: bool,
    /// Every node that must be retained for this edge to retain `child`.
    /// Always starts with `parent`.
    pub co_owners: Vec<NodeId>,
}

impl HeapEdge {
    /// More than one co-owner: the edge is an ephemeron.
    pub fn is_ephemeron(&self) -> bool {
        self.co_owners.len() > 1
    }

    /// Edges from or to a sentinel marker rather than a heap entity.
    pub fn is_marker(&self) -> bool {
        self.parent.is_sentinel() || self.child.is_sentinel()
    }
}

// ---------------------------------------------------------------------------
// HeapGraph
// ---------------------------------------------------------------------------

/// Arena-backed heap graph built by one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "SerializedGraph", try_from = "SerializedGraph")]
pub struct HeapGraph {
    nodes: Vec<HeapNode>,
    node_index: HashMap<NodeId, usize>,
    edges: Vec<HeapEdge>,
    edge_index: HashMap<EdgeId, usize>,
    by_parent: HashMap<NodeId, Vec<EdgeId>>,
    by_child: HashMap<NodeId, Vec<EdgeId>>,
}

impl HeapGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------

    /// Insert a node record. A second call for the same id replaces it.
    pub fn new_node(&mut self, id: NodeId, kind: BuiltinKind, derived_kind: impl Into<String>) {
        let node = HeapNode {
            id,
            kind,
            derived_kind: derived_kind.into(),
        };
        match self.node_index.get(&id) {
            Some(&idx) => self.nodes[idx] = node,
            None => {
                self.node_index.insert(id, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Insert an edge. Re-adding an existing `edge_id` overwrites the
    /// earlier record; the last write wins.
    ///
    /// No referential checks happen here; see [`HeapGraph::validate`].
    pub fn add_edge(
        &mut self,
        parent: NodeId,
        child: NodeId,
        edge_kind: EdgeKind,
        is_strong: bool,
        co_owners: Vec<NodeId>,
        edge_id: EdgeId,
    ) {
        let edge = HeapEdge {
            edge_id,
            parent,
            child,
            edge_kind,
            is_strong,
            co_owners,
        };
        self.insert_edge(edge);
    }

    /// Record-level variant of [`HeapGraph::add_edge`].
    pub fn insert_edge(&mut self, edge: HeapEdge) {
        let edge_id = edge.edge_id;
        if let Some(&idx) = self.edge_index.get(&edge_id) {
            let old = std::mem::replace(&mut self.edges[idx], edge);
            let new = &self.edges[idx];
            if old.parent != new.parent {
                detach(&mut self.by_parent, old.parent, edge_id);
                self.by_parent.entry(new.parent).or_default().push(edge_id);
            }
            if old.child != new.child {
                detach(&mut self.by_child, old.child, edge_id);
                self.by_child.entry(new.child).or_default().push(edge_id);
            }
            return;
        }

        self.by_parent.entry(edge.parent).or_default().push(edge_id);
        self.by_child.entry(edge.child).or_default().push(edge_id);
        self.edge_index.insert(edge_id, self.edges.len());
        self.edges.push(edge);
    }

    /// Put nodes and both adjacency views into deterministic order: nodes by
    /// id, parent-edges by (parent, edge id), child-edges by (child, edge id).
    pub fn sort(&mut self) {
        self.nodes.sort_by_key(|n| n.id);
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| (n.id, idx))
            .collect();

        self.edges.sort_by_key(|e| (e.parent, e.edge_id));
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.edge_id, idx))
            .collect();

        for ids in self.by_parent.values_mut() {
            ids.sort();
        }
        for ids in self.by_child.values_mut() {
            ids.sort();
        }
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&HeapNode> {
        self.node_index.get(&id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&HeapEdge> {
        self.edge_index.get(&id).map(|&idx| &self.edges[idx])
    }

    /// Edges whose parent is `id`.
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &HeapEdge> + '_ {
        self.by_parent
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edge(*eid))
    }

    /// Edges whose child is `id`.
    pub fn edges_into(&self, id: NodeId) -> impl Iterator<Item = &HeapEdge> + '_ {
        self.by_child
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edge(*eid))
    }

    pub fn nodes(&self) -> &[HeapNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[HeapEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Check that every edge endpoint and co-owner is either a recorded node
    /// or a sentinel marker, and that no edge points at the held marker or
    /// out of the target marker.
    pub fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            if edge.child == NodeId::PRESUMED_HELD {
                return Err(RetentionError::Invariant(format!(
                    "edge {} points at the held marker",
                    edge.edge_id
                )));
            }
            if edge.parent == NodeId::TARGET {
                return Err(RetentionError::Invariant(format!(
                    "edge {} leaves the target marker",
                    edge.edge_id
                )));
            }
            if edge.co_owners.first() != Some(&edge.parent) {
                return Err(RetentionError::Invariant(format!(
                    "edge {} does not list its parent {} as first co-owner",
                    edge.edge_id, edge.parent
                )));
            }
            let referenced = std::iter::once(&edge.child).chain(edge.co_owners.iter());
            for id in referenced {
                if !id.is_sentinel() && !self.contains_node(*id) {
                    return Err(RetentionError::Invariant(format!(
                        "edge {} references unknown node {}",
                        edge.edge_id, id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Deterministically ordered plain-record form.
    pub fn to_serialized(&self) -> SerializedGraph {
        let mut nodes = self.nodes.clone();
        nodes.sort_by_key(|n| n.id);

        let mut parent_to_child_edges = self.edges.clone();
        parent_to_child_edges.sort_by_key(|e| (e.parent, e.edge_id));

        let mut child_to_parent_edges = self.edges.clone();
        child_to_parent_edges.sort_by_key(|e| (e.child, e.edge_id));

        SerializedGraph {
            nodes,
            parent_to_child_edges,
            child_to_parent_edges,
        }
    }
}

impl PartialEq for HeapGraph {
    fn eq(&self, other: &Self) -> bool {
        self.to_serialized() == other.to_serialized()
    }
}

impl Eq for HeapGraph {}

fn detach(index: &mut HashMap<NodeId, Vec<EdgeId>>, key: NodeId, edge_id: EdgeId) {
    if let Some(ids) = index.get_mut(&key) {
        ids.retain(|id| *id != edge_id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}

// ---------------------------------------------------------------------------
// SerializedGraph
// ---------------------------------------------------------------------------

/// Snapshot/transport shape of a [`HeapGraph`]. Both edge lists describe the
/// same edges, ordered from the parent side and from the child side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGraph {
    pub nodes: Vec<HeapNode>,
    pub parent_to_child_edges: Vec<HeapEdge>,
    pub child_to_parent_edges: Vec<HeapEdge>,
}

impl From<HeapGraph> for SerializedGraph {
    fn from(graph: HeapGraph) -> Self {
        graph.to_serialized()
    }
}

impl TryFrom<SerializedGraph> for HeapGraph {
    type Error = RetentionError;

    fn try_from(serialized: SerializedGraph) -> Result<Self> {
        let mut by_parent: Vec<&HeapEdge> = serialized.parent_to_child_edges.iter().collect();
        let mut by_child: Vec<&HeapEdge> = serialized.child_to_parent_edges.iter().collect();
        by_parent.sort_by_key(|e| e.edge_id);
        by_child.sort_by_key(|e| e.edge_id);
        if by_parent != by_child {
            return Err(RetentionError::Invariant(
                "parent-to-child and child-to-parent edge lists disagree".into(),
            ));
        }

        let mut graph = HeapGraph::new();
        for node in serialized.nodes {
            graph.new_node(node.id, node.kind, node.derived_kind);
        }
        for edge in serialized.parent_to_child_edges {
            graph.insert_edge(edge);
        }
        graph.validate()?;
        graph.sort();
        Ok(graph)
    }
}

// ---------------------------------------------------------------------------
// RetentionGraph
// ---------------------------------------------------------------------------

/// Minimized explanation of why `target` is retained.
///
/// Sentinel marker edges are not part of `graph`; the held values the
/// explanation bottoms out at are listed in `held` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionGraph {
    pub target: NodeId,
    pub held: Vec<NodeId>,
    pub graph: HeapGraph,
}

impl RetentionGraph {
    pub fn to_serialized(&self) -> SerializedGraph {
        self.graph.to_serialized()
    }

    /// Nodes other than the target and held values that have no incoming
    /// edge. Always empty for a graph produced by minimization.
    pub fn unexplained_nodes(&self) -> Vec<NodeId> {
        self.graph
            .nodes()
            .iter()
            .map(|n| n.id)
            .filter(|id| *id != self.target && !self.held.contains(id))
            .filter(|id| self.graph.edges_into(*id).next().is_none())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
