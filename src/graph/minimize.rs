//! Backward (bottom-up) minimization.
//!
//! Two worklist passes over the discovered graph:
//!
//! 1. **Retained set.** Starting from the held marker, mark every node that
//!    some traversable edge retains, where an edge only retains its child
//!    once every co-owner is already retained. This is what makes weak
//!    collection entries correct: a `WeakMap` value whose key is never
//!    retained never becomes retained itself.
//! 2. **Backward walk.** Starting from the target marker, accept every
//!    satisfied edge into each accepted node and accept all of that edge's
//!    co-owners. Held values end the walk.
//!
//! The result is the subgraph that explains retention, or `None` when the
//! walk never bottoms out at a held value.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::graph::forward::Discovery;
use crate::graph::model::{HeapEdge, HeapGraph, RetentionGraph};
use crate::types::NodeId;

/// Reduce a forward-search result to the edges and nodes that explain why
/// the target is retained.
pub fn minimize(discovery: &Discovery) -> Option<RetentionGraph> {
    if !discovery.found_target {
        debug!(target_id = %discovery.target, "target not discovered; nothing to minimize");
        return None;
    }

    let retained = retained_set(discovery);
    if !retained.contains(&NodeId::TARGET) {
        debug!(target_id = %discovery.target, "target marker not retained");
        return None;
    }

    let graph = &discovery.graph;
    let held: HashSet<NodeId> = discovery.held.iter().copied().collect();
    let satisfied = |e: &HeapEdge| {
        discovery.is_traversable(e.is_strong) && e.co_owners.iter().all(|o| retained.contains(o))
    };

    let mut accepted: HashSet<NodeId> = HashSet::from([NodeId::TARGET]);
    let mut queue: VecDeque<NodeId> = VecDeque::from([NodeId::TARGET]);
    let mut kept_edges: Vec<&HeapEdge> = Vec::new();
    let mut held_reached: Vec<NodeId> = Vec::new();

    while let Some(node) = queue.pop_front() {
        if node == NodeId::PRESUMED_HELD {
            continue;
        }
        if held.contains(&node) {
            held_reached.push(node);
            accepted.insert(NodeId::PRESUMED_HELD);
            continue;
        }
        for edge in graph.edges_into(node).filter(|e| satisfied(*e)) {
            kept_edges.push(edge);
            for owner in &edge.co_owners {
                if accepted.insert(*owner) {
                    queue.push_back(*owner);
                }
            }
        }
    }

    if !accepted.contains(&NodeId::PRESUMED_HELD) {
        debug!(target_id = %discovery.target, "backward walk never reached a held value");
        return None;
    }

    let mut out = HeapGraph::new();
    for id in accepted.iter().filter(|id| !id.is_sentinel()) {
        if let Some(node) = graph.node(*id) {
            out.new_node(node.id, node.kind, node.derived_kind.clone());
        }
    }
    for edge in kept_edges.into_iter().filter(|e| !e.is_marker()) {
        out.insert_edge(edge.clone());
    }
    out.sort();
    held_reached.sort();

    debug!(
        target_id = %discovery.target,
        nodes = out.node_count(),
        edges = out.edge_count(),
        held = held_reached.len(),
        "minimized retention graph"
    );

    Some(RetentionGraph {
        target: discovery.target,
        held: held_reached,
        graph: out,
    })
}

/// Every node the held values keep alive through traversable, satisfied
/// edges. Includes both sentinels when the target is retained.
fn retained_set(discovery: &Discovery) -> HashSet<NodeId> {
    let graph = &discovery.graph;

    // Each edge is filed under every one of its co-owners; the parent is
    // always the first.
    let mut by_owner: HashMap<NodeId, Vec<&HeapEdge>> = HashMap::new();
    for edge in graph.edges() {
        if !discovery.is_traversable(edge.is_strong) {
            continue;
        }
        for owner in &edge.co_owners {
            by_owner.entry(*owner).or_default().push(edge);
        }
    }

    let mut retained: HashSet<NodeId> = HashSet::from([NodeId::PRESUMED_HELD]);
    let mut queue: VecDeque<NodeId> = VecDeque::from([NodeId::PRESUMED_HELD]);
    while let Some(node) = queue.pop_front() {
        let Some(edges) = by_owner.get(&node) else {
            continue;
        };
        for edge in edges {
            if retained.contains(&edge.child) {
                continue;
            }
            if edge.co_owners.iter().all(|o| retained.contains(o)) {
                retained.insert(edge.child);
                queue.push_back(edge.child);
            }
        }
    }
    retained
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
