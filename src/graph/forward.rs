//! Forward (top-down) search.
//!
//! Breadth-first walk of the heap from the held values, recording every
//! node and edge it touches. Discovery does not stop when the target is
//! found: every path into the target matters to minimization, so the walk
//! runs until the frontier is empty.
//!
//! With `strong_references_only`, weak edges are still recorded but their
//! children are not scheduled through them.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, trace, warn};

use crate::error::{Result, RetentionError};
use crate::graph::model::HeapGraph;
use crate::graph::taxonomy::rule_for;
use crate::source::{HeapEdgeSource, ReportedEdge};
use crate::types::{BuiltinKind, EdgeId, EdgeKind, NodeId};

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// Everything the forward search learned about the heap.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// The target was reached through a traversable edge (or is held).
    pub found_target: bool,
    pub target: NodeId,
    /// Distinct held-value identities, in caller order.
    pub held: Vec<NodeId>,
    pub strong_references_only: bool,
    /// Discovered graph, including sentinel marker edges.
    pub graph: HeapGraph,
}

impl Discovery {
    /// Whether `edge` may carry retention under this search's settings.
    pub fn is_traversable(&self, is_strong: bool) -> bool {
        is_strong || !self.strong_references_only
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Walk `source` from `held`, looking for `target`.
///
/// Fails before any traversal if a held value or the target is not a heap
/// reference, and aborts the whole search if the source fails mid-walk.
pub fn search<S: HeapEdgeSource>(
    source: &mut S,
    held: &[S::Value],
    target: &S::Value,
    strong_references_only: bool,
) -> Result<Discovery> {
    let target_id = source.identity_of(target).ok_or_else(|| {
        RetentionError::InvalidInput("target is not a heap reference".into())
    })?;
    if target_id.is_sentinel() {
        return Err(RetentionError::InvalidInput(format!(
            "target identity {} is reserved",
            target_id.0
        )));
    }
    let mut roots: Vec<(NodeId, S::Value)> = Vec::with_capacity(held.len());
    for (position, value) in held.iter().enumerate() {
        let id = source.identity_of(value).ok_or_else(|| {
            RetentionError::InvalidInput(format!(
                "held value at position {position} is not a heap reference"
            ))
        })?;
        if !roots.iter().any(|(seen, _)| *seen == id) {
            roots.push((id, value.clone()));
        }
    }

    debug!(
        target_id = %target_id,
        held = roots.len(),
        strong_references_only,
        "starting forward search"
    );

    let mut walker = Walker::new(source, target_id, strong_references_only);
    let held_ids = walker.run(roots, target)?;

    let Walker {
        graph, found_target, ..
    } = walker;
    graph.validate()?;

    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        found_target,
        "forward search finished"
    );

    Ok(Discovery {
        found_target,
        target: target_id,
        held: held_ids,
        strong_references_only,
        graph,
    })
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Structural identity of an edge, used to hand out stable edge ids.
type EdgeKey = (NodeId, NodeId, EdgeKind, Vec<NodeId>);

struct Walker<'s, S: HeapEdgeSource> {
    source: &'s mut S,
    target: NodeId,
    strong_references_only: bool,
    graph: HeapGraph,
    edge_ids: HashMap<EdgeKey, EdgeId>,
    next_edge_id: u64,
    found_target: bool,
}

impl<'s, S: HeapEdgeSource> Walker<'s, S> {
    fn new(source: &'s mut S, target: NodeId, strong_references_only: bool) -> Self {
        Self {
            source,
            target,
            strong_references_only,
            graph: HeapGraph::new(),
            edge_ids: HashMap::new(),
            next_edge_id: 0,
            found_target: false,
        }
    }

    fn run(&mut self, roots: Vec<(NodeId, S::Value)>, target: &S::Value) -> Result<Vec<NodeId>> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<(NodeId, S::Value)> = VecDeque::new();
        let mut held_ids = Vec::with_capacity(roots.len());

        for (id, value) in roots {
            self.record_node(id, &value)?;
            self.link(
                NodeId::PRESUMED_HELD,
                id,
                EdgeKind::Marker,
                true,
                vec![NodeId::PRESUMED_HELD],
            );
            if id == self.target {
                self.found_target = true;
            }
            visited.insert(id);
            held_ids.push(id);
            queue.push_back((id, value));
        }

        while let Some((id, value)) = queue.pop_front() {
            let reported = self.source.outgoing_edges(&value).map_err(|e| {
                warn!(node = %id, error = %e, "heap edge source failed");
                e
            })?;
            trace!(node = %id, edges = reported.len(), "visiting");

            for edge in reported {
                if let Some((child_id, child)) = self.record_edge(id, edge)? {
                    if child_id == self.target {
                        self.found_target = true;
                    }
                    if visited.insert(child_id) {
                        queue.push_back((child_id, child));
                    }
                }
            }
        }

        if self.found_target {
            self.record_node(self.target, target)?;
            self.link(
                self.target,
                NodeId::TARGET,
                EdgeKind::Marker,
                true,
                vec![self.target],
            );
        }

        Ok(held_ids)
    }

    /// Record one reported edge out of `parent`. Returns the child when the
    /// edge may extend the frontier.
    fn record_edge(
        &mut self,
        parent: NodeId,
        edge: ReportedEdge<S::Value>,
    ) -> Result<Option<(NodeId, S::Value)>> {
        let ReportedEdge {
            child,
            kind,
            is_strong,
            co_owners: reported_owners,
        } = edge;

        if kind == EdgeKind::Marker {
            return Err(RetentionError::Invariant(format!(
                "node {parent} reported a reserved marker edge"
            )));
        }

        let Some(child_id) = self.source.identity_of(&child) else {
            trace!(node = %parent, edge = %kind, "skipping primitive");
            return Ok(None);
        };

        let container = self.kind_of(parent)?;
        let rule = rule_for(container, &kind);
        let is_strong = rule.is_strong(is_strong);

        let mut co_owners = vec![parent];
        if rule.is_ephemeron() {
            if reported_owners.is_empty() {
                return Err(RetentionError::Invariant(format!(
                    "{container} {parent} reported {kind} without its entry key"
                )));
            }
            for owner in &reported_owners {
                let owner_id = self.source.identity_of(owner).ok_or_else(|| {
                    RetentionError::Invariant(format!(
                        "{container} {parent} reported a primitive co-owner for {kind}"
                    ))
                })?;
                self.record_node(owner_id, owner)?;
                if !co_owners.contains(&owner_id) {
                    co_owners.push(owner_id);
                }
            }
        }

        self.record_node(child_id, &child)?;
        self.link(parent, child_id, kind, is_strong, co_owners);

        if is_strong || !self.strong_references_only {
            Ok(Some((child_id, child)))
        } else {
            Ok(None)
        }
    }

    /// Add a node record the first time an identity is seen. Later sightings
    /// must classify the same way, or two entities share one identity.
    fn record_node(&mut self, id: NodeId, value: &S::Value) -> Result<()> {
        if id.is_sentinel() {
            return Err(RetentionError::Invariant(format!(
                "heap edge source produced reserved identity {}",
                id.0
            )));
        }
        let (kind, derived) = self.source.classify(value)?;
        match self.graph.node(id) {
            None => self.graph.new_node(id, kind, derived),
            Some(node) if node.kind == kind && node.derived_kind == derived => {}
            Some(node) => {
                return Err(RetentionError::Invariant(format!(
                    "identity {id} names both a {} ({}) and a {kind} ({derived})",
                    node.kind, node.derived_kind
                )));
            }
        }
        Ok(())
    }

    fn kind_of(&self, id: NodeId) -> Result<BuiltinKind> {
        self.graph
            .node(id)
            .map(|n| n.kind)
            .ok_or_else(|| RetentionError::Invariant(format!("visited node {id} was never recorded")))
    }

    /// Add an edge, reusing the id of a structurally identical edge.
    fn link(
        &mut self,
        parent: NodeId,
        child: NodeId,
        kind: EdgeKind,
        is_strong: bool,
        co_owners: Vec<NodeId>,
    ) {
        let key: EdgeKey = (parent, child, kind.clone(), co_owners.clone());
        let next = &mut self.next_edge_id;
        let edge_id = *self.edge_ids.entry(key).or_insert_with(|| {
            let id = EdgeId(*next);
            *next += 1;
            id
        });
        self.graph
            .add_edge(parent, child, kind, is_strong, co_owners, edge_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{HeapSnapshot, SnapshotValue};
    use pretty_assertions::assert_eq;

    fn v(id: NodeId) -> SnapshotValue {
        SnapshotValue::Ref(id)
    }

    #[test]
    fn records_every_edge_and_flags_target() {
        let mut b = HeapSnapshot::builder();
        let arr = b.object(BuiltinKind::Array);
        let a = b.object(BuiltinKind::Object);
        let t = b.object(BuiltinKind::Object);
        let c = b.object(BuiltinKind::Object);
        b.index(arr, 0, a).index(arr, 1, t).index(arr, 2, c);
        let mut snap = b.build().unwrap();

        let d = search(&mut snap, &[v(arr)], &v(t), true).unwrap();
        assert!(d.found_target);
        assert_eq!(d.held, vec![arr]);
        assert_eq!(d.graph.node_count(), 4);
        // root marker + three indices + target marker
        assert_eq!(d.graph.edge_count(), 5);
        let into_marker: Vec<_> = d.graph.edges_into(NodeId::TARGET).map(|e| e.parent).collect();
        assert_eq!(into_marker, vec![t]);
    }

    #[test]
    fn keeps_going_after_target_is_found() {
        let mut b = HeapSnapshot::builder();
        let root = b.object(BuiltinKind::Object);
        let t = b.object(BuiltinKind::Object);
        let mid = b.object(BuiltinKind::Object);
        b.property(root, "direct", t)
            .property(root, "mid", mid)
            .property(mid, "again", t);
        let mut snap = b.build().unwrap();

        let d = search(&mut snap, &[v(root)], &v(t), true).unwrap();
        assert_eq!(d.graph.edges_into(t).count(), 2);
    }

    #[test]
    fn weak_edges_are_recorded_but_not_followed_when_strong_only() {
        let mut b = HeapSnapshot::builder();
        let wr = b.object(BuiltinKind::WeakRef);
        let t = b.object(BuiltinKind::Object);
        let beyond = b.object(BuiltinKind::Object);
        b.weak_ref(wr, t).property(t, "next", beyond);
        let mut snap = b.build().unwrap();

        let strong = search(&mut snap, &[v(wr)], &v(t), true).unwrap();
        assert!(!strong.found_target);
        assert!(strong.graph.contains_node(t));
        assert!(!strong.graph.contains_node(beyond));
        let weak_edge = strong.graph.edges_into(t).next().unwrap();
        assert!(!weak_edge.is_strong);

        let relaxed = search(&mut snap, &[v(wr)], &v(t), false).unwrap();
        assert!(relaxed.found_target);
        assert!(relaxed.graph.contains_node(beyond));
    }

    #[test]
    fn weak_map_values_become_ephemerons() {
        let mut b = HeapSnapshot::builder();
        let wm = b.object(BuiltinKind::WeakMap);
        let k = b.object(BuiltinKind::Object);
        let val = b.object(BuiltinKind::Object);
        b.map_entry(wm, k, val);
        let mut snap = b.build().unwrap();

        let d = search(&mut snap, &[v(wm)], &v(val), true).unwrap();
        let edge = d.graph.edges_into(val).next().unwrap();
        assert!(edge.is_ephemeron());
        assert_eq!(edge.co_owners, vec![wm, k]);
        let key_edge = d.graph.edges_into(k).next().unwrap();
        assert!(!key_edge.is_strong);
    }

    #[test]
    fn strong_map_values_ignore_reported_key() {
        let mut b = HeapSnapshot::builder();
        let m = b.object(BuiltinKind::Map);
        let k = b.object(BuiltinKind::Object);
        let val = b.object(BuiltinKind::Object);
        b.map_entry(m, k, val);
        let mut snap = b.build().unwrap();

        let d = search(&mut snap, &[v(m)], &v(val), true).unwrap();
        let edge = d.graph.edges_into(val).next().unwrap();
        assert_eq!(edge.co_owners, vec![m]);
        assert!(edge.is_strong);
    }

    #[test]
    fn primitives_are_skipped() {
        let mut b = HeapSnapshot::builder();
        let o = b.object(BuiltinKind::Object);
        b.primitive_property(o, "count", "3");
        let mut snap = b.build().unwrap();

        let d = search(&mut snap, &[v(o)], &v(o), true).unwrap();
        assert_eq!(d.graph.node_count(), 1);
        assert!(d.found_target);
    }

    #[test]
    fn duplicate_held_values_collapse() {
        let mut b = HeapSnapshot::builder();
        let o = b.object(BuiltinKind::Object);
        let t = b.object(BuiltinKind::Object);
        let mut snap = b.build().unwrap();

        let d = search(&mut snap, &[v(o), v(o)], &v(t), true).unwrap();
        assert_eq!(d.held, vec![o]);
        assert_eq!(d.graph.edges_from(NodeId::PRESUMED_HELD).count(), 1);
        assert!(!d.found_target);
    }

    #[test]
    fn primitive_target_is_rejected_before_traversal() {
        let mut snap = HeapSnapshot::builder().build().unwrap();
        let err = search(&mut snap, &[], &SnapshotValue::Primitive("1".into()), true).unwrap_err();
        assert!(matches!(err, RetentionError::InvalidInput(_)));
    }

    #[test]
    fn primitive_held_value_is_rejected() {
        let mut b = HeapSnapshot::builder();
        let t = b.object(BuiltinKind::Object);
        let mut snap = b.build().unwrap();
        let held = [v(t), SnapshotValue::Primitive("x".into())];
        let err = search(&mut snap, &held, &v(t), true).unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn ephemeron_without_key_is_an_invariant_violation() {
        let mut b = HeapSnapshot::builder();
        let wm = b.object(BuiltinKind::WeakMap);
        let val = b.object(BuiltinKind::Object);
        b.edge(wm, val, EdgeKind::MapValue);
        let mut snap = b.build().unwrap();

        let err = search(&mut snap, &[v(wm)], &v(val), true).unwrap_err();
        assert!(matches!(err, RetentionError::Invariant(_)));
    }

    /// Answers for values 1..=3 but reports 3 as the same identity as 1.
    struct AliasingSource;

    impl HeapEdgeSource for AliasingSource {
        type Value = u64;

        fn identity_of(&mut self, value: &u64) -> Option<NodeId> {
            match value {
                3 => Some(NodeId(1)),
                1 | 2 => Some(NodeId(*value)),
                _ => None,
            }
        }

        fn classify(&mut self, value: &u64) -> Result<(BuiltinKind, String)> {
            let kind = if *value == 3 { BuiltinKind::WeakMap } else { BuiltinKind::Object };
            Ok((kind, kind.as_str().to_string()))
        }

        fn outgoing_edges(&mut self, value: &u64) -> Result<Vec<ReportedEdge<u64>>> {
            let to = match value {
                1 => 2,
                2 => 3,
                _ => return Ok(Vec::new()),
            };
            Ok(vec![ReportedEdge {
                child: to,
                kind: EdgeKind::PropertyName("next".into()),
                is_strong: true,
                co_owners: Vec::new(),
            }])
        }
    }

    #[test]
    fn one_identity_for_two_entities_is_an_invariant_violation() {
        let err = search(&mut AliasingSource, &[1], &2, true).unwrap_err();
        assert!(matches!(err, RetentionError::Invariant(_)), "{err}");
        assert!(err.to_string().contains("identity #1"), "{err}");
    }

    /// Maps value 0 to the target sentinel.
    struct SentinelSource;

    impl HeapEdgeSource for SentinelSource {
        type Value = u64;

        fn identity_of(&mut self, value: &u64) -> Option<NodeId> {
            Some(if *value == 0 { NodeId::TARGET } else { NodeId(*value) })
        }

        fn classify(&mut self, _: &u64) -> Result<(BuiltinKind, String)> {
            Ok((BuiltinKind::Object, "object".into()))
        }

        fn outgoing_edges(&mut self, _: &u64) -> Result<Vec<ReportedEdge<u64>>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn reserved_target_identity_is_rejected_before_traversal() {
        let err = search(&mut SentinelSource, &[1], &0, true).unwrap_err();
        assert!(matches!(err, RetentionError::InvalidInput(_)), "{err}");

        let err = search(&mut SentinelSource, &[0], &1, true).unwrap_err();
        assert!(matches!(err, RetentionError::Invariant(_)), "{err}");
    }

    #[test]
    fn edge_ids_are_deterministic() {
        let mut b = HeapSnapshot::builder();
        let root = b.object(BuiltinKind::Object);
        let x = b.object(BuiltinKind::Object);
        let y = b.object(BuiltinKind::Object);
        b.property(root, "x", x).property(root, "y", y).property(x, "y", y);
        let snap = b.build().unwrap();

        let first = search(&mut snap.clone(), &[v(root)], &v(y), true).unwrap();
        let second = search(&mut snap.clone(), &[v(root)], &v(y), true).unwrap();
        assert_eq!(first.graph, second.graph);
    }
}
