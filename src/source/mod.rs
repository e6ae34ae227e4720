//! The boundary between the engine and a live heap.
//!
//! A [`HeapEdgeSource`] answers three questions about heap values: who they
//! are, what they are, and what they point at. Everything the engine knows
//! about the heap comes through this trait. Methods take `&mut self` so an
//! implementation may step an interpreter to produce its answers; each call
//! is still a single blocking request from the engine's point of view.

pub mod snapshot;

use crate::error::Result;
use crate::types::{BuiltinKind, EdgeKind, NodeId};

pub use snapshot::{HeapSnapshot, SnapshotBuilder, SnapshotValue};

/// One outgoing reference as reported by the source, before strength rules
/// are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedEdge<V> {
    pub child: V,
    pub kind: EdgeKind,
    /// Consulted only where the strength table defers to the source.
    pub is_strong: bool,
    /// Owners beyond the emitting container, e.g. the key of a weak
    /// collection entry.
    pub co_owners: Vec<V>,
}

impl<V> ReportedEdge<V> {
    /// A plain strong reference with no extra owners.
    pub fn strong(child: V, kind: EdgeKind) -> Self {
        Self {
            child,
            kind,
            is_strong: true,
            co_owners: Vec::new(),
        }
    }
}

/// Read-only view of a heap for one analysis run.
///
/// Identities must be stable and collision-free within a run. Edge order is
/// not meaningful but must be deterministic for reproducible output.
pub trait HeapEdgeSource {
    type Value: Clone;

    /// Identity of a heap value, or `None` when the value is not a heap
    /// reference (a primitive).
    fn identity_of(&mut self, value: &Self::Value) -> Option<NodeId>;

    /// Built-in kind and runtime-specific derived kind label.
    fn classify(&mut self, value: &Self::Value) -> Result<(BuiltinKind, String)>;

    /// Every outgoing reference of `value`.
    fn outgoing_edges(&mut self, value: &Self::Value) -> Result<Vec<ReportedEdge<Self::Value>>>;
}

impl<S: HeapEdgeSource + ?Sized> HeapEdgeSource for &mut S {
    type Value = S::Value;

    fn identity_of(&mut self, value: &Self::Value) -> Option<NodeId> {
        (**self).identity_of(value)
    }

    fn classify(&mut self, value: &Self::Value) -> Result<(BuiltinKind, String)> {
        (**self).classify(value)
    }

    fn outgoing_edges(&mut self, value: &Self::Value) -> Result<Vec<ReportedEdge<Self::Value>>> {
        (**self).outgoing_edges(value)
    }
}
