//! Edge strength and co-ownership rules.
//!
//! Strength is a property of the (container kind, edge kind) pair, not of
//! the edge alone: a `MapValue` edge out of a `Map` is an ordinary strong
//! reference, while the same edge out of a `WeakMap` is an ephemeron owned
//! jointly by the collection and the entry's key. This table is the only
//! place those runtime semantics live.

use crate::types::{BuiltinKind, EdgeKind};

// ---------------------------------------------------------------------------
// Rule types
// ---------------------------------------------------------------------------

/// Whether an edge retains its child on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Strong,
    Weak,
    /// Defer to the `is_strong` flag reported by the heap edge source.
    AsReported,
}

/// Which nodes must all be retained for the edge to retain its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The emitting container alone.
    Parent,
    /// The container plus the co-owners reported with the edge (the entry
    /// key of a weak collection).
    ParentAndReported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRule {
    pub strength: Strength,
    pub ownership: Ownership,
}

impl EdgeRule {
    const STRONG: EdgeRule = EdgeRule {
        strength: Strength::Strong,
        ownership: Ownership::Parent,
    };
    const WEAK: EdgeRule = EdgeRule {
        strength: Strength::Weak,
        ownership: Ownership::Parent,
    };
    const EPHEMERON: EdgeRule = EdgeRule {
        strength: Strength::Strong,
        ownership: Ownership::ParentAndReported,
    };
    const REPORTED: EdgeRule = EdgeRule {
        strength: Strength::AsReported,
        ownership: Ownership::Parent,
    };

    /// Resolve the final strength given what the source reported.
    pub fn is_strong(&self, reported: bool) -> bool {
        match self.strength {
            Strength::Strong => true,
            Strength::Weak => false,
            Strength::AsReported => reported,
        }
    }

    pub fn is_ephemeron(&self) -> bool {
        self.ownership == Ownership::ParentAndReported
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Look up the rule for an edge of `kind` emitted by a `container`.
pub fn rule_for(container: BuiltinKind, kind: &EdgeKind) -> EdgeRule {
    use BuiltinKind as B;
    use EdgeKind as E;

    match (container, kind) {
        // Ordinary named/indexed references are owned by the property owner.
        (_, E::PropertyName(_) | E::PropertySymbol(_) | E::ArrayIndex(_) | E::PrivateField(_)) => {
            EdgeRule::STRONG
        }

        (_, E::Marker) => EdgeRule::STRONG,

        (B::Proxy, E::InternalSlot(_)) => EdgeRule::STRONG,
        (_, E::InternalSlot(_)) => EdgeRule::REPORTED,

        (B::Map, E::MapKey | E::MapValue) => EdgeRule::STRONG,
        (B::Set, E::SetElement) => EdgeRule::STRONG,
        (B::WeakMap, E::MapKey) => EdgeRule::WEAK,
        (B::WeakMap, E::MapValue) => EdgeRule::EPHEMERON,
        (B::WeakSet, E::SetElement) => EdgeRule::WEAK,

        (B::WeakRef, E::WeakRefTarget) => EdgeRule::WEAK,

        (B::FinalizationRegistry, E::FinalizerTarget) => EdgeRule::WEAK,
        (B::FinalizationRegistry, E::FinalizerUnregisterToken) => EdgeRule::WEAK,
        (B::FinalizationRegistry, E::FinalizerHeldValue) => EdgeRule::STRONG,

        // Collection-shaped edges from containers that do not own such
        // entries (subclass shims, engine-specific wrappers).
        (
            _,
            E::MapKey
            | E::MapValue
            | E::SetElement
            | E::WeakRefTarget
            | E::FinalizerTarget
            | E::FinalizerHeldValue
            | E::FinalizerUnregisterToken,
        ) => EdgeRule::REPORTED,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
