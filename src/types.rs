//! Core domain types: heap identities, built-in kinds, and edge kinds.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeId / EdgeId
// ---------------------------------------------------------------------------

/// Run-scoped identity of one heap entity (object or symbol).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Sentinel for the object whose retention is being tested.
    pub const TARGET: NodeId = NodeId(u64::MAX);

    /// Sentinel root standing for "one of the caller-supplied held values".
    pub const PRESUMED_HELD: NodeId = NodeId(u64::MAX - 1);

    /// Whether this id is one of the two sentinel markers.
    pub fn is_sentinel(self) -> bool {
        self == Self::TARGET || self == Self::PRESUMED_HELD
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::TARGET => f.write_str("<target>"),
            Self::PRESUMED_HELD => f.write_str("<held>"),
            NodeId(raw) => write!(f, "#{raw}"),
        }
    }
}

/// Identity of one logical reference, shared by its parent- and
/// child-indexed views.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BuiltinKind
// ---------------------------------------------------------------------------

/// Closed classification of heap entities. Decides which strength rule
/// applies to the edges a container emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinKind {
    Object,
    Array,
    Function,
    Map,
    Set,
    WeakMap,
    WeakSet,
    WeakRef,
    FinalizationRegistry,
    Proxy,
    Promise,
    IteratorHelper,
    Symbol,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 13] = [
        Self::Object,
        Self::Array,
        Self::Function,
        Self::Map,
        Self::Set,
        Self::WeakMap,
        Self::WeakSet,
        Self::WeakRef,
        Self::FinalizationRegistry,
        Self::Proxy,
        Self::Promise,
        Self::IteratorHelper,
        Self::Symbol,
    ];

    /// Canonical string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Function => "function",
            Self::Map => "map",
            Self::Set => "set",
            Self::WeakMap => "weak_map",
            Self::WeakSet => "weak_set",
            Self::WeakRef => "weak_ref",
            Self::FinalizationRegistry => "finalization_registry",
            Self::Proxy => "proxy",
            Self::Promise => "promise",
            Self::IteratorHelper => "iterator_helper",
            Self::Symbol => "symbol",
        }
    }

    /// Parse from a loose string (case-insensitive, `-`/`_` optional).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "function" => Some(Self::Function),
            "map" => Some(Self::Map),
            "set" => Some(Self::Set),
            "weakmap" => Some(Self::WeakMap),
            "weakset" => Some(Self::WeakSet),
            "weakref" => Some(Self::WeakRef),
            "finalizationregistry" => Some(Self::FinalizationRegistry),
            "proxy" => Some(Self::Proxy),
            "promise" => Some(Self::Promise),
            "iteratorhelper" => Some(Self::IteratorHelper),
            "symbol" => Some(Self::Symbol),
            _ => None,
        }
    }

    /// Collections whose entries do not keep their keys alive.
    pub fn is_weak_collection(&self) -> bool {
        matches!(self, Self::WeakMap | Self::WeakSet)
    }
}

impl std::fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EdgeKind
// ---------------------------------------------------------------------------

/// What kind of reference an edge is, with the key it was found under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    PropertyName(String),
    /// Property keyed by a symbol; payload is the symbol's description.
    PropertySymbol(String),
    ArrayIndex(u32),
    /// Engine-internal slot such as `ProxyTarget` or `BoundTargetFunction`.
    InternalSlot(String),
    PrivateField(String),
    MapKey,
    MapValue,
    SetElement,
    WeakRefTarget,
    FinalizerTarget,
    FinalizerHeldValue,
    FinalizerUnregisterToken,
    /// Synthetic edge from the held marker or into the target marker.
    Marker,
}

impl EdgeKind {
    /// Short tag without payload, for logs and metrics.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PropertyName(_) => "property_name",
            Self::PropertySymbol(_) => "property_symbol",
            Self::ArrayIndex(_) => "array_index",
            Self::InternalSlot(_) => "internal_slot",
            Self::PrivateField(_) => "private_field",
            Self::MapKey => "map_key",
            Self::MapValue => "map_value",
            Self::SetElement => "set_element",
            Self::WeakRefTarget => "weak_ref_target",
            Self::FinalizerTarget => "finalizer_target",
            Self::FinalizerHeldValue => "finalizer_held_value",
            Self::FinalizerUnregisterToken => "finalizer_unregister_token",
            Self::Marker => "marker",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PropertyName(name) => write!(f, ".{name}"),
            Self::PropertySymbol(desc) => write!(f, "[Symbol({desc})]"),
            Self::ArrayIndex(i) => write!(f, "[{i}]"),
            Self::InternalSlot(slot) => write!(f, "[[{slot}]]"),
            Self::PrivateField(name) => write!(f, "#{name}"),
            Self::MapKey => f.write_str("<map key>"),
            Self::MapValue => f.write_str("<map value>"),
            Self::SetElement => f.write_str("<set element>"),
            Self::WeakRefTarget => f.write_str("<weakref target>"),
            Self::FinalizerTarget => f.write_str("<registered target>"),
            Self::FinalizerHeldValue => f.write_str("<held value>"),
            Self::FinalizerUnregisterToken => f.write_str("<unregister token>"),
            Self::Marker => f.write_str("<marker>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
