//! In-memory heap snapshots.
//!
//! A [`HeapSnapshot`] is a serde-loadable description of a heap: a list of
//! objects, each with a kind, a diagnostic label, and its outgoing edges.
//! It implements [`HeapEdgeSource`] directly, which makes it the source used
//! by the CLI and by tests.
//!
//! ```json
//! { "objects": [
//!     { "id": 1, "kind": "array", "edges": [ { "to": 2, "kind": { "array_index": 0 } } ] },
//!     { "id": 2, "kind": "object" }
//! ] }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{HeapEdgeSource, ReportedEdge};
use crate::error::{Result, RetentionError};
use crate::types::{BuiltinKind, EdgeKind, NodeId};

// ---------------------------------------------------------------------------
// Snapshot records
// ---------------------------------------------------------------------------

/// A value stored in a snapshot slot: a heap reference or a primitive.
///
/// Untagged: numbers are object ids, strings are primitives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Ref(NodeId),
    Primitive(String),
}

impl SnapshotValue {
    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            Self::Ref(id) => Some(*id),
            Self::Primitive(_) => None,
        }
    }
}

impl From<NodeId> for SnapshotValue {
    fn from(id: NodeId) -> Self {
        Self::Ref(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub to: SnapshotValue,
    /// `{ variant: payload }` in both JSON and YAML.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub kind: EdgeKind,
    #[serde(default = "default_strong")]
    pub strong: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub co_owners: Vec<SnapshotValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub id: NodeId,
    pub kind: BuiltinKind,
    /// Derived kind label; defaults to the built-in kind name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub edges: Vec<SnapshotEdge>,
}

impl SnapshotObject {
    fn derived_kind(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.kind.as_str().to_string())
    }
}

fn default_strong() -> bool {
    true
}

/// On-disk shape; validated into a [`HeapSnapshot`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub objects: Vec<SnapshotObject>,
}

// ---------------------------------------------------------------------------
// HeapSnapshot
// ---------------------------------------------------------------------------

/// A validated, indexed heap snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "SnapshotFile", try_from = "SnapshotFile")]
pub struct HeapSnapshot {
    objects: Vec<SnapshotObject>,
    index: HashMap<NodeId, usize>,
}

impl HeapSnapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Validate and index a list of objects.
    ///
    /// Rejects duplicate ids, reserved sentinel ids, and references to ids
    /// that are not in the snapshot.
    pub fn from_objects(objects: Vec<SnapshotObject>) -> Result<Self> {
        let mut index = HashMap::with_capacity(objects.len());
        for (idx, obj) in objects.iter().enumerate() {
            if obj.id.is_sentinel() {
                return Err(RetentionError::Snapshot(format!(
                    "object id {} is reserved",
                    obj.id.0
                )));
            }
            if index.insert(obj.id, idx).is_some() {
                return Err(RetentionError::Snapshot(format!(
                    "duplicate object id {}",
                    obj.id.0
                )));
            }
        }

        for obj in &objects {
            for edge in &obj.edges {
                let refs = std::iter::once(&edge.to).chain(edge.co_owners.iter());
                for id in refs.filter_map(SnapshotValue::as_ref_id) {
                    if !index.contains_key(&id) {
                        return Err(RetentionError::Snapshot(format!(
                            "object {} references unknown object {}",
                            obj.id.0, id.0
                        )));
                    }
                }
            }
        }

        Ok(Self { objects, index })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: SnapshotFile = serde_json::from_str(text)?;
        Self::from_objects(file.objects)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: SnapshotFile = serde_yaml::from_str(text)?;
        Self::from_objects(file.objects)
    }

    /// Load from a `.json`, `.yaml`, or `.yml` file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            Some("json") => Self::from_json(&text),
            other => Err(RetentionError::Snapshot(format!(
                "unsupported snapshot file {}: expected .json, .yaml or .yml (got {:?})",
                path.display(),
                other
            ))),
        }
    }

    pub fn object(&self, id: NodeId) -> Option<&SnapshotObject> {
        self.index.get(&id).map(|&idx| &self.objects[idx])
    }

    pub fn objects(&self) -> &[SnapshotObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn lookup(&self, value: &SnapshotValue) -> Result<&SnapshotObject> {
        match value {
            SnapshotValue::Ref(id) => self.object(*id).ok_or_else(|| {
                RetentionError::Source(format!("no object {} in snapshot", id.0))
            }),
            SnapshotValue::Primitive(p) => Err(RetentionError::Source(format!(
                "primitive {p:?} has no heap record"
            ))),
        }
    }
}

impl From<HeapSnapshot> for SnapshotFile {
    fn from(snapshot: HeapSnapshot) -> Self {
        SnapshotFile {
            objects: snapshot.objects,
        }
    }
}

impl TryFrom<SnapshotFile> for HeapSnapshot {
    type Error = RetentionError;

    fn try_from(file: SnapshotFile) -> Result<Self> {
        Self::from_objects(file.objects)
    }
}

impl HeapEdgeSource for HeapSnapshot {
    type Value = SnapshotValue;

    fn identity_of(&mut self, value: &SnapshotValue) -> Option<NodeId> {
        value.as_ref_id().filter(|id| self.index.contains_key(id))
    }

    fn classify(&mut self, value: &SnapshotValue) -> Result<(BuiltinKind, String)> {
        let obj = self.lookup(value)?;
        Ok((obj.kind, obj.derived_kind()))
    }

    fn outgoing_edges(&mut self, value: &SnapshotValue) -> Result<Vec<ReportedEdge<SnapshotValue>>> {
        let obj = self.lookup(value)?;
        Ok(obj
            .edges
            .iter()
            .map(|edge| ReportedEdge {
                child: edge.to.clone(),
                kind: edge.kind.clone(),
                is_strong: edge.strong,
                co_owners: edge.co_owners.clone(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SnapshotBuilder
// ---------------------------------------------------------------------------

/// Incremental construction of a [`HeapSnapshot`]. Ids are handed out from 1
/// in allocation order.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    objects: Vec<SnapshotObject>,
    pending: Vec<(NodeId, SnapshotEdge)>,
}

impl SnapshotBuilder {
    /// Allocate an object of `kind` and return its id.
    pub fn object(&mut self, kind: BuiltinKind) -> NodeId {
        self.push(kind, None)
    }

    /// Allocate an object with an explicit derived-kind label.
    pub fn labeled(&mut self, kind: BuiltinKind, label: &str) -> NodeId {
        self.push(kind, Some(label.to_string()))
    }

    fn push(&mut self, kind: BuiltinKind, label: Option<String>) -> NodeId {
        let id = NodeId(self.objects.len() as u64 + 1);
        self.objects.push(SnapshotObject {
            id,
            kind,
            label,
            edges: Vec::new(),
        });
        id
    }

    /// Add a raw edge with an explicit reported strength and extra owners.
    pub fn edge_with(
        &mut self,
        from: NodeId,
        to: impl Into<SnapshotValue>,
        kind: EdgeKind,
        strong: bool,
        co_owners: Vec<SnapshotValue>,
    ) -> &mut Self {
        self.pending.push((
            from,
            SnapshotEdge {
                to: to.into(),
                kind,
                strong,
                co_owners,
            },
        ));
        self
    }

    pub fn edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> &mut Self {
        self.edge_with(from, to, kind, true, Vec::new())
    }

    pub fn property(&mut self, from: NodeId, name: &str, to: NodeId) -> &mut Self {
        self.edge(from, to, EdgeKind::PropertyName(name.to_string()))
    }

    /// A property holding a primitive; never becomes a graph edge.
    pub fn primitive_property(&mut self, from: NodeId, name: &str, value: &str) -> &mut Self {
        self.edge_with(
            from,
            SnapshotValue::Primitive(value.to_string()),
            EdgeKind::PropertyName(name.to_string()),
            true,
            Vec::new(),
        )
    }

    pub fn index(&mut self, from: NodeId, index: u32, to: NodeId) -> &mut Self {
        self.edge(from, to, EdgeKind::ArrayIndex(index))
    }

    pub fn slot(&mut self, from: NodeId, slot: &str, to: NodeId, strong: bool) -> &mut Self {
        self.edge_with(
            from,
            to,
            EdgeKind::InternalSlot(slot.to_string()),
            strong,
            Vec::new(),
        )
    }

    /// `map.set(key, value)`: a key edge plus a value edge that names the key
    /// as extra owner. Whether the key matters is up to the strength table.
    pub fn map_entry(&mut self, map: NodeId, key: NodeId, value: NodeId) -> &mut Self {
        self.edge(map, key, EdgeKind::MapKey);
        self.edge_with(map, value, EdgeKind::MapValue, true, vec![key.into()])
    }

    pub fn set_element(&mut self, set: NodeId, element: NodeId) -> &mut Self {
        self.edge(set, element, EdgeKind::SetElement)
    }

    pub fn weak_ref(&mut self, weak_ref: NodeId, target: NodeId) -> &mut Self {
        self.edge_with(weak_ref, target, EdgeKind::WeakRefTarget, false, Vec::new())
    }

    /// `registry.register(target, held_value, token)`.
    pub fn register(
        &mut self,
        registry: NodeId,
        target: NodeId,
        held_value: NodeId,
        token: Option<NodeId>,
    ) -> &mut Self {
        self.edge_with(registry, target, EdgeKind::FinalizerTarget, false, Vec::new());
        self.edge(registry, held_value, EdgeKind::FinalizerHeldValue);
        if let Some(token) = token {
            self.edge_with(
                registry,
                token,
                EdgeKind::FinalizerUnregisterToken,
                false,
                Vec::new(),
            );
        }
        self
    }

    /// `new Proxy(target, handler)`.
    pub fn proxy(&mut self, proxy: NodeId, target: NodeId, handler: NodeId) -> &mut Self {
        self.slot(proxy, "ProxyTarget", target, true);
        self.slot(proxy, "ProxyHandler", handler, true)
    }

    pub fn build(self) -> Result<HeapSnapshot> {
        let SnapshotBuilder {
            mut objects,
            pending,
        } = self;
        for (from, edge) in pending {
            // ids are handed out as position + 1
            let slot = usize::try_from(from.0).ok().and_then(|id| id.checked_sub(1));
            let obj = slot.and_then(|idx| objects.get_mut(idx)).ok_or_else(|| {
                RetentionError::Snapshot(format!("edge from unknown object {}", from.0))
            })?;
            obj.edges.push(edge);
        }
        HeapSnapshot::from_objects(objects)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
    {
        "objects": [
            { "id": 1, "kind": "array", "label": "Array",
              "edges": [
                  { "to": 2, "kind": { "array_index": 0 } },
                  { "to": "hello", "kind": { "array_index": 1 } }
              ] },
            { "id": 2, "kind": "weak_map",
              "edges": [
                  { "to": 3, "kind": "map_key" },
                  { "to": 4, "kind": "map_value", "co_owners": [3] }
              ] },
            { "id": 3, "kind": "object" },
            { "id": 4, "kind": "object", "label": "Widget" }
        ]
    }"#;

    #[test]
    fn from_json_indexes_objects() {
        let snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.object(NodeId(2)).unwrap().kind, BuiltinKind::WeakMap);
        assert!(snap.object(NodeId(9)).is_none());
    }

    #[test]
    fn untagged_values_distinguish_refs_and_primitives() {
        let snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        let arr = snap.object(NodeId(1)).unwrap();
        assert_eq!(arr.edges[0].to, SnapshotValue::Ref(NodeId(2)));
        assert_eq!(arr.edges[1].to, SnapshotValue::Primitive("hello".into()));
        assert!(arr.edges[0].strong);
    }

    #[test]
    fn source_reports_edges_and_labels() {
        let mut snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        let wm = SnapshotValue::Ref(NodeId(2));
        assert_eq!(snap.identity_of(&wm), Some(NodeId(2)));
        assert_eq!(snap.classify(&wm).unwrap(), (BuiltinKind::WeakMap, "weak_map".to_string()));

        let edges = snap.outgoing_edges(&wm).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[1].kind, EdgeKind::MapValue);
        assert_eq!(edges[1].co_owners, vec![SnapshotValue::Ref(NodeId(3))]);

        let widget = SnapshotValue::Ref(NodeId(4));
        assert_eq!(snap.classify(&widget).unwrap().1, "Widget");
    }

    #[test]
    fn identity_of_rejects_primitives_and_unknown_ids() {
        let mut snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        assert_eq!(snap.identity_of(&SnapshotValue::Primitive("1".into())), None);
        assert_eq!(snap.identity_of(&SnapshotValue::Ref(NodeId(77))), None);
    }

    #[test]
    fn outgoing_edges_of_unknown_object_is_source_error() {
        let mut snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        let err = snap.outgoing_edges(&SnapshotValue::Ref(NodeId(77))).unwrap_err();
        assert!(matches!(err, RetentionError::Source(_)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let text = r#"{ "objects": [ { "id": 1, "kind": "object" }, { "id": 1, "kind": "array" } ] }"#;
        let err = HeapSnapshot::from_json(text).unwrap_err();
        assert!(err.to_string().contains("duplicate object id 1"));
    }

    #[test]
    fn rejects_dangling_edges_and_co_owners() {
        let dangling_to = r#"{ "objects": [ { "id": 1, "kind": "object",
            "edges": [ { "to": 2, "kind": { "property_name": "x" } } ] } ] }"#;
        assert!(matches!(
            HeapSnapshot::from_json(dangling_to),
            Err(RetentionError::Snapshot(_))
        ));

        let dangling_owner = r#"{ "objects": [
            { "id": 1, "kind": "weak_map", "edges": [ { "to": 2, "kind": "map_value", "co_owners": [5] } ] },
            { "id": 2, "kind": "object" } ] }"#;
        assert!(matches!(
            HeapSnapshot::from_json(dangling_owner),
            Err(RetentionError::Snapshot(_))
        ));
    }

    #[test]
    fn rejects_sentinel_ids() {
        let text = format!(
            r#"{{ "objects": [ {{ "id": {}, "kind": "object" }} ] }}"#,
            NodeId::TARGET.0
        );
        assert!(HeapSnapshot::from_json(&text).is_err());
    }

    #[test]
    fn yaml_and_json_agree() {
        let yaml = r#"
objects:
  - id: 1
    kind: map
    edges:
      - to: 2
        kind: map_key
      - to: 3
        kind: map_value
        co_owners: [2]
  - id: 2
    kind: symbol
  - id: 3
    kind: function
"#;
        let snap = HeapSnapshot::from_yaml(yaml).unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.object(NodeId(2)).unwrap().kind, BuiltinKind::Symbol);
        assert_eq!(snap.object(NodeId(1)).unwrap().edges[1].co_owners.len(), 1);
    }

    #[test]
    fn yaml_edge_kinds_with_payloads() {
        let yaml = r#"
objects:
  - id: 1
    kind: array
    edges:
      - to: 2
        kind: { array_index: 3 }
      - to: 2
        kind:
          property_name: length
      - to: 2
        kind: { internal_slot: ProxyTarget }
  - id: 2
    kind: object
"#;
        let snap = HeapSnapshot::from_yaml(yaml).unwrap();
        let kinds: Vec<_> = snap.object(NodeId(1)).unwrap().edges.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::ArrayIndex(3),
                EdgeKind::PropertyName("length".into()),
                EdgeKind::InternalSlot("ProxyTarget".into()),
            ]
        );

        let json = HeapSnapshot::from_json(
            r#"{ "objects": [
                { "id": 1, "kind": "array", "edges": [
                    { "to": 2, "kind": { "array_index": 3 } },
                    { "to": 2, "kind": { "property_name": "length" } },
                    { "to": 2, "kind": { "internal_slot": "ProxyTarget" } } ] },
                { "id": 2, "kind": "object" } ] }"#,
        )
        .unwrap();
        assert_eq!(json.objects(), snap.objects());
    }

    #[test]
    fn yaml_output_reloads() {
        let snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&snap).unwrap();
        let back = HeapSnapshot::from_yaml(&yaml).unwrap();
        assert_eq!(back.objects(), snap.objects());
    }

    #[test]
    fn load_picks_parser_by_extension() {
        let tmp = TempDir::new().unwrap();
        let json_path = tmp.path().join("heap.json");
        std::fs::write(&json_path, SAMPLE).unwrap();
        assert_eq!(HeapSnapshot::load(&json_path).unwrap().len(), 4);

        let bad_path = tmp.path().join("heap.txt");
        std::fs::write(&bad_path, SAMPLE).unwrap();
        assert!(matches!(
            HeapSnapshot::load(&bad_path),
            Err(RetentionError::Snapshot(_))
        ));

        let bare_path = tmp.path().join("heap");
        std::fs::write(&bare_path, SAMPLE).unwrap();
        assert!(matches!(
            HeapSnapshot::load(&bare_path),
            Err(RetentionError::Snapshot(_))
        ));

        assert!(matches!(
            HeapSnapshot::load(&tmp.path().join("missing.json")),
            Err(RetentionError::Io(_))
        ));
    }

    #[test]
    fn serde_roundtrip_through_snapshot_file() {
        let snap = HeapSnapshot::from_json(SAMPLE).unwrap();
        let json = serde_json::to_string(&snap).unwrap();
        let back: HeapSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.objects(), snap.objects());
    }

    #[test]
    fn builder_assigns_sequential_ids_and_attaches_edges() {
        let mut b = HeapSnapshot::builder();
        let map = b.object(BuiltinKind::Map);
        let key = b.object(BuiltinKind::Object);
        let value = b.labeled(BuiltinKind::Object, "Payload");
        b.map_entry(map, key, value).primitive_property(value, "size", "3");
        let snap = b.build().unwrap();

        assert_eq!((map, key, value), (NodeId(1), NodeId(2), NodeId(3)));
        let edges = &snap.object(map).unwrap().edges;
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].kind, EdgeKind::MapKey);
        assert_eq!(edges[1].co_owners, vec![SnapshotValue::Ref(key)]);
        assert_eq!(snap.object(value).unwrap().label.as_deref(), Some("Payload"));
    }

    #[test]
    fn builder_rejects_edges_from_unknown_objects() {
        let mut b = HeapSnapshot::builder();
        let a = b.object(BuiltinKind::Object);
        b.property(NodeId(40), "x", a);
        assert!(b.build().is_err());
    }

    #[test]
    fn builder_register_and_proxy_shapes() {
        let mut b = HeapSnapshot::builder();
        let registry = b.object(BuiltinKind::FinalizationRegistry);
        let target = b.object(BuiltinKind::Object);
        let held = b.object(BuiltinKind::Object);
        let token = b.object(BuiltinKind::Object);
        let proxy = b.object(BuiltinKind::Proxy);
        let handler = b.object(BuiltinKind::Object);
        b.register(registry, target, held, Some(token));
        b.proxy(proxy, target, handler);
        let snap = b.build().unwrap();

        let kinds: Vec<_> = snap
            .object(registry)
            .unwrap()
            .edges
            .iter()
            .map(|e| e.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::FinalizerTarget,
                EdgeKind::FinalizerHeldValue,
                EdgeKind::FinalizerUnregisterToken
            ]
        );
        assert_eq!(snap.object(proxy).unwrap().edges.len(), 2);
    }
}
