/// In-memory graph store
///
/// Node/edge storage with adjacency indices and snapshot-based transactions.
/// Adjacency lookups return edges in **insertion order**; several hierarchy
/// operations ("the parent" = first outgoing hierarchy edge) depend on this
/// determinism, so the index is an order-preserving list, never a hash set.
///
/// Mutations outside a transaction apply immediately (autocommit). Exactly
/// one transaction may be open at a time; a nested `begin_transaction` fails
/// fast instead of clobbering the first snapshot.

pub mod error;
pub mod snapshot;
pub mod transaction;

pub use error::{StoreError, StoreResult};
pub use snapshot::{export_to_json, import_from_json, ExportOptions, ImportStats};

use crate::types::{Edge, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use transaction::TxSnapshot;

/// Full point-in-time copy of the store contents, in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Summary statistics over the store contents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub node_count: usize,
    pub edge_count: usize,
    /// Distinct node labels, sorted
    pub labels: Vec<String>,
    /// Distinct edge types, sorted
    pub edge_types: Vec<String>,
}

/// In-memory property-graph store
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: HashMap<String, Node>,
    node_order: Vec<String>,
    edges: HashMap<String, Edge>,
    edge_order: Vec<String>,
    /// node id -> outgoing edge ids, in insertion order
    outgoing: HashMap<String, Vec<String>>,
    /// node id -> incoming edge ids, in insertion order
    incoming: HashMap<String, Vec<String>>,
    id_seq: u64,
    tx: Option<TxSnapshot>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- node CRUD ---------------------------------------------------

    /// Create a node; fails if the id is already taken
    pub fn create_node(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        properties: JsonValue,
    ) -> StoreResult<Node> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(StoreError::NodeExists(id));
        }
        let node = Node::new(id.clone(), label, properties);
        tracing::debug!(id = %id, label = %node.label, "create node");
        self.nodes.insert(id.clone(), node.clone());
        self.node_order.push(id);
        Ok(node)
    }

    /// Get a node by id
    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).cloned()
    }

    pub fn node_exists(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Merge the given properties into a node; fails if absent
    pub fn update_node(&mut self, id: &str, patch: &JsonValue) -> StoreResult<Node> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.to_string()))?;
        node.merge_properties(patch);
        node.updated_at = chrono::Utc::now();
        tracing::debug!(id = %id, "update node");
        Ok(node.clone())
    }

    /// Delete a node
    ///
    /// With `detach` the node's edges are removed too; otherwise edges are
    /// preserved and may dangle until the caller cleans them up.
    pub fn delete_node(&mut self, id: &str, detach: bool) -> StoreResult<Node> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.to_string()))?;
        self.node_order.retain(|n| n != id);

        if detach {
            let mut touching: Vec<String> = Vec::new();
            touching.extend(self.outgoing.get(id).cloned().unwrap_or_default());
            touching.extend(self.incoming.get(id).cloned().unwrap_or_default());
            for edge_id in touching {
                // ignore already-removed parallel entries
                let _ = self.delete_edge(&edge_id);
            }
        }
        self.outgoing.remove(id);
        self.incoming.remove(id);
        tracing::debug!(id = %id, detach, "delete node");
        Ok(node)
    }

    /// All nodes with the given label, in insertion order
    pub fn nodes_by_label(&self, label: &str) -> Vec<Node> {
        self.node_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.label == label)
            .cloned()
            .collect()
    }

    /// All nodes in insertion order
    pub fn all_nodes(&self) -> Vec<Node> {
        self.node_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .cloned()
            .collect()
    }

    // ---- edge CRUD ---------------------------------------------------

    /// Create an edge; fails if the id is already taken
    ///
    /// Endpoint existence is the mutation layer's responsibility; the store
    /// accepts edges whose endpoints it has never seen.
    pub fn create_edge(
        &mut self,
        id: impl Into<String>,
        edge_type: impl Into<String>,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        properties: JsonValue,
    ) -> StoreResult<Edge> {
        let id = id.into();
        if self.edges.contains_key(&id) {
            return Err(StoreError::EdgeExists(id));
        }
        let edge = Edge::new(id.clone(), edge_type, from_id, to_id, properties);
        tracing::debug!(id = %id, edge_type = %edge.edge_type, from = %edge.from_id, to = %edge.to_id, "create edge");
        self.outgoing
            .entry(edge.from_id.clone())
            .or_default()
            .push(id.clone());
        self.incoming
            .entry(edge.to_id.clone())
            .or_default()
            .push(id.clone());
        self.edges.insert(id.clone(), edge.clone());
        self.edge_order.push(id);
        Ok(edge)
    }

    /// Get an edge by id
    pub fn get_edge(&self, id: &str) -> Option<Edge> {
        self.edges.get(id).cloned()
    }

    /// Merge the given properties into an edge; fails if absent
    pub fn update_edge(&mut self, id: &str, patch: &JsonValue) -> StoreResult<Edge> {
        let edge = self
            .edges
            .get_mut(id)
            .ok_or_else(|| StoreError::EdgeNotFound(id.to_string()))?;
        edge.merge_properties(patch);
        Ok(edge.clone())
    }

    /// Delete an edge by id
    pub fn delete_edge(&mut self, id: &str) -> StoreResult<Edge> {
        let edge = self
            .edges
            .remove(id)
            .ok_or_else(|| StoreError::EdgeNotFound(id.to_string()))?;
        self.edge_order.retain(|e| e != id);
        if let Some(out) = self.outgoing.get_mut(&edge.from_id) {
            out.retain(|e| e != id);
        }
        if let Some(inc) = self.incoming.get_mut(&edge.to_id) {
            inc.retain(|e| e != id);
        }
        tracing::debug!(id = %id, "delete edge");
        Ok(edge)
    }

    /// Merge properties into every edge matching the endpoints (and type,
    /// when given); returns how many edges were touched
    pub fn update_edges_between(
        &mut self,
        from_id: &str,
        to_id: &str,
        edge_type: Option<&str>,
        patch: &JsonValue,
    ) -> usize {
        let ids = self.edge_ids_between(from_id, to_id, edge_type);
        for id in &ids {
            if let Some(edge) = self.edges.get_mut(id) {
                edge.merge_properties(patch);
            }
        }
        ids.len()
    }

    /// Delete every edge matching the endpoints (and type, when given)
    ///
    /// Parallel edges of the same type are all removed; returns the count.
    pub fn delete_edges_between(
        &mut self,
        from_id: &str,
        to_id: &str,
        edge_type: Option<&str>,
    ) -> usize {
        let ids = self.edge_ids_between(from_id, to_id, edge_type);
        for id in &ids {
            let _ = self.delete_edge(id);
        }
        ids.len()
    }

    fn edge_ids_between(
        &self,
        from_id: &str,
        to_id: &str,
        edge_type: Option<&str>,
    ) -> Vec<String> {
        self.outgoing
            .get(from_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        self.edges.get(*id).is_some_and(|e| {
                            e.to_id == to_id
                                && edge_type.is_none_or(|t| e.edge_type == t)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any edge matches the endpoints (and type, when given)
    pub fn edge_exists(&self, from_id: &str, to_id: &str, edge_type: Option<&str>) -> bool {
        !self.edge_ids_between(from_id, to_id, edge_type).is_empty()
    }

    // ---- adjacency ---------------------------------------------------

    /// Outgoing edges of a node in insertion order, optionally type-filtered
    pub fn get_outgoing_edges(&self, id: &str, edge_type: Option<&str>) -> Vec<Edge> {
        self.adjacent(&self.outgoing, id, edge_type)
    }

    /// Incoming edges of a node in insertion order, optionally type-filtered
    pub fn get_incoming_edges(&self, id: &str, edge_type: Option<&str>) -> Vec<Edge> {
        self.adjacent(&self.incoming, id, edge_type)
    }

    fn adjacent(
        &self,
        index: &HashMap<String, Vec<String>>,
        id: &str,
        edge_type: Option<&str>,
    ) -> Vec<Edge> {
        index
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|e| self.edges.get(e))
                    .filter(|e| edge_type.is_none_or(|t| e.edge_type == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All edges in insertion order
    pub fn all_edges(&self) -> Vec<Edge> {
        self.edge_order
            .iter()
            .filter_map(|id| self.edges.get(id))
            .cloned()
            .collect()
    }

    // ---- ids / stats / snapshot --------------------------------------

    /// Allocate a store-unique id with the given prefix
    pub fn allocate_id(&mut self, prefix: &str) -> String {
        loop {
            self.id_seq += 1;
            let id = format!("{prefix}-{}", self.id_seq);
            if !self.nodes.contains_key(&id) && !self.edges.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Counts plus distinct labels and edge types
    pub fn summary(&self) -> StoreSummary {
        let mut labels: Vec<String> = self
            .nodes
            .values()
            .map(|n| n.label.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        labels.sort();
        let mut edge_types: Vec<String> = self
            .edges
            .values()
            .map(|e| e.edge_type.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        edge_types.sort();
        StoreSummary {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            labels,
            edge_types,
        }
    }

    /// Export the full store contents, in insertion order
    pub fn export(&self) -> StoreSnapshot {
        StoreSnapshot {
            nodes: self.all_nodes(),
            edges: self.all_edges(),
        }
    }

    /// Replace the store contents with a snapshot
    ///
    /// Adjacency indices are rebuilt in the snapshot's edge order. Endpoint
    /// validity is the caller's responsibility, as with `create_edge`.
    pub fn import(&mut self, snapshot: StoreSnapshot) {
        self.nodes.clear();
        self.node_order.clear();
        self.edges.clear();
        self.edge_order.clear();
        self.outgoing.clear();
        self.incoming.clear();

        for node in snapshot.nodes {
            self.node_order.push(node.id.clone());
            self.nodes.insert(node.id.clone(), node);
        }
        for edge in snapshot.edges {
            self.outgoing
                .entry(edge.from_id.clone())
                .or_default()
                .push(edge.id.clone());
            self.incoming
                .entry(edge.to_id.clone())
                .or_default()
                .push(edge.id.clone());
            self.edge_order.push(edge.id.clone());
            self.edges.insert(edge.id.clone(), edge);
        }
        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "imported snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_and_get_round_trip() {
        let mut store = GraphStore::new();
        store
            .create_node("u1", "user", json!({"name": "Alice"}))
            .unwrap();

        let node = store.get_node("u1").unwrap();
        assert_eq!(node.id, "u1");
        assert_eq!(node.label, "user");
        assert_eq!(node.get_property("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_create_duplicate_id_fails() {
        let mut store = GraphStore::new();
        store.create_node("u1", "user", json!({})).unwrap();
        let err = store.create_node("u1", "post", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::NodeExists(id) if id == "u1"));
    }

    #[test]
    fn test_update_merges_properties() {
        let mut store = GraphStore::new();
        store
            .create_node("u1", "user", json!({"name": "Alice", "age": 30}))
            .unwrap();

        let updated = store.update_node("u1", &json!({"age": 31})).unwrap();
        assert_eq!(updated.get_property("name"), Some(&json!("Alice")));
        assert_eq!(updated.get_property("age"), Some(&json!(31)));
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn test_update_missing_fails() {
        let mut store = GraphStore::new();
        let err = store.update_node("ghost", &json!({})).unwrap_err();
        assert!(matches!(err, StoreError::NodeNotFound(_)));
    }

    #[test]
    fn test_delete_detach_cascades_edges() {
        let mut store = GraphStore::new();
        store.create_node("a", "item", json!({})).unwrap();
        store.create_node("b", "item", json!({})).unwrap();
        store
            .create_edge("e1", "linked", "a", "b", json!({}))
            .unwrap();
        store
            .create_edge("e2", "linked", "b", "a", json!({}))
            .unwrap();

        store.delete_node("a", true).unwrap();
        assert_eq!(store.edge_count(), 0);
        assert!(store.get_incoming_edges("b", None).is_empty());
    }

    #[test]
    fn test_delete_preserve_keeps_edges() {
        let mut store = GraphStore::new();
        store.create_node("a", "item", json!({})).unwrap();
        store.create_node("b", "item", json!({})).unwrap();
        store
            .create_edge("e1", "linked", "a", "b", json!({}))
            .unwrap();

        store.delete_node("a", false).unwrap();
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_adjacency_insertion_order() {
        let mut store = GraphStore::new();
        store.create_node("u1", "user", json!({})).unwrap();
        for i in 1..=3 {
            store.create_node(format!("p{i}"), "post", json!({})).unwrap();
            store
                .create_edge(format!("e{i}"), "authored", "u1", format!("p{i}"), json!({}))
                .unwrap();
        }

        let targets: Vec<String> = store
            .get_outgoing_edges("u1", Some("authored"))
            .into_iter()
            .map(|e| e.to_id)
            .collect();
        assert_eq!(targets, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_adjacency_type_filter() {
        let mut store = GraphStore::new();
        store.create_node("u1", "user", json!({})).unwrap();
        store.create_node("p1", "post", json!({})).unwrap();
        store
            .create_edge("e1", "authored", "u1", "p1", json!({}))
            .unwrap();
        store
            .create_edge("e2", "liked", "u1", "p1", json!({}))
            .unwrap();

        assert_eq!(store.get_outgoing_edges("u1", Some("authored")).len(), 1);
        assert_eq!(store.get_outgoing_edges("u1", None).len(), 2);
    }

    #[test]
    fn test_delete_edges_between_removes_all_parallel_edges() {
        let mut store = GraphStore::new();
        store.create_node("a", "item", json!({})).unwrap();
        store.create_node("b", "item", json!({})).unwrap();
        store
            .create_edge("e1", "linked", "a", "b", json!({}))
            .unwrap();
        store
            .create_edge("e2", "linked", "a", "b", json!({}))
            .unwrap();
        store
            .create_edge("e3", "other", "a", "b", json!({}))
            .unwrap();

        let removed = store.delete_edges_between("a", "b", Some("linked"));
        assert_eq!(removed, 2);
        assert_eq!(store.edge_count(), 1);
        assert!(store.edge_exists("a", "b", Some("other")));
        assert!(!store.edge_exists("a", "b", Some("linked")));
    }

    #[test]
    fn test_summary() {
        let mut store = GraphStore::new();
        store.create_node("u1", "user", json!({})).unwrap();
        store.create_node("u2", "user", json!({})).unwrap();
        store.create_node("p1", "post", json!({})).unwrap();
        store
            .create_edge("e1", "authored", "u1", "p1", json!({}))
            .unwrap();

        let summary = store.summary();
        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.edge_count, 1);
        assert_eq!(summary.labels, vec!["post", "user"]);
        assert_eq!(summary.edge_types, vec!["authored"]);
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut store = GraphStore::new();
        store.create_node("u1", "user", json!({"name": "Alice"})).unwrap();
        store.create_node("p1", "post", json!({})).unwrap();
        store
            .create_edge("e1", "authored", "u1", "p1", json!({}))
            .unwrap();

        let snapshot = store.export();

        let mut other = GraphStore::new();
        other.import(snapshot.clone());
        assert_eq!(other.export(), snapshot);
        assert_eq!(
            other.get_outgoing_edges("u1", None).len(),
            store.get_outgoing_edges("u1", None).len()
        );
    }

    #[test]
    fn test_allocate_id_skips_taken_ids() {
        let mut store = GraphStore::new();
        store.create_node("clone-1", "item", json!({})).unwrap();
        let id = store.allocate_id("clone");
        assert_eq!(id, "clone-2");
    }
}
