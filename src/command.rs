/// Backend-agnostic command protocol
///
/// The mutation layer talks to a backend through this tagged union instead
/// of knowing whether it compiles to Cypher text or calls the in-memory
/// engine. The serde derives keep the protocol wire-representable for
/// debugging; in-process it is passed by direct call, never serialized.

use crate::engine::{EngineError, EngineResult, MemoryEngine, SubtreeNode};
use crate::store::StoreError;
use crate::types::{Edge, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Read-only query operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum QueryOp {
    GetById {
        id: String,
    },
    GetByLabel {
        label: String,
    },
    Exists {
        id: String,
    },
    EdgeExists {
        from_id: String,
        to_id: String,
        edge_type: Option<String>,
    },
    GetParent {
        id: String,
        edge_type: String,
    },
    GetChildren {
        id: String,
        edge_type: String,
    },
    GetSubtree {
        root_id: String,
        edge_type: String,
        max_depth: Option<u32>,
    },
    WouldCreateCycle {
        node_id: String,
        new_parent_id: String,
        edge_type: String,
    },
    GetAncestorPath {
        id: String,
        edge_type: String,
    },
}

/// A mutation or query addressed to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    CreateNode {
        id: String,
        label: String,
        params: JsonValue,
    },
    UpdateNode {
        id: String,
        params: JsonValue,
    },
    DeleteNode {
        id: String,
        #[serde(default)]
        detach: bool,
    },
    /// Endpoint existence is validated by the mutation layer before the
    /// command reaches a backend
    CreateEdge {
        id: String,
        edge_type: String,
        from_id: String,
        to_id: String,
        params: JsonValue,
    },
    /// Applies to every parallel edge matching the endpoints (and type)
    UpdateEdge {
        from_id: String,
        to_id: String,
        edge_type: Option<String>,
        params: JsonValue,
    },
    /// Removes every parallel edge matching the endpoints (and type)
    DeleteEdge {
        from_id: String,
        to_id: String,
        edge_type: Option<String>,
    },
    Query(QueryOp),
}

/// Typed command results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CommandResponse {
    Node { node: Option<Node> },
    Nodes { nodes: Vec<Node> },
    Edge { edge: Edge },
    Bool { value: bool },
    Count { count: usize },
    Subtree { entries: Vec<SubtreeNode> },
    Unit,
}

fn map_missing_node(err: StoreError) -> EngineError {
    match err {
        StoreError::NodeNotFound(id) => EngineError::NotFound(id),
        other => other.into(),
    }
}

impl MemoryEngine {
    /// Handle one command against the in-memory backend
    ///
    /// Async mirrors the network backend's contract; the work completes
    /// synchronously.
    pub async fn dispatch(&self, command: Command) -> EngineResult<CommandResponse> {
        match command {
            Command::CreateNode { id, label, params } => {
                let store = self.store();
                let mut store = store.write();
                let node = store.create_node(id, label, params)?;
                Ok(CommandResponse::Node { node: Some(node) })
            }
            Command::UpdateNode { id, params } => {
                let store = self.store();
                let mut store = store.write();
                let node = store.update_node(&id, &params).map_err(map_missing_node)?;
                Ok(CommandResponse::Node { node: Some(node) })
            }
            Command::DeleteNode { id, detach } => {
                let store = self.store();
                let mut store = store.write();
                store.delete_node(&id, detach).map_err(map_missing_node)?;
                Ok(CommandResponse::Unit)
            }
            Command::CreateEdge {
                id,
                edge_type,
                from_id,
                to_id,
                params,
            } => {
                let store = self.store();
                let mut store = store.write();
                let edge = store.create_edge(id, edge_type, from_id, to_id, params)?;
                Ok(CommandResponse::Edge { edge })
            }
            Command::UpdateEdge {
                from_id,
                to_id,
                edge_type,
                params,
            } => {
                let store = self.store();
                let mut store = store.write();
                let count =
                    store.update_edges_between(&from_id, &to_id, edge_type.as_deref(), &params);
                if count == 0 {
                    return Err(EngineError::EdgeNotFound {
                        from_id,
                        to_id,
                        edge_type,
                    });
                }
                Ok(CommandResponse::Count { count })
            }
            Command::DeleteEdge {
                from_id,
                to_id,
                edge_type,
            } => {
                let store = self.store();
                let mut store = store.write();
                let count = store.delete_edges_between(&from_id, &to_id, edge_type.as_deref());
                if count == 0 {
                    return Err(EngineError::EdgeNotFound {
                        from_id,
                        to_id,
                        edge_type,
                    });
                }
                Ok(CommandResponse::Count { count })
            }
            Command::Query(op) => self.dispatch_query(op).await,
        }
    }

    async fn dispatch_query(&self, op: QueryOp) -> EngineResult<CommandResponse> {
        use crate::engine::hierarchy;

        let store = self.store();
        let store = store.read();
        match op {
            QueryOp::GetById { id } => Ok(CommandResponse::Node {
                node: store.get_node(&id),
            }),
            QueryOp::GetByLabel { label } => Ok(CommandResponse::Nodes {
                nodes: store.nodes_by_label(&label),
            }),
            QueryOp::Exists { id } => Ok(CommandResponse::Bool {
                value: store.node_exists(&id),
            }),
            QueryOp::EdgeExists {
                from_id,
                to_id,
                edge_type,
            } => Ok(CommandResponse::Bool {
                value: store.edge_exists(&from_id, &to_id, edge_type.as_deref()),
            }),
            QueryOp::GetParent { id, edge_type } => Ok(CommandResponse::Node {
                node: hierarchy::parent_of(&store, &id, &edge_type),
            }),
            QueryOp::GetChildren { id, edge_type } => Ok(CommandResponse::Nodes {
                nodes: hierarchy::children_of(&store, &id, &edge_type),
            }),
            QueryOp::GetSubtree {
                root_id,
                edge_type,
                max_depth,
            } => Ok(CommandResponse::Subtree {
                entries: hierarchy::subtree(&store, &root_id, &edge_type, max_depth),
            }),
            QueryOp::WouldCreateCycle {
                node_id,
                new_parent_id,
                edge_type,
            } => Ok(CommandResponse::Bool {
                value: hierarchy::would_create_cycle(&store, &edge_type, &node_id, &new_parent_id),
            }),
            QueryOp::GetAncestorPath { id, edge_type } => Ok(CommandResponse::Nodes {
                nodes: hierarchy::ancestor_path(&store, &id, &edge_type),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_crud_commands() {
        let engine = MemoryEngine::with_empty_store();

        let created = engine
            .dispatch(Command::CreateNode {
                id: "u1".into(),
                label: "user".into(),
                params: json!({"name": "Ada"}),
            })
            .await
            .unwrap();
        assert!(matches!(created, CommandResponse::Node { node: Some(_) }));

        let updated = engine
            .dispatch(Command::UpdateNode {
                id: "u1".into(),
                params: json!({"name": "Grace"}),
            })
            .await
            .unwrap();
        match updated {
            CommandResponse::Node { node: Some(node) } => {
                assert_eq!(node.get_property("name"), Some(&json!("Grace")));
            }
            other => panic!("expected node, got {other:?}"),
        }

        let err = engine
            .dispatch(Command::UpdateNode {
                id: "ghost".into(),
                params: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_delete_edge_by_endpoints_removes_all() {
        let engine = MemoryEngine::with_empty_store();
        {
            let store = engine.store();
            let mut store = store.write();
            store.create_node("a", "item", json!({})).unwrap();
            store.create_node("b", "item", json!({})).unwrap();
            store.create_edge("e1", "linked", "a", "b", json!({})).unwrap();
            store.create_edge("e2", "linked", "a", "b", json!({})).unwrap();
        }

        let removed = engine
            .dispatch(Command::DeleteEdge {
                from_id: "a".into(),
                to_id: "b".into(),
                edge_type: Some("linked".into()),
            })
            .await
            .unwrap();
        assert_eq!(removed, CommandResponse::Count { count: 2 });

        let err = engine
            .dispatch(Command::DeleteEdge {
                from_id: "a".into(),
                to_id: "b".into(),
                edge_type: Some("linked".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EdgeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_operations() {
        let engine = MemoryEngine::with_empty_store();
        {
            let store = engine.store();
            let mut store = store.write();
            for id in ["root", "mid", "leaf"] {
                store.create_node(id, "folder", json!({})).unwrap();
            }
            store.create_edge("h1", "child_of", "mid", "root", json!({})).unwrap();
            store.create_edge("h2", "child_of", "leaf", "mid", json!({})).unwrap();
        }

        let parent = engine
            .dispatch(Command::Query(QueryOp::GetParent {
                id: "leaf".into(),
                edge_type: "child_of".into(),
            }))
            .await
            .unwrap();
        match parent {
            CommandResponse::Node { node: Some(node) } => assert_eq!(node.id, "mid"),
            other => panic!("expected node, got {other:?}"),
        }

        let cycle = engine
            .dispatch(Command::Query(QueryOp::WouldCreateCycle {
                node_id: "root".into(),
                new_parent_id: "leaf".into(),
                edge_type: "child_of".into(),
            }))
            .await
            .unwrap();
        assert_eq!(cycle, CommandResponse::Bool { value: true });

        let path = engine
            .dispatch(Command::Query(QueryOp::GetAncestorPath {
                id: "leaf".into(),
                edge_type: "child_of".into(),
            }))
            .await
            .unwrap();
        match path {
            CommandResponse::Nodes { nodes } => {
                let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
                assert_eq!(ids, vec!["leaf", "mid", "root"]);
            }
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_command_serialization_shape() {
        let command = Command::Query(QueryOp::GetById { id: "u1".into() });
        let text = serde_json::to_string(&command).unwrap();
        assert!(text.contains("\"type\":\"query\""));
        assert!(text.contains("\"operation\":\"getById\""));

        let back: Command = serde_json::from_str(&text).unwrap();
        assert_eq!(back, command);
    }
}
