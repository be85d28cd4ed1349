use super::{edge::Edge, node::Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for GraphPath operations
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path is empty")]
    EmptyPath,

    #[error("Path nodes and edges count mismatch: {nodes} nodes, {edges} edges")]
    CountMismatch { nodes: usize, edges: usize },

    #[error("Path discontinuity at position {pos}: edge connects {edge_from} to {edge_to}, but path has {path_end}")]
    Discontinuity {
        pos: usize,
        edge_from: String,
        edge_to: String,
        path_end: String,
    },
}

/// GraphPath represents a path in the graph
///
/// A path consists of an alternating sequence of nodes and edges:
/// (n1) -[e1]-> (n2) -[e2]-> (n3) ... -[ek]-> (nk+1)
///
/// Invariants:
/// - nodes.len() = edges.len() + 1
/// - edges[i] connects nodes[i] to nodes[i+1] (in either direction)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphPath {
    /// Nodes in the path
    pub nodes: Vec<Node>,

    /// Edges in the path
    pub edges: Vec<Edge>,
}

impl GraphPath {
    /// Create a new path with a single node (no edges)
    pub fn new(start: Node) -> Self {
        Self {
            nodes: vec![start],
            edges: Vec::new(),
        }
    }

    /// Create a path from nodes and edges
    ///
    /// # Errors
    /// Returns an error if the path is invalid (wrong counts or discontinuous)
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, PathError> {
        let path = Self { nodes, edges };
        path.validate()?;
        Ok(path)
    }

    /// Validate the path invariants
    pub fn validate(&self) -> Result<(), PathError> {
        if self.nodes.is_empty() {
            return Err(PathError::EmptyPath);
        }

        if self.nodes.len() != self.edges.len() + 1 {
            return Err(PathError::CountMismatch {
                nodes: self.nodes.len(),
                edges: self.edges.len(),
            });
        }

        for (i, edge) in self.edges.iter().enumerate() {
            let here = &self.nodes[i].id;
            let next = &self.nodes[i + 1].id;
            let connects = (edge.from_id == *here && edge.to_id == *next)
                || (edge.to_id == *here && edge.from_id == *next);
            if !connects {
                return Err(PathError::Discontinuity {
                    pos: i,
                    edge_from: edge.from_id.clone(),
                    edge_to: edge.to_id.clone(),
                    path_end: here.clone(),
                });
            }
        }

        Ok(())
    }

    /// Extend the path with an edge and its target node
    pub fn extend(&self, edge: Edge, node: Node) -> Self {
        let mut path = self.clone();
        path.edges.push(edge);
        path.nodes.push(node);
        path
    }

    /// Number of edges in the path
    pub fn length(&self) -> usize {
        self.edges.len()
    }

    /// First node of the path
    pub fn start(&self) -> &Node {
        &self.nodes[0]
    }

    /// Last node of the path
    pub fn end(&self) -> &Node {
        self.nodes
            .last()
            .expect("GraphPath always has at least one node")
    }

    /// Check whether the path visits a node id (cycle guard)
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }
}
