/// Core data types for the property-graph model
///
/// This module defines the fundamental types used throughout the system:
/// - Node: labeled graph node with a flat, globally unique string id
/// - Edge: typed, directed relationship between two node ids
/// - GraphPath: sequence of nodes and edges forming a path

pub mod edge;
pub mod node;
pub mod path;

pub use edge::Edge;
pub use node::Node;
pub use path::{GraphPath, PathError};
