/// Dualgraph
///
/// A typed query/mutation layer for property graphs with two backends that
/// agree on every semantic: a Cypher compiler for Neo4j/Memgraph-class
/// stores and a pure in-memory interpreter.
///
/// # Architecture
///
/// ```text
/// ┌──────────────────────────────────────────────────┐
/// │                 Dualgraph                        │
/// ├──────────────────────────────────────────────────┤
/// │  ┌────────────────────────────────┐              │
/// │  │   Query Plan Builder (AST)     │              │
/// │  └──────┬──────────────────┬──────┘              │
/// │         ↓                  ↓                      │
/// │  ┌─────────────┐   ┌───────────────────┐         │
/// │  │   Cypher    │   │  In-Memory Engine │         │
/// │  │   Compiler  │   │  + Graph Store    │         │
/// │  └──────┬──────┘   └───────────────────┘         │
/// │         ↓                                         │
/// │  ┌────────────────────────────────┐              │
/// │  │   Network Driver (external)    │              │
/// │  └────────────────────────────────┘              │
/// └──────────────────────────────────────────────────┘
/// ```
///
/// # Modules
///
/// - `types`: core data types (Node, Edge, GraphPath)
/// - `ast`: query-plan model and the immutable builder
/// - `compiler`: plan-to-Cypher translation with rewrite passes
/// - `store`: in-memory graph store with snapshot transactions
/// - `engine`: plan interpreter over the store
/// - `command`: backend-agnostic command protocol
/// - `driver`: consumed collaborator interfaces

pub mod ast;
pub mod command;
pub mod compiler;
pub mod driver;
pub mod engine;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use types::{Edge, GraphPath, Node, PathError};

// Re-export plan building
pub use ast::{
    AliasRegistry, AstError, AstSnapshot, Cardinality, CompareOp, Condition, Direction,
    HierarchyOp, HopRange, Projection, QueryAst, ResultType, SetOperator, Step, TraversalSpec,
};

// Re-export compilation
pub use compiler::{compile, compile_with, CompileError, CompileOptions, CompiledQuery, QueryMeta};

// Re-export storage
pub use store::{
    export_to_json, import_from_json, ExportOptions, GraphStore, ImportStats, StoreError,
    StoreResult, StoreSnapshot, StoreSummary,
};

// Re-export the in-memory backend
pub use engine::{EngineError, EngineResult, MemoryEngine, QueryOutput, SubtreeNode};

// Re-export the command protocol
pub use command::{Command, CommandResponse, QueryOp};

// Re-export collaborator contracts
pub use driver::{DriverError, DriverMetrics, DriverResult, GraphDriver, SchemaValidator, TxMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
