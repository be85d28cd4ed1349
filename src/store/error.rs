/// Error types for store operations

use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A node with this id already exists
    #[error("Node already exists: {0}")]
    NodeExists(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// An edge with this id already exists
    #[error("Edge already exists: {0}")]
    EdgeExists(String),

    /// Edge not found
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// begin_transaction while another transaction is open
    #[error("A transaction is already open")]
    TransactionOpen,

    /// commit/rollback without an open transaction
    #[error("No open transaction")]
    NoTransaction,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
