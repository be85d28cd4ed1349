/// Consumed collaborator interfaces
///
/// The network database driver and the schema validator live outside this
/// crate; only their contracts are defined here. Transport faults carry
/// their own error type so callers can always tell them apart from the
/// domain errors of [`crate::engine`].

use crate::compiler::CompiledQuery;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

/// Network/transport faults; strictly a driver concern
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Query timed out after {0} ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error [{code}]: {message}")]
    Server { code: String, message: String },
}

pub type DriverResult<T> = Result<T, DriverError>;

/// One result row as returned by the remote store
pub type DriverRecord = HashMap<String, JsonValue>;

/// Transaction mode for driver-side work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Read,
    Write,
}

/// Usage counters a driver implementation keeps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverMetrics {
    pub queries_run: u64,
    pub transactions_run: u64,
    pub failures: u64,
}

/// A Cypher-speaking database connection
///
/// Implementations own pooling, retry and timeout policy; the core never
/// retries on its own.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    async fn connect(&self) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;

    fn is_connected(&self) -> bool;

    /// Run one compiled query with its parameter table
    async fn run(&self, query: &CompiledQuery) -> DriverResult<Vec<DriverRecord>>;

    /// Run a batch of compiled queries in one transaction
    async fn transaction(
        &self,
        queries: Vec<CompiledQuery>,
        mode: TxMode,
    ) -> DriverResult<Vec<Vec<DriverRecord>>>;

    fn metrics(&self) -> DriverMetrics;
}

/// Schema existence checks consumed while plans are being built
///
/// Validation happens before a plan reaches a backend; this crate does not
/// re-validate.
pub trait SchemaValidator: Send + Sync {
    fn has_label(&self, label: &str) -> bool;

    fn has_edge_type(&self, edge_type: &str) -> bool;

    fn has_property(&self, label: &str, property: &str) -> bool;
}
