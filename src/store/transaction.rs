/// Snapshot-based transactions for the in-memory store
///
/// `begin_transaction` copies all state; `commit` discards the copy;
/// `rollback` restores it. Transactions are cooperative, not concurrent:
/// exactly one may be open at a time, and a nested begin fails fast.

use super::{GraphStore, StoreError, StoreResult};
use crate::types::{Edge, Node};
use std::collections::HashMap;

/// Point-in-time copy of every store collection
#[derive(Debug, Clone)]
pub(super) struct TxSnapshot {
    nodes: HashMap<String, Node>,
    node_order: Vec<String>,
    edges: HashMap<String, Edge>,
    edge_order: Vec<String>,
    outgoing: HashMap<String, Vec<String>>,
    incoming: HashMap<String, Vec<String>>,
    id_seq: u64,
}

impl GraphStore {
    /// Open a transaction; fails if one is already open
    pub fn begin_transaction(&mut self) -> StoreResult<()> {
        if self.tx.is_some() {
            return Err(StoreError::TransactionOpen);
        }
        self.tx = Some(TxSnapshot {
            nodes: self.nodes.clone(),
            node_order: self.node_order.clone(),
            edges: self.edges.clone(),
            edge_order: self.edge_order.clone(),
            outgoing: self.outgoing.clone(),
            incoming: self.incoming.clone(),
            id_seq: self.id_seq,
        });
        tracing::debug!("transaction begun");
        Ok(())
    }

    /// Keep all mutations made since `begin_transaction`
    pub fn commit(&mut self) -> StoreResult<()> {
        if self.tx.take().is_none() {
            return Err(StoreError::NoTransaction);
        }
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Restore the state captured by `begin_transaction`
    pub fn rollback(&mut self) -> StoreResult<()> {
        let snapshot = self.tx.take().ok_or(StoreError::NoTransaction)?;
        self.nodes = snapshot.nodes;
        self.node_order = snapshot.node_order;
        self.edges = snapshot.edges;
        self.edge_order = snapshot.edge_order;
        self.outgoing = snapshot.outgoing;
        self.incoming = snapshot.incoming;
        self.id_seq = snapshot.id_seq;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}
