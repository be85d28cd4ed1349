/// Snapshot file export/import
///
/// Writes and reads the full store snapshot as JSON. This is the only
/// persistence the store offers.

use super::{GraphStore, StoreResult, StoreSnapshot};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Export options
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Pretty-print the JSON output
    pub pretty: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// Import statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub nodes: usize,
    pub edges: usize,
}

/// Write the full store snapshot to a JSON file
pub fn export_to_json<P: AsRef<Path>>(
    store: &GraphStore,
    path: P,
    options: &ExportOptions,
) -> StoreResult<ImportStats> {
    let snapshot = store.export();
    let stats = ImportStats {
        nodes: snapshot.nodes.len(),
        edges: snapshot.edges.len(),
    };

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    if options.pretty {
        serde_json::to_writer_pretty(writer, &snapshot)?;
    } else {
        serde_json::to_writer(writer, &snapshot)?;
    }
    tracing::debug!(nodes = stats.nodes, edges = stats.edges, "exported snapshot");
    Ok(stats)
}

/// Replace the store contents from a JSON snapshot file
pub fn import_from_json<P: AsRef<Path>>(
    store: &mut GraphStore,
    path: P,
) -> StoreResult<ImportStats> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let snapshot: StoreSnapshot = serde_json::from_reader(reader)?;
    let stats = ImportStats {
        nodes: snapshot.nodes.len(),
        edges: snapshot.edges.len(),
    };
    store.import(snapshot);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");

        let mut store = GraphStore::new();
        store.create_node("u1", "user", json!({"name": "Alice"})).unwrap();
        store.create_node("p1", "post", json!({"title": "hi"})).unwrap();
        store
            .create_edge("e1", "authored", "u1", "p1", json!({}))
            .unwrap();

        let exported = export_to_json(&store, &path, &ExportOptions::default()).unwrap();
        assert_eq!(exported, ImportStats { nodes: 2, edges: 1 });

        let mut restored = GraphStore::new();
        let imported = import_from_json(&mut restored, &path).unwrap();
        assert_eq!(imported, exported);
        assert_eq!(restored.export(), store.export());
    }

    #[test]
    fn test_import_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = GraphStore::new();
        let err = import_from_json(&mut store, dir.path().join("absent.json"));
        assert!(err.is_err());
    }
}
