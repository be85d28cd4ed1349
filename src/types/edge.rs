use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Edge (relationship) in the graph
///
/// Represents a directed edge with:
/// - Unique identifier
/// - Edge type (e.g., "authored", "follows")
/// - Source and target node ids
/// - Properties (arbitrary JSON data)
///
/// Endpoint existence is enforced by the mutation layer, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    /// Unique identifier
    pub id: String,

    /// Edge type
    pub edge_type: String,

    /// Source node id
    pub from_id: String,

    /// Target node id
    pub to_id: String,

    /// Properties stored as a JSON object
    pub properties: JsonValue,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Create a new edge
    pub fn new(
        id: impl Into<String>,
        edge_type: impl Into<String>,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        properties: JsonValue,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type: edge_type.into(),
            from_id: from_id.into(),
            to_id: to_id.into(),
            properties,
            created_at: Utc::now(),
        }
    }

    /// Create an edge with an empty property map
    pub fn new_empty(
        id: impl Into<String>,
        edge_type: impl Into<String>,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            edge_type,
            from_id,
            to_id,
            JsonValue::Object(serde_json::Map::new()),
        )
    }

    /// Get a property value by key
    pub fn get_property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }

    /// Set a property value
    pub fn set_property(&mut self, key: impl Into<String>, value: JsonValue) {
        if let JsonValue::Object(ref mut map) = self.properties {
            map.insert(key.into(), value);
        }
    }

    /// Merge the given JSON object into the edge's properties
    pub fn merge_properties(&mut self, patch: &JsonValue) {
        if let (JsonValue::Object(map), JsonValue::Object(patch)) = (&mut self.properties, patch)
        {
            for (k, v) in patch {
                map.insert(k.clone(), v.clone());
            }
        }
    }

    /// Given one endpoint id, return the opposite endpoint id
    ///
    /// Returns `None` if `id` is neither endpoint.
    pub fn other_endpoint(&self, id: &str) -> Option<&str> {
        if self.from_id == id {
            Some(&self.to_id)
        } else if self.to_id == id {
            Some(&self.from_id)
        } else {
            None
        }
    }
}
