use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Node in the graph
///
/// Represents a graph node with:
/// - Globally unique string id (a flat namespace shared across all labels)
/// - Label (type/class of the node)
/// - Properties (arbitrary JSON data)
/// - Creation and last-update timestamps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Unique identifier, unique across every label
    pub id: String,

    /// Node label (e.g., "user", "post")
    pub label: String,

    /// Properties stored as a JSON object
    pub properties: JsonValue,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with the current time as both timestamps
    pub fn new(id: impl Into<String>, label: impl Into<String>, properties: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            label: label.into(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a node with an empty property map
    pub fn new_empty(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, JsonValue::Object(serde_json::Map::new()))
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

    /// Merge the given JSON object into the node's properties
    ///
    /// Existing keys are overwritten; keys absent from `patch` are kept.
    pub fn merge_properties(&mut self, patch: &JsonValue) {
        if let (JsonValue::Object(map), JsonValue::Object(patch)) =
            (&mut self.properties, patch)
        {
            for (k, v) in patch {
                map.insert(k.clone(), v.clone());
            }
        }
    }

    /// Remove a property
    pub fn remove_property(&mut self, key: &str) -> Option<JsonValue> {
        if let JsonValue::Object(ref mut map) = self.properties {
            map.remove(key)
        } else {
            None
        }
    }

    /// Get all property keys
    pub fn property_keys(&self) -> Vec<String> {
        if let JsonValue::Object(map) = &self.properties {
            map.keys().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// Check if the node has a specific property
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.get(key).is_some()
    }

    /// Convert properties to a HashMap
    pub fn properties_as_map(&self) -> HashMap<String, JsonValue> {
        if let JsonValue::Object(map) = &self.properties {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        } else {
            HashMap::new()
        }
    }
}
