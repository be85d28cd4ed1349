/// Condition evaluation against binding rows
///
/// Mirrors the comparison semantics the Cypher backend exposes: numeric
/// comparisons coerce integer/float, string predicates are case-sensitive,
/// and a condition over a Null binding is false.

use super::{Binding, Row};
use crate::ast::{CompareOp, Condition, Direction};
use crate::store::GraphStore;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Evaluate a condition for one row; `default_target` resolves conditions
/// that name no alias
pub(super) fn eval_condition(
    store: &GraphStore,
    row: &Row,
    condition: &Condition,
    default_target: &str,
) -> bool {
    match condition {
        Condition::Compare {
            alias,
            property,
            op,
            value,
        } => {
            let target = alias.as_deref().unwrap_or(default_target);
            match row.get(target) {
                Some(binding) => match binding_property(binding, property) {
                    Some(actual) => compare_values(*op, &actual, value),
                    None => false,
                },
                None => false,
            }
        }
        Condition::And { conditions } => conditions
            .iter()
            .all(|c| eval_condition(store, row, c, default_target)),
        Condition::Or { conditions } => conditions
            .iter()
            .any(|c| eval_condition(store, row, c, default_target)),
        Condition::Not { conditions } => {
            // invalid arity never reaches a valid compiled plan
            conditions.len() == 1 && !eval_condition(store, row, &conditions[0], default_target)
        }
        Condition::EdgeExists {
            alias,
            edge_types,
            direction,
        } => {
            let target = alias.as_deref().unwrap_or(default_target);
            match node_id_of(row, target) {
                Some(id) => !adjacent_edges(store, &id, edge_types, *direction).is_empty(),
                None => false,
            }
        }
        Condition::ConnectedTo {
            alias,
            edge_type,
            direction,
            node_id,
        } => {
            let target = alias.as_deref().unwrap_or(default_target);
            match node_id_of(row, target) {
                Some(id) => {
                    adjacent_edges(store, &id, std::slice::from_ref(edge_type), *direction)
                        .iter()
                        .any(|e| e.other_endpoint(&id) == Some(node_id.as_str()))
                }
                None => false,
            }
        }
    }
}

fn node_id_of(row: &Row, alias: &str) -> Option<String> {
    match row.get(alias) {
        Some(Binding::Node(n)) => Some(n.id.clone()),
        _ => None,
    }
}

/// Adjacent edges of a node filtered by type set and direction, preserving
/// insertion order (outgoing before incoming for `Both`)
pub(super) fn adjacent_edges(
    store: &GraphStore,
    id: &str,
    edge_types: &[String],
    direction: Direction,
) -> Vec<crate::types::Edge> {
    let type_of = |t: &str| edge_types.is_empty() || edge_types.iter().any(|e| e == t);
    let mut edges = Vec::new();
    if matches!(direction, Direction::Out | Direction::Both) {
        edges.extend(
            store
                .get_outgoing_edges(id, None)
                .into_iter()
                .filter(|e| type_of(&e.edge_type)),
        );
    }
    if matches!(direction, Direction::In | Direction::Both) {
        edges.extend(
            store
                .get_incoming_edges(id, None)
                .into_iter()
                .filter(|e| type_of(&e.edge_type)),
        );
    }
    edges
}

/// A binding's property, with `id`, `label` and `type` resolving to the
/// element's identity fields
pub(super) fn binding_property(binding: &Binding, property: &str) -> Option<JsonValue> {
    match binding {
        Binding::Node(n) => match property {
            "id" => Some(JsonValue::String(n.id.clone())),
            "label" => Some(JsonValue::String(n.label.clone())),
            _ => n.get_property(property).cloned(),
        },
        Binding::Edge(e) => match property {
            "id" => Some(JsonValue::String(e.id.clone())),
            "type" => Some(JsonValue::String(e.edge_type.clone())),
            _ => e.get_property(property).cloned(),
        },
        Binding::Scalar(v) => {
            if property.is_empty() {
                Some(v.clone())
            } else {
                v.get(property).cloned()
            }
        }
        _ => None,
    }
}

pub(super) fn compare_values(op: CompareOp, actual: &JsonValue, expected: &JsonValue) -> bool {
    match op {
        CompareOp::Eq => loose_eq(actual, expected),
        CompareOp::Ne => !loose_eq(actual, expected),
        CompareOp::Lt => cmp_json(actual, expected) == Some(Ordering::Less),
        CompareOp::Lte => matches!(
            cmp_json(actual, expected),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        CompareOp::Gt => cmp_json(actual, expected) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(
            cmp_json(actual, expected),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        CompareOp::In => match expected {
            JsonValue::Array(items) => items.iter().any(|v| loose_eq(actual, v)),
            _ => false,
        },
        CompareOp::Contains => match (actual, expected) {
            (JsonValue::String(a), JsonValue::String(e)) => a.contains(e.as_str()),
            (JsonValue::Array(items), e) => items.iter().any(|v| loose_eq(v, e)),
            _ => false,
        },
        CompareOp::StartsWith => match (actual, expected) {
            (JsonValue::String(a), JsonValue::String(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        CompareOp::EndsWith => match (actual, expected) {
            (JsonValue::String(a), JsonValue::String(e)) => a.ends_with(e.as_str()),
            _ => false,
        },
    }
}

/// Equality with integer/float coercion (1 == 1.0)
fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Total-enough ordering for filters and ORDER BY: numbers before strings,
/// same-type values compare naturally
pub(super) fn cmp_json(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(_), JsonValue::Number(_)) => {
            a.as_f64().partial_cmp(&b.as_f64())
        }
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => Some(type_rank(a).cmp(&type_rank(b))),
    }
}

fn type_rank(v: &JsonValue) -> u8 {
    match v {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}
