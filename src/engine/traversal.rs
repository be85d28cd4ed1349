/// Traversal and reachability walks over binding rows
///
/// Single hops walk the adjacency indices directly; variable-length bounds
/// are enforced by depth-bounded BFS with a node-id visited set (uniqueness:
/// nodes), which guarantees termination on cyclic graphs.

use super::eval::{adjacent_edges, eval_condition};
use super::{Binding, Row};
use crate::ast::{Cardinality, Direction, ReachableStep, TraversalStep};
use crate::store::GraphStore;
use crate::types::{Edge, GraphPath, Node};
use std::collections::{HashSet, VecDeque};

fn resolve_target(store: &GraphStore, edge: &Edge, src_id: &str, direction: Direction) -> Option<Node> {
    let target_id = match direction {
        Direction::Out => edge.to_id.as_str(),
        Direction::In => edge.from_id.as_str(),
        Direction::Both => edge.other_endpoint(src_id)?,
    };
    store.get_node(target_id)
}

fn label_matches(node: &Node, labels: &[String]) -> bool {
    labels.is_empty() || labels.iter().any(|l| *l == node.label)
}

fn edge_passes(store: &GraphStore, row: &Row, t: &TraversalStep, edge: &Edge) -> bool {
    match &t.spec.edge_where {
        None => true,
        Some(condition) => {
            let mut scoped = row.clone();
            scoped.insert(t.edge_alias.clone(), Binding::Edge(edge.clone()));
            eval_condition(store, &scoped, condition, &t.edge_alias)
        }
    }
}

/// Apply a traversal step to every row
pub(super) fn apply_traversal(
    store: &GraphStore,
    t: &TraversalStep,
    rows: Vec<Row>,
    force_optional: bool,
    path_alias: Option<&str>,
) -> Vec<Row> {
    let optional = force_optional || t.spec.cardinality == Cardinality::Optional;
    let mut out = Vec::new();

    for row in rows {
        let source = match row.get(&t.from_alias) {
            Some(Binding::Node(n)) => Some(n.clone()),
            _ => None,
        };

        let matches = match &source {
            Some(src) => match t.spec.variable_length {
                None => single_hop(store, &row, t, src),
                Some(range) => bounded_walk(store, &row, t, src, range.min, range.max),
            },
            None => Vec::new(),
        };

        if matches.is_empty() {
            if optional {
                let mut kept = row;
                kept.insert(t.edge_alias.clone(), Binding::Null);
                kept.insert(t.node_alias.clone(), Binding::Null);
                if let Some(p) = path_alias {
                    kept.insert(p.to_string(), Binding::Null);
                }
                out.push(kept);
            }
            continue;
        }

        for (edge_binding, node, path) in matches {
            let mut extended = row.clone();
            extended.insert(t.edge_alias.clone(), edge_binding);
            extended.insert(t.node_alias.clone(), Binding::Node(node));
            if let Some(p) = path_alias {
                extended.insert(p.to_string(), Binding::Path(path));
            }
            out.push(extended);
        }
    }
    out
}

fn single_hop(
    store: &GraphStore,
    row: &Row,
    t: &TraversalStep,
    src: &Node,
) -> Vec<(Binding, Node, GraphPath)> {
    let mut matches = Vec::new();
    for edge in adjacent_edges(store, &src.id, &t.spec.edge_types, t.spec.direction) {
        let Some(target) = resolve_target(store, &edge, &src.id, t.spec.direction) else {
            continue;
        };
        if !label_matches(&target, &t.spec.to_labels) {
            continue;
        }
        if !edge_passes(store, row, t, &edge) {
            continue;
        }
        let path = GraphPath::new(src.clone()).extend(edge.clone(), target.clone());
        matches.push((Binding::Edge(edge), target, path));
    }
    matches
}

/// Depth-bounded BFS; intermediate hops ignore the target-label filter,
/// which applies only to collected results. The edge alias binds Null for
/// variable-length matches (a single edge cannot represent the hop list).
fn bounded_walk(
    store: &GraphStore,
    row: &Row,
    t: &TraversalStep,
    src: &Node,
    min: u32,
    max: Option<u32>,
) -> Vec<(Binding, Node, GraphPath)> {
    let mut matches = Vec::new();
    let start_path = GraphPath::new(src.clone());
    if min == 0 && label_matches(src, &t.spec.to_labels) {
        matches.push((Binding::Null, src.clone(), start_path.clone()));
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(src.id.clone());
    let mut queue: VecDeque<(Node, u32, GraphPath)> = VecDeque::new();
    queue.push_back((src.clone(), 0, start_path));

    while let Some((node, depth, path)) = queue.pop_front() {
        if max.is_some_and(|m| depth >= m) {
            continue;
        }
        for edge in adjacent_edges(store, &node.id, &t.spec.edge_types, t.spec.direction) {
            let Some(target) = resolve_target(store, &edge, &node.id, t.spec.direction) else {
                continue;
            };
            if !visited.insert(target.id.clone()) {
                continue;
            }
            if !edge_passes(store, row, t, &edge) {
                continue;
            }
            let next_path = path.extend(edge, target.clone());
            let next_depth = depth + 1;
            if next_depth >= min && label_matches(&target, &t.spec.to_labels) {
                matches.push((Binding::Null, target.clone(), next_path.clone()));
            }
            queue.push_back((target, next_depth, next_path));
        }
    }
    matches
}

/// Apply a reachability step: transitive closure with direction and bounds,
/// results distinct by construction (node-id visited set)
pub(super) fn apply_reachable(
    store: &GraphStore,
    r: &ReachableStep,
    rows: Vec<Row>,
    path_alias: Option<&str>,
) -> Vec<Row> {
    let mut out = Vec::new();

    for row in rows {
        let source = match row.get(&r.from_alias) {
            Some(Binding::Node(n)) => Some(n.clone()),
            _ => None,
        };
        let Some(src) = source else {
            continue;
        };

        let mut reached: Vec<(Node, GraphPath)> = Vec::new();
        let start_path = GraphPath::new(src.clone());
        if r.min_hops == 0 {
            reached.push((src.clone(), start_path.clone()));
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(src.id.clone());
        let mut queue: VecDeque<(Node, u32, GraphPath)> = VecDeque::new();
        queue.push_back((src.clone(), 0, start_path));

        while let Some((node, depth, path)) = queue.pop_front() {
            if r.max_hops.is_some_and(|m| depth >= m) {
                continue;
            }
            for edge in adjacent_edges(store, &node.id, &r.edge_types, r.direction) {
                let Some(target) = resolve_target(store, &edge, &node.id, r.direction) else {
                    continue;
                };
                if !visited.insert(target.id.clone()) {
                    continue;
                }
                let next_path = path.extend(edge, target.clone());
                let next_depth = depth + 1;
                if next_depth >= r.min_hops {
                    reached.push((target.clone(), next_path.clone()));
                }
                queue.push_back((target, next_depth, next_path));
            }
        }

        for (node, path) in reached {
            let mut extended = row.clone();
            extended.insert(r.node_alias.clone(), Binding::Node(node));
            if let Some(p) = path_alias {
                extended.insert(p.to_string(), Binding::Path(path));
            }
            out.push(extended);
        }
    }
    out
}
