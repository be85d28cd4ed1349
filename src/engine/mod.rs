/// In-memory query engine
///
/// Interprets the same query plan the Cypher compiler consumes — a second,
/// independently implemented backend whose observable semantics must match
/// the compiled backend exactly. The public surface is async to keep one
/// caller contract across backends; every method completes synchronously.

mod eval;
pub mod hierarchy;
mod traversal;

pub use hierarchy::SubtreeNode;

use crate::ast::{
    AggregateFn, AstError, BranchStep, HierarchyOp, HierarchyStep, Projection, QueryAst,
    ResultType, SetOperator, Step,
};
use crate::store::{GraphStore, StoreError};
use crate::types::{Edge, GraphPath, Node};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Engine-level domain errors
///
/// Fail-fast, never retried; they carry the offending id/operator so callers
/// can branch on error kind. Network-transport faults live in the driver
/// error type, never here.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Update/delete on a missing node id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Update/delete by endpoints with no matching edge
    #[error("No matching edge from {from_id} to {to_id}")]
    EdgeNotFound {
        from_id: String,
        to_id: String,
        edge_type: Option<String>,
    },

    /// A hierarchy move that would make a node its own ancestor
    #[error("Moving {node_id} under {new_parent_id} would create a cycle")]
    CycleDetected {
        node_id: String,
        new_parent_id: String,
    },

    /// The plan cannot be interpreted
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Ast(#[from] AstError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A value bound to an alias during interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Node(Node),
    Edge(Edge),
    Path(GraphPath),
    Scalar(JsonValue),
    Null,
}

/// One row of alias bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    bindings: HashMap<String, Binding>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias: &str) -> Option<&Binding> {
        self.bindings.get(alias)
    }

    pub fn insert(&mut self, alias: String, binding: Binding) {
        self.bindings.insert(alias, binding);
    }
}

/// Shaped query result; the Single/Optional/Many distinction is a value the
/// caller matches on instead of a type-level trick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryOutput {
    /// Single/optional node
    Node { node: Option<Node> },
    /// Node collection
    Nodes { nodes: Vec<Node> },
    /// Named-column records (multiNode, fields, depth-tagged)
    Records { records: Vec<HashMap<String, JsonValue>> },
    Count { count: u64 },
    Exists { exists: bool },
    /// Aggregated scalar
    Scalar { value: JsonValue },
    Paths { paths: Vec<GraphPath> },
}

/// The in-memory backend
///
/// The store handle is shared, not owned: callers inject the store they
/// also mutate through the command protocol.
#[derive(Clone)]
pub struct MemoryEngine {
    store: Arc<RwLock<GraphStore>>,
}

impl MemoryEngine {
    pub fn new(store: Arc<RwLock<GraphStore>>) -> Self {
        Self { store }
    }

    /// Build an engine over a fresh empty store
    pub fn with_empty_store() -> Self {
        Self::new(Arc::new(RwLock::new(GraphStore::new())))
    }

    pub fn store(&self) -> Arc<RwLock<GraphStore>> {
        Arc::clone(&self.store)
    }

    /// Execute a query plan
    ///
    /// Async is a formality here: the work is already complete when the
    /// future resolves, keeping the caller contract uniform across backends.
    pub async fn execute(&self, ast: &QueryAst) -> EngineResult<QueryOutput> {
        self.execute_sync(ast)
    }

    pub fn execute_sync(&self, ast: &QueryAst) -> EngineResult<QueryOutput> {
        ast.validate()?;
        let store = self.store.read();
        let mut executor = Executor::new(&store);
        let rows = executor.run_steps(&ast.steps(), vec![Row::new()])?;
        executor.finalize(ast, rows)
    }

    // ---- hierarchy mutations (consumed by the mutation layer) --------

    /// Whether relinking `node_id` under `new_parent_id` would create a cycle
    pub async fn would_create_cycle(
        &self,
        edge_type: &str,
        node_id: &str,
        new_parent_id: &str,
    ) -> bool {
        let store = self.store.read();
        hierarchy::would_create_cycle(&store, edge_type, node_id, new_parent_id)
    }

    /// Subtree of `root_id`, depth-ascending with the root first
    pub async fn get_subtree(
        &self,
        root_id: &str,
        edge_type: &str,
        max_depth: Option<u32>,
    ) -> Vec<SubtreeNode> {
        let store = self.store.read();
        hierarchy::subtree(&store, root_id, edge_type, max_depth)
    }

    /// Re-parent a node, cycle-checking before any relinking
    ///
    /// Existing hierarchy edges of the node are all removed (parallel edges
    /// included) before the new link is created.
    pub async fn move_node(
        &self,
        node_id: &str,
        new_parent_id: &str,
        edge_type: &str,
    ) -> EngineResult<Edge> {
        let mut store = self.store.write();
        if !store.node_exists(node_id) {
            return Err(EngineError::NotFound(node_id.to_string()));
        }
        if !store.node_exists(new_parent_id) {
            return Err(EngineError::NotFound(new_parent_id.to_string()));
        }
        if hierarchy::would_create_cycle(&store, edge_type, node_id, new_parent_id) {
            return Err(EngineError::CycleDetected {
                node_id: node_id.to_string(),
                new_parent_id: new_parent_id.to_string(),
            });
        }

        let old_parents: Vec<String> = store
            .get_outgoing_edges(node_id, Some(edge_type))
            .into_iter()
            .map(|e| e.to_id)
            .collect();
        for parent in old_parents {
            store.delete_edges_between(node_id, &parent, Some(edge_type));
        }

        let id = store.allocate_id("edge");
        let edge = store.create_edge(id, edge_type, node_id, new_parent_id, json!({}))?;
        tracing::debug!(node = %node_id, parent = %new_parent_id, "moved node");
        Ok(edge)
    }

    /// Delete a subtree, cascading children before the root; returns the
    /// number of removed nodes
    pub async fn delete_subtree(&self, root_id: &str, edge_type: &str) -> EngineResult<usize> {
        let mut store = self.store.write();
        if !store.node_exists(root_id) {
            return Err(EngineError::NotFound(root_id.to_string()));
        }
        let entries = hierarchy::subtree(&store, root_id, edge_type, None);
        for entry in entries.iter().rev() {
            store.delete_node(&entry.node.id, true)?;
        }
        tracing::debug!(root = %root_id, removed = entries.len(), "deleted subtree");
        Ok(entries.len())
    }

    /// Clone a subtree under a new root id
    ///
    /// Nodes are created root-first (the subtree enumeration is
    /// depth-ascending), so the id-remap table always resolves a clone's
    /// parent. Only edges with both endpoints inside the remap table are
    /// re-created. Returns old-id -> new-id.
    pub async fn clone_subtree(
        &self,
        root_id: &str,
        new_root_id: &str,
        edge_type: &str,
    ) -> EngineResult<HashMap<String, String>> {
        let mut store = self.store.write();
        if !store.node_exists(root_id) {
            return Err(EngineError::NotFound(root_id.to_string()));
        }

        let entries = hierarchy::subtree(&store, root_id, edge_type, None);
        let mut remap: HashMap<String, String> = HashMap::new();

        for entry in &entries {
            let new_id = if entry.node.id == root_id {
                new_root_id.to_string()
            } else {
                store.allocate_id(&entry.node.id)
            };
            store.create_node(new_id.clone(), entry.node.label.clone(), entry.node.properties.clone())?;
            remap.insert(entry.node.id.clone(), new_id);
        }

        // only edges internal to the subtree are carried over
        for entry in &entries {
            for edge in store.get_outgoing_edges(&entry.node.id, None) {
                let (Some(new_from), Some(new_to)) =
                    (remap.get(&edge.from_id), remap.get(&edge.to_id))
                else {
                    continue;
                };
                let (new_from, new_to) = (new_from.clone(), new_to.clone());
                let id = store.allocate_id("edge");
                store.create_edge(id, edge.edge_type.clone(), new_from, new_to, edge.properties.clone())?;
            }
        }

        tracing::debug!(root = %root_id, new_root = %new_root_id, cloned = remap.len(), "cloned subtree");
        Ok(remap)
    }
}

/// Step interpreter over binding rows
struct Executor<'a> {
    store: &'a GraphStore,
    order_by: Vec<crate::ast::OrderByItem>,
    limit: Option<u64>,
    skip: Option<u64>,
    distinct: bool,
    force_distinct: bool,
    force_optional: bool,
    pending_path: Option<String>,
}

impl<'a> Executor<'a> {
    fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            order_by: Vec::new(),
            limit: None,
            skip: None,
            distinct: false,
            force_distinct: false,
            force_optional: false,
            pending_path: None,
        }
    }

    fn run_steps(&mut self, steps: &[Step], mut rows: Vec<Row>) -> EngineResult<Vec<Row>> {
        for step in steps {
            rows = match step {
                Step::Match { alias, label } => {
                    let nodes = self.store.nodes_by_label(label);
                    cross_bind(rows, alias, nodes)
                }
                Step::MatchById { alias, id } => {
                    let nodes = self.store.get_node(id).into_iter().collect();
                    cross_bind(rows, alias, nodes)
                }
                Step::Traversal(t) => {
                    let path = self.pending_path.take();
                    traversal::apply_traversal(
                        self.store,
                        t,
                        rows,
                        self.force_optional,
                        path.as_deref(),
                    )
                }
                Step::Reachable(r) => {
                    let path = self.pending_path.take();
                    self.force_distinct = true;
                    traversal::apply_reachable(self.store, r, rows, path.as_deref())
                }
                Step::Where(w) => {
                    let store = self.store;
                    rows.into_iter()
                        .filter(|row| eval::eval_condition(store, row, &w.condition, &w.target))
                        .collect()
                }
                Step::Hierarchy(h) => self.apply_hierarchy(h, rows),
                Step::Branch(b) => self.apply_branch(b, rows)?,
                Step::Fork(f) => {
                    let saved = self.force_optional;
                    self.force_optional = true;
                    let mut current = rows;
                    for branch in &f.branches {
                        current = self.run_steps(&branch.steps, current)?;
                    }
                    self.force_optional = saved;
                    current
                }
                Step::OrderBy { items } => {
                    self.order_by.extend(items.iter().cloned());
                    rows
                }
                Step::Limit { count } => {
                    self.limit = Some(*count);
                    rows
                }
                Step::Skip { count } => {
                    self.skip = Some(*count);
                    rows
                }
                Step::Distinct => {
                    self.distinct = true;
                    rows
                }
                Step::Path { alias } => {
                    self.pending_path = Some(alias.clone());
                    rows
                }
                Step::Aggregate(_) | Step::UserAlias { .. } => rows,
            };
        }
        Ok(rows)
    }

    fn apply_hierarchy(&self, h: &HierarchyStep, rows: Vec<Row>) -> Vec<Row> {
        let mut out = Vec::new();
        for row in rows {
            let Some(Binding::Node(src)) = row.get(&h.from_alias) else {
                continue;
            };
            let src_id = src.id.clone();

            let results: Vec<(Node, u32)> = match h.op {
                HierarchyOp::Parent => hierarchy::parent_of(self.store, &src_id, &h.edge_type)
                    .map(|n| vec![(n, 1)])
                    .unwrap_or_default(),
                HierarchyOp::Children => {
                    hierarchy::children_of(self.store, &src_id, &h.edge_type)
                        .into_iter()
                        .map(|n| (n, 1))
                        .collect()
                }
                HierarchyOp::Ancestors => hierarchy::ancestors_of(
                    self.store,
                    &src_id,
                    &h.edge_type,
                    h.max_depth,
                    h.include_self,
                ),
                HierarchyOp::Descendants => hierarchy::descendants_of(
                    self.store,
                    &src_id,
                    &h.edge_type,
                    h.max_depth,
                    h.include_self,
                ),
                HierarchyOp::Siblings => hierarchy::siblings_of(self.store, &src_id, &h.edge_type)
                    .into_iter()
                    .map(|n| (n, 2))
                    .collect(),
                HierarchyOp::Root => hierarchy::root_of(self.store, &src_id, &h.edge_type)
                    .map(|n| vec![(n, 0)])
                    .unwrap_or_default(),
            };

            for (node, depth) in results {
                let mut extended = row.clone();
                extended.insert(h.node_alias.clone(), Binding::Node(node));
                if let Some(depth_alias) = &h.depth_alias {
                    extended.insert(depth_alias.clone(), Binding::Scalar(json!(depth)));
                }
                out.push(extended);
            }
        }
        out
    }

    fn apply_branch(&self, b: &BranchStep, rows: Vec<Row>) -> EngineResult<Vec<Row>> {
        let mut arm_results: Vec<Vec<Node>> = Vec::with_capacity(b.branches.len());
        for arm in &b.branches {
            let mut sub = Executor::new(self.store);
            let arm_rows = sub.run_steps(&arm.steps, vec![Row::new()])?;
            let nodes: Vec<Node> = arm_rows
                .iter()
                .filter_map(|r| match r.get(&arm.terminal_alias) {
                    Some(Binding::Node(n)) => Some(n.clone()),
                    _ => None,
                })
                .collect();
            arm_results.push(nodes);
        }

        let merged: Vec<Node> = match b.operator {
            SetOperator::Union => {
                let mut merged = Vec::new();
                let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
                for nodes in arm_results {
                    for node in nodes {
                        if b.distinct && !seen.insert(node.id.clone()) {
                            continue;
                        }
                        merged.push(node);
                    }
                }
                merged
            }
            SetOperator::Intersect => {
                if arm_results.len() < 2 {
                    return Err(EngineError::InvalidPlan(format!(
                        "intersect requires at least 2 branches, got {}",
                        arm_results.len()
                    )));
                }
                let (first, rest) = arm_results.split_first().expect("len checked");
                first
                    .iter()
                    .filter(|node| {
                        rest.iter()
                            .all(|arm| arm.iter().any(|n| n.id == node.id))
                    })
                    .cloned()
                    .collect()
            }
        };

        Ok(cross_bind(rows, &b.result_alias, merged))
    }

    fn finalize(&mut self, ast: &QueryAst, mut rows: Vec<Row>) -> EngineResult<QueryOutput> {
        let projection = ast.projection().clone();
        let current = ast.current_alias().map(str::to_string);

        // DISTINCT applies to the projected binding before ordering
        if self.distinct || self.force_distinct {
            if let Some(alias) = projection_primary_alias(&projection).or(current.as_deref()) {
                let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
                rows.retain(|row| {
                    let key = match row.get(alias) {
                        Some(Binding::Node(n)) => format!("n:{}", n.id),
                        Some(Binding::Edge(e)) => format!("e:{}", e.id),
                        _ => "null".to_string(),
                    };
                    seen.insert(key)
                });
            }
        }

        if !self.order_by.is_empty() {
            let items = self.order_by.clone();
            rows.sort_by(|a, b| {
                for item in &items {
                    let left = a
                        .get(&item.target)
                        .and_then(|bind| eval::binding_property(bind, &item.property))
                        .unwrap_or(JsonValue::Null);
                    let right = b
                        .get(&item.target)
                        .and_then(|bind| eval::binding_property(bind, &item.property))
                        .unwrap_or(JsonValue::Null);
                    let ord = eval::cmp_json(&left, &right).unwrap_or(std::cmp::Ordering::Equal);
                    let ord = if item.ascending { ord } else { ord.reverse() };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        if let Some(skip) = self.skip {
            rows = rows.into_iter().skip(skip as usize).collect();
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit as usize);
        }

        self.project(ast, &projection, current.as_deref(), rows)
    }

    fn project(
        &self,
        ast: &QueryAst,
        projection: &Projection,
        current: Option<&str>,
        rows: Vec<Row>,
    ) -> EngineResult<QueryOutput> {
        match projection {
            Projection::Count => {
                let count = match current {
                    Some(alias) => rows
                        .iter()
                        .filter(|r| matches!(r.get(alias), Some(Binding::Node(_))))
                        .count(),
                    None => rows.len(),
                };
                Ok(QueryOutput::Count { count: count as u64 })
            }
            Projection::Exists => {
                let exists = match current {
                    Some(alias) => rows
                        .iter()
                        .any(|r| matches!(r.get(alias), Some(Binding::Node(_)))),
                    None => !rows.is_empty(),
                };
                Ok(QueryOutput::Exists { exists })
            }
            Projection::Aggregate {
                function,
                alias,
                property,
                ..
            } => Ok(QueryOutput::Scalar {
                value: aggregate_rows(&rows, alias, *function, property.as_deref()),
            }),
            Projection::MultiNode { aliases, collect } => {
                let user_map = ast.registry().user_alias_map();
                let resolve = |user: &String| -> EngineResult<(String, String)> {
                    user_map
                        .get(user)
                        .map(|internal| (user.clone(), internal.clone()))
                        .ok_or_else(|| AstError::UnknownUserAlias { name: user.clone() }.into())
                };
                let plain: Vec<(String, String)> =
                    aliases.iter().map(resolve).collect::<EngineResult<_>>()?;
                let collected: Vec<(String, String)> =
                    collect.iter().map(resolve).collect::<EngineResult<_>>()?;
                Ok(QueryOutput::Records {
                    records: group_records(&rows, &plain, &collected),
                })
            }
            Projection::Fields { alias, fields } => {
                let records = rows
                    .iter()
                    .map(|row| {
                        fields
                            .iter()
                            .map(|f| {
                                let value = row
                                    .get(alias)
                                    .and_then(|b| eval::binding_property(b, f))
                                    .unwrap_or(JsonValue::Null);
                                (f.clone(), value)
                            })
                            .collect()
                    })
                    .collect();
                Ok(QueryOutput::Records { records })
            }
            Projection::WithDepth { alias, depth_alias } => {
                let records = rows
                    .iter()
                    .filter_map(|row| {
                        let node = match row.get(alias) {
                            Some(Binding::Node(n)) => serde_json::to_value(n).ok()?,
                            _ => return None,
                        };
                        let depth = match row.get(depth_alias) {
                            Some(Binding::Scalar(v)) => v.clone(),
                            _ => JsonValue::Null,
                        };
                        let mut record = HashMap::new();
                        record.insert("node".to_string(), node);
                        record.insert(depth_alias.clone(), depth);
                        Some(record)
                    })
                    .collect();
                Ok(QueryOutput::Records { records })
            }
            Projection::Path { alias } => {
                let paths = rows
                    .iter()
                    .filter_map(|row| match row.get(alias) {
                        Some(Binding::Path(p)) => Some(p.clone()),
                        _ => None,
                    })
                    .collect();
                Ok(QueryOutput::Paths { paths })
            }
            Projection::Single { alias } => Ok(QueryOutput::Node {
                node: first_node(&rows, alias),
            }),
            Projection::Collection { alias } => Ok(QueryOutput::Nodes {
                nodes: all_nodes(&rows, alias),
            }),
            Projection::Default => {
                let alias = current.ok_or_else(|| {
                    EngineError::InvalidPlan("plan has no current node to return".to_string())
                })?;
                match crate::compiler::default_result_type(&ast.steps()) {
                    ResultType::Single => Ok(QueryOutput::Node {
                        node: first_node(&rows, alias),
                    }),
                    _ => Ok(QueryOutput::Nodes {
                        nodes: all_nodes(&rows, alias),
                    }),
                }
            }
        }
    }
}

fn cross_bind(rows: Vec<Row>, alias: &str, nodes: Vec<Node>) -> Vec<Row> {
    let mut out = Vec::with_capacity(rows.len() * nodes.len().max(1));
    for row in rows {
        for node in &nodes {
            let mut extended = row.clone();
            extended.insert(alias.to_string(), Binding::Node(node.clone()));
            out.push(extended);
        }
    }
    out
}

fn first_node(rows: &[Row], alias: &str) -> Option<Node> {
    rows.iter().find_map(|r| match r.get(alias) {
        Some(Binding::Node(n)) => Some(n.clone()),
        _ => None,
    })
}

fn all_nodes(rows: &[Row], alias: &str) -> Vec<Node> {
    rows.iter()
        .filter_map(|r| match r.get(alias) {
            Some(Binding::Node(n)) => Some(n.clone()),
            _ => None,
        })
        .collect()
}

fn projection_primary_alias(projection: &Projection) -> Option<&str> {
    match projection {
        Projection::Single { alias }
        | Projection::Collection { alias }
        | Projection::Fields { alias, .. }
        | Projection::WithDepth { alias, .. } => Some(alias),
        _ => None,
    }
}

fn aggregate_rows(
    rows: &[Row],
    alias: &str,
    function: AggregateFn,
    property: Option<&str>,
) -> JsonValue {
    let values: Vec<JsonValue> = rows
        .iter()
        .filter_map(|row| {
            let binding = row.get(alias)?;
            match property {
                Some(p) => eval::binding_property(binding, p),
                None => match binding {
                    Binding::Node(n) => serde_json::to_value(n).ok(),
                    Binding::Edge(e) => serde_json::to_value(e).ok(),
                    Binding::Scalar(v) => Some(v.clone()),
                    _ => None,
                },
            }
        })
        .collect();

    match function {
        AggregateFn::Count => json!(values.len()),
        AggregateFn::Collect => JsonValue::Array(values),
        AggregateFn::Sum => {
            let sum: f64 = values.iter().filter_map(JsonValue::as_f64).sum();
            json!(sum)
        }
        AggregateFn::Avg => {
            let nums: Vec<f64> = values.iter().filter_map(JsonValue::as_f64).collect();
            if nums.is_empty() {
                JsonValue::Null
            } else {
                json!(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateFn::Min => values
            .into_iter()
            .min_by(|a, b| eval::cmp_json(a, b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(JsonValue::Null),
        AggregateFn::Max => values
            .into_iter()
            .max_by(|a, b| eval::cmp_json(a, b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(JsonValue::Null),
    }
}

/// Group rows for the multiNode projection: one record per distinct
/// combination of plain aliases, collect aliases gathered into arrays
fn group_records(
    rows: &[Row],
    plain: &[(String, String)],
    collected: &[(String, String)],
) -> Vec<HashMap<String, JsonValue>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, HashMap<String, JsonValue>> = HashMap::new();

    for row in rows {
        let key: String = plain
            .iter()
            .map(|(_, internal)| match row.get(internal) {
                Some(Binding::Node(n)) => n.id.clone(),
                _ => String::from("\u{0}"),
            })
            .collect::<Vec<_>>()
            .join("|");

        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            let mut record = HashMap::new();
            for (user, internal) in plain {
                let value = match row.get(internal) {
                    Some(Binding::Node(n)) => serde_json::to_value(n).unwrap_or(JsonValue::Null),
                    _ => JsonValue::Null,
                };
                record.insert(user.clone(), value);
            }
            for (user, _) in collected {
                record.insert(user.clone(), JsonValue::Array(Vec::new()));
            }
            record
        });

        for (user, internal) in collected {
            if let Some(Binding::Node(n)) = row.get(internal) {
                if let Some(JsonValue::Array(items)) = entry.get_mut(user) {
                    items.push(serde_json::to_value(n).unwrap_or(JsonValue::Null));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}
