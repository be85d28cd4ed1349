/// Immutable query-plan builder
///
/// Every builder method returns a new [`QueryAst`] value; a prior reference
/// stays valid and independently compilable. Instead of copying the whole
/// step list on every call, plans share an append-only step arena and each
/// `QueryAst` is a (arena, length) cursor into it: appending extends the
/// arena in place when the cursor sits at the arena tip, and copies the
/// prefix into a fresh arena only when the cursor has been forked. A cursor
/// never observes steps appended after its snapshot.

use super::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Plan-construction errors
#[derive(Error, Debug, PartialEq)]
pub enum AstError {
    /// A step references an alias that is not registered earlier in the plan
    #[error("Unknown alias `{alias}` referenced at step {step_index}")]
    UnknownAlias { alias: String, step_index: usize },

    /// The operation needs a current node and none has been matched yet
    #[error("Operation `{operation}` requires a current node")]
    NoCurrentNode { operation: &'static str },

    /// A projection references a user alias that was never bound
    #[error("Unknown user alias `{name}`")]
    UnknownUserAlias { name: String },

    /// A user alias name was bound twice
    #[error("User alias `{name}` is already bound")]
    DuplicateUserAlias { name: String },

    /// A path capture is not followed by a traversal step
    #[error("Path capture `{alias}` is not followed by a traversal")]
    DanglingPathCapture { alias: String },
}

pub type AstResult<T> = Result<T, AstError>;

/// What kind of graph element an alias is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    Node,
    Edge,
    Path,
}

/// Registry entry for one internal alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasInfo {
    pub kind: AliasKind,
    /// Label (nodes) or edge type (edges) when statically known
    pub label: Option<String>,
    /// Caller-facing name, if bound
    pub user_alias: Option<String>,
    /// Index of the originating step in walk order
    pub step_index: usize,
}

/// Insertion-ordered alias registry
///
/// Aliases are unique and monotonically assigned (`n0,n1,…`, `e0,e1,…`,
/// `p0,p1,…`); iteration yields registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasRegistry {
    entries: Vec<(String, AliasInfo)>,
    index: HashMap<String, usize>,
}

impl AliasRegistry {
    pub fn insert(&mut self, alias: String, info: AliasInfo) {
        if let Some(&i) = self.index.get(&alias) {
            self.entries[i].1 = info;
        } else {
            self.index.insert(alias.clone(), self.entries.len());
            self.entries.push((alias, info));
        }
    }

    pub fn get(&self, alias: &str) -> Option<&AliasInfo> {
        self.index.get(alias).map(|&i| &self.entries[i].1)
    }

    fn get_mut(&mut self, alias: &str) -> Option<&mut AliasInfo> {
        let i = *self.index.get(alias)?;
        Some(&mut self.entries[i].1)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.index.contains_key(alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AliasInfo)> {
        self.entries.iter().map(|(a, i)| (a.as_str(), i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map caller-facing names to internal aliases
    pub fn user_alias_map(&self) -> HashMap<String, String> {
        self.iter()
            .filter(|(_, info)| info.kind != AliasKind::Edge)
            .filter_map(|(a, info)| {
                info.user_alias
                    .as_ref()
                    .map(|u| (u.clone(), a.to_string()))
            })
            .collect()
    }

    /// Map caller-facing edge names to internal edge aliases
    pub fn edge_user_alias_map(&self) -> HashMap<String, String> {
        self.iter()
            .filter(|(_, info)| info.kind == AliasKind::Edge)
            .filter_map(|(a, info)| {
                info.user_alias
                    .as_ref()
                    .map(|u| (u.clone(), a.to_string()))
            })
            .collect()
    }
}

/// Append-only shared step storage
#[derive(Debug, Default)]
struct StepArena {
    steps: Mutex<Vec<Step>>,
}

impl StepArena {
    fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps),
        }
    }
}

/// Debug/testing snapshot of a plan
#[derive(Debug, Clone, Serialize)]
pub struct AstSnapshot {
    pub steps: Vec<Step>,
    pub projection: Projection,
    pub aliases: BTreeMap<String, AliasInfo>,
    pub user_aliases: BTreeMap<String, String>,
    pub edge_user_aliases: BTreeMap<String, String>,
    pub current_alias: Option<String>,
    pub current_label: Option<String>,
}

/// Depth/self options for hierarchy steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyOptions {
    pub max_depth: Option<u32>,
    pub include_self: bool,
    pub depth_alias: Option<String>,
}

/// Builder closure for one fork branch; receives a sub-plan cursor whose
/// current node is the fork source and whose alias counters are offset past
/// every previously built branch
pub type ForkBranchFn = Box<dyn FnOnce(QueryAst) -> AstResult<QueryAst>>;

/// An immutable query plan under construction
#[derive(Debug, Clone)]
pub struct QueryAst {
    arena: Arc<StepArena>,
    len: usize,
    node_count: u32,
    edge_count: u32,
    path_count: u32,
    current_alias: Option<String>,
    current_label: Option<String>,
    projection: Projection,
}

impl Default for QueryAst {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryAst {
    /// Create an empty plan
    pub fn new() -> Self {
        Self {
            arena: Arc::new(StepArena::default()),
            len: 0,
            node_count: 0,
            edge_count: 0,
            path_count: 0,
            current_alias: None,
            current_label: None,
            projection: Projection::Default,
        }
    }

    /// Clone of this cursor's step prefix
    pub fn steps(&self) -> Vec<Step> {
        let steps = self.arena.steps.lock();
        steps[..self.len].to_vec()
    }

    /// The alias the next relative step operates on
    pub fn current_alias(&self) -> Option<&str> {
        self.current_alias.as_deref()
    }

    /// Label of the current node, when statically known
    pub fn current_label(&self) -> Option<&str> {
        self.current_label.as_deref()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Append a step, sharing the arena when this cursor is at its tip
    fn push(&self, step: Step) -> (Arc<StepArena>, usize) {
        let mut steps = self.arena.steps.lock();
        if steps.len() == self.len {
            steps.push(step);
            (Arc::clone(&self.arena), self.len + 1)
        } else {
            let mut copied = steps[..self.len].to_vec();
            copied.push(step);
            (Arc::new(StepArena::with_steps(copied)), self.len + 1)
        }
    }

    fn appended(&self, step: Step) -> Self {
        let (arena, len) = self.push(step);
        Self {
            arena,
            len,
            ..self.clone()
        }
    }

    fn next_node_alias(count: u32) -> String {
        format!("n{count}")
    }

    fn require_current(&self, operation: &'static str) -> AstResult<String> {
        self.current_alias
            .clone()
            .ok_or(AstError::NoCurrentNode { operation })
    }

    /// Match all nodes with `label`, binding them to a fresh node alias that
    /// becomes the current node
    pub fn match_node(&self, label: impl Into<String>) -> Self {
        let label = label.into();
        let alias = Self::next_node_alias(self.node_count);
        let mut ast = self.appended(Step::Match {
            alias: alias.clone(),
            label: label.clone(),
        });
        ast.node_count += 1;
        ast.current_alias = Some(alias);
        ast.current_label = Some(label);
        ast
    }

    /// Match the node with a specific id, binding it to a fresh node alias
    pub fn match_by_id(&self, id: impl Into<String>) -> Self {
        let alias = Self::next_node_alias(self.node_count);
        let mut ast = self.appended(Step::MatchById {
            alias: alias.clone(),
            id: id.into(),
        });
        ast.node_count += 1;
        ast.current_alias = Some(alias);
        ast.current_label = None;
        ast
    }

    /// Traverse from the current node, allocating a node alias and an edge
    /// alias and advancing the current node to the target
    pub fn traverse(&self, spec: TraversalSpec) -> AstResult<Self> {
        let from_alias = self.require_current("traverse")?;
        let node_alias = Self::next_node_alias(self.node_count);
        let edge_alias = format!("e{}", self.edge_count);
        let label = spec.to_labels.first().cloned();

        let mut ast = self.appended(Step::Traversal(TraversalStep {
            from_alias,
            node_alias: node_alias.clone(),
            edge_alias,
            spec,
        }));
        ast.node_count += 1;
        ast.edge_count += 1;
        ast.current_alias = Some(node_alias);
        ast.current_label = label;
        Ok(ast)
    }

    /// Append a filter step scoped to the current node
    pub fn filter(&self, condition: Condition) -> AstResult<Self> {
        let target = self.require_current("filter")?;
        Ok(self.appended(Step::Where(WhereStep { target, condition })))
    }

    /// Bind a caller-facing name to the current internal alias
    ///
    /// Required before the node can be named in a final projection.
    pub fn user_alias(&self, name: impl Into<String>) -> AstResult<Self> {
        let alias = self.require_current("user_alias")?;
        let name = name.into();
        if self.registry().user_alias_map().contains_key(&name) {
            return Err(AstError::DuplicateUserAlias { name });
        }
        Ok(self.appended(Step::UserAlias { alias, name }))
    }

    /// Hierarchy navigation with default options (unbounded, exclude self)
    pub fn hierarchy(&self, op: HierarchyOp, edge_type: impl Into<String>) -> AstResult<Self> {
        self.hierarchy_with(op, edge_type, HierarchyOptions::default())
    }

    /// Hierarchy navigation with explicit depth/self options
    pub fn hierarchy_with(
        &self,
        op: HierarchyOp,
        edge_type: impl Into<String>,
        options: HierarchyOptions,
    ) -> AstResult<Self> {
        let from_alias = self.require_current("hierarchy")?;
        let node_alias = Self::next_node_alias(self.node_count);

        let mut ast = self.appended(Step::Hierarchy(HierarchyStep {
            from_alias,
            node_alias: node_alias.clone(),
            edge_type: edge_type.into(),
            op,
            max_depth: options.max_depth,
            include_self: options.include_self,
            depth_alias: options.depth_alias,
        }));
        ast.node_count += 1;
        ast.current_alias = Some(node_alias);
        // the reached node keeps the source label within one hierarchy
        Ok(ast)
    }

    /// Transitive-closure reachability from the current node
    pub fn reachable(
        &self,
        edge_types: Vec<String>,
        direction: Direction,
        range: HopRange,
    ) -> AstResult<Self> {
        let from_alias = self.require_current("reachable")?;
        let node_alias = Self::next_node_alias(self.node_count);

        let mut ast = self.appended(Step::Reachable(ReachableStep {
            from_alias,
            node_alias: node_alias.clone(),
            edge_types,
            direction,
            min_hops: range.min,
            max_hops: range.max,
        }));
        ast.node_count += 1;
        ast.current_alias = Some(node_alias);
        ast.current_label = None;
        Ok(ast)
    }

    /// Combine independently built sub-plans with a set operator
    ///
    /// Each branch must end on a node alias. The merged result is bound to a
    /// fresh alias that becomes the current node.
    pub fn branch(
        &self,
        operator: SetOperator,
        branches: Vec<QueryAst>,
        distinct: bool,
    ) -> AstResult<Self> {
        let mut arms = Vec::with_capacity(branches.len());
        for arm in &branches {
            let terminal = arm.require_current("branch arm")?;
            arms.push(SubPlan {
                steps: arm.steps(),
                terminal_alias: terminal,
                alias_offset: 0,
            });
        }

        let result_alias = Self::next_node_alias(self.node_count);
        let mut ast = self.appended(Step::Branch(BranchStep {
            operator,
            branches: arms,
            distinct,
            result_alias: result_alias.clone(),
        }));
        ast.node_count += 1;
        ast.current_alias = Some(result_alias);
        ast.current_label = None;
        Ok(ast)
    }

    /// Fan out several continuations from the current node
    ///
    /// Each builder receives a sub-plan cursor whose current node is the fork
    /// source; alias counters are threaded through the branches so the merged
    /// registries never collide. The current node stays the fork source.
    pub fn fork(&self, builders: Vec<ForkBranchFn>) -> AstResult<Self> {
        let source_alias = self.require_current("fork")?;

        let mut node_count = self.node_count;
        let mut edge_count = self.edge_count;
        let mut path_count = self.path_count;
        let mut branches = Vec::with_capacity(builders.len());

        for build in builders {
            let alias_offset = node_count;
            let seed = QueryAst {
                arena: Arc::new(StepArena::default()),
                len: 0,
                node_count,
                edge_count,
                path_count,
                current_alias: Some(source_alias.clone()),
                current_label: self.current_label.clone(),
                projection: Projection::Default,
            };
            let built = build(seed)?;
            let terminal_alias = built.require_current("fork branch")?;
            branches.push(SubPlan {
                steps: built.steps(),
                terminal_alias,
                alias_offset,
            });
            node_count = built.node_count;
            edge_count = built.edge_count;
            path_count = built.path_count;
        }

        let mut ast = self.appended(Step::Fork(ForkStep {
            source_alias,
            branches,
        }));
        ast.node_count = node_count;
        ast.edge_count = edge_count;
        ast.path_count = path_count;
        Ok(ast)
    }

    /// Aggregate over the current node; also sets the aggregate projection
    pub fn aggregate(
        &self,
        function: AggregateFn,
        property: Option<String>,
        result_name: impl Into<String>,
    ) -> AstResult<Self> {
        let target = self.require_current("aggregate")?;
        let result_name = result_name.into();
        let mut ast = self.appended(Step::Aggregate(AggregateStep {
            function,
            target: target.clone(),
            property: property.clone(),
            result_name: result_name.clone(),
        }));
        ast.projection = Projection::Aggregate {
            function,
            alias: target,
            property,
            name: result_name,
        };
        Ok(ast)
    }

    /// Order results by a property of the current node
    pub fn order_by(&self, property: impl Into<String>, ascending: bool) -> AstResult<Self> {
        let target = self.require_current("order_by")?;
        Ok(self.appended(Step::OrderBy {
            items: vec![OrderByItem {
                target,
                property: property.into(),
                ascending,
            }],
        }))
    }

    pub fn limit(&self, count: u64) -> Self {
        self.appended(Step::Limit { count })
    }

    pub fn skip(&self, count: u64) -> Self {
        self.appended(Step::Skip { count })
    }

    pub fn distinct(&self) -> Self {
        self.appended(Step::Distinct)
    }

    /// Name the path walked by the next traversal or reachability step
    pub fn capture_path(&self) -> Self {
        let alias = format!("p{}", self.path_count);
        let mut ast = self.appended(Step::Path { alias });
        ast.path_count += 1;
        ast
    }

    // ---- projections -------------------------------------------------

    fn resolve_name(&self, name: &str) -> AstResult<String> {
        let registry = self.registry();
        if let Some(internal) = registry.user_alias_map().get(name) {
            return Ok(internal.clone());
        }
        if registry.contains(name) {
            return Ok(name.to_string());
        }
        Err(AstError::UnknownUserAlias {
            name: name.to_string(),
        })
    }

    /// Return exactly one / zero-or-one binding of the named alias
    pub fn project_single(&self, name: &str) -> AstResult<Self> {
        let alias = self.resolve_name(name)?;
        let mut ast = self.clone();
        ast.projection = Projection::Single { alias };
        Ok(ast)
    }

    /// Return all bindings of the named alias
    pub fn project_collection(&self, name: &str) -> AstResult<Self> {
        let alias = self.resolve_name(name)?;
        let mut ast = self.clone();
        ast.projection = Projection::Collection { alias };
        Ok(ast)
    }

    /// Return several user-aliased bindings side by side; `collect` names
    /// are gathered into arrays
    pub fn project_multi(&self, aliases: Vec<String>, collect: Vec<String>) -> AstResult<Self> {
        let user_map = self.registry().user_alias_map();
        for name in aliases.iter().chain(collect.iter()) {
            if !user_map.contains_key(name) {
                return Err(AstError::UnknownUserAlias { name: name.clone() });
            }
        }
        let mut ast = self.clone();
        ast.projection = Projection::MultiNode { aliases, collect };
        Ok(ast)
    }

    /// Return scalar property fields of the named alias
    pub fn project_fields(&self, name: &str, fields: Vec<String>) -> AstResult<Self> {
        let alias = self.resolve_name(name)?;
        let mut ast = self.clone();
        ast.projection = Projection::Fields { alias, fields };
        Ok(ast)
    }

    /// Return the number of matched rows
    pub fn project_count(&self) -> Self {
        let mut ast = self.clone();
        ast.projection = Projection::Count;
        ast
    }

    /// Return whether any row matched
    pub fn project_exists(&self) -> Self {
        let mut ast = self.clone();
        ast.projection = Projection::Exists;
        ast
    }

    /// Return the most recently captured path
    pub fn project_path(&self) -> AstResult<Self> {
        let alias = self
            .steps()
            .iter()
            .rev()
            .find_map(|s| match s {
                Step::Path { alias } => Some(alias.clone()),
                _ => None,
            })
            .ok_or(AstError::NoCurrentNode {
                operation: "project_path",
            })?;
        let mut ast = self.clone();
        ast.projection = Projection::Path { alias };
        Ok(ast)
    }

    /// Return nodes together with their captured depth binding
    pub fn project_with_depth(&self, name: &str, depth_alias: &str) -> AstResult<Self> {
        let alias = self.resolve_name(name)?;
        let mut ast = self.clone();
        ast.projection = Projection::WithDepth {
            alias,
            depth_alias: depth_alias.to_string(),
        };
        Ok(ast)
    }

    // ---- registry / validation ---------------------------------------

    /// Derive the alias registry by scanning the step prefix
    ///
    /// Fork-branch registries are merged into the parent; set-operation
    /// branches are independent sub-queries and contribute only their
    /// result alias.
    pub fn registry(&self) -> AliasRegistry {
        let mut registry = AliasRegistry::default();
        let mut walk = 0usize;
        collect_aliases(&self.steps(), &mut registry, &mut walk);
        registry
    }

    /// Debug/testing snapshot of the plan
    pub fn snapshot(&self) -> AstSnapshot {
        let registry = self.registry();
        AstSnapshot {
            steps: self.steps(),
            projection: self.projection.clone(),
            aliases: registry
                .iter()
                .map(|(a, i)| (a.to_string(), i.clone()))
                .collect(),
            user_aliases: registry.user_alias_map().into_iter().collect(),
            edge_user_aliases: registry.edge_user_alias_map().into_iter().collect(),
            current_alias: self.current_alias.clone(),
            current_label: self.current_label.clone(),
        }
    }

    /// Check that every alias reference points at an alias registered
    /// earlier in the sequence; must run before compilation
    pub fn validate(&self) -> AstResult<()> {
        let mut registry = AliasRegistry::default();
        let mut walk = 0usize;
        validate_steps(&self.steps(), &mut registry, &mut walk)
    }
}

fn register_step_aliases(step: &Step, registry: &mut AliasRegistry, index: usize) {
    match step {
        Step::Match { alias, label } => registry.insert(
            alias.clone(),
            AliasInfo {
                kind: AliasKind::Node,
                label: Some(label.clone()),
                user_alias: None,
                step_index: index,
            },
        ),
        Step::MatchById { alias, .. } => registry.insert(
            alias.clone(),
            AliasInfo {
                kind: AliasKind::Node,
                label: None,
                user_alias: None,
                step_index: index,
            },
        ),
        Step::Traversal(t) => {
            registry.insert(
                t.node_alias.clone(),
                AliasInfo {
                    kind: AliasKind::Node,
                    label: t.spec.to_labels.first().cloned(),
                    user_alias: None,
                    step_index: index,
                },
            );
            registry.insert(
                t.edge_alias.clone(),
                AliasInfo {
                    kind: AliasKind::Edge,
                    label: t.spec.edge_types.first().cloned(),
                    user_alias: t.spec.edge_user_alias.clone(),
                    step_index: index,
                },
            );
        }
        Step::Hierarchy(h) => registry.insert(
            h.node_alias.clone(),
            AliasInfo {
                kind: AliasKind::Node,
                label: None,
                user_alias: None,
                step_index: index,
            },
        ),
        Step::Reachable(r) => registry.insert(
            r.node_alias.clone(),
            AliasInfo {
                kind: AliasKind::Node,
                label: None,
                user_alias: None,
                step_index: index,
            },
        ),
        Step::Branch(b) => registry.insert(
            b.result_alias.clone(),
            AliasInfo {
                kind: AliasKind::Node,
                label: None,
                user_alias: None,
                step_index: index,
            },
        ),
        Step::UserAlias { alias, name } => {
            if let Some(info) = registry.get_mut(alias) {
                info.user_alias = Some(name.clone());
            }
        }
        Step::Path { alias } => registry.insert(
            alias.clone(),
            AliasInfo {
                kind: AliasKind::Path,
                label: None,
                user_alias: None,
                step_index: index,
            },
        ),
        _ => {}
    }
}

fn collect_aliases(steps: &[Step], registry: &mut AliasRegistry, walk: &mut usize) {
    for step in steps {
        let index = *walk;
        *walk += 1;
        register_step_aliases(step, registry, index);
        if let Step::Fork(fork) = step {
            for branch in &fork.branches {
                collect_aliases(&branch.steps, registry, walk);
            }
        }
    }
}

fn condition_aliases<'a>(condition: &'a Condition, out: &mut Vec<&'a str>) {
    match condition {
        Condition::Compare { alias, .. }
        | Condition::EdgeExists { alias, .. }
        | Condition::ConnectedTo { alias, .. } => {
            if let Some(a) = alias {
                out.push(a);
            }
        }
        Condition::And { conditions }
        | Condition::Or { conditions }
        | Condition::Not { conditions } => {
            for c in conditions {
                condition_aliases(c, out);
            }
        }
    }
}

fn check_alias(registry: &AliasRegistry, alias: &str, step_index: usize) -> AstResult<()> {
    if registry.contains(alias) {
        Ok(())
    } else {
        Err(AstError::UnknownAlias {
            alias: alias.to_string(),
            step_index,
        })
    }
}

fn validate_steps(
    steps: &[Step],
    registry: &mut AliasRegistry,
    walk: &mut usize,
) -> AstResult<()> {
    for (pos, step) in steps.iter().enumerate() {
        let index = *walk;
        *walk += 1;

        match step {
            Step::Traversal(t) => check_alias(registry, &t.from_alias, index)?,
            Step::Where(w) => {
                check_alias(registry, &w.target, index)?;
                let mut refs = Vec::new();
                condition_aliases(&w.condition, &mut refs);
                for alias in refs {
                    check_alias(registry, alias, index)?;
                }
            }
            Step::UserAlias { alias, .. } => check_alias(registry, alias, index)?,
            Step::Hierarchy(h) => check_alias(registry, &h.from_alias, index)?,
            Step::Reachable(r) => check_alias(registry, &r.from_alias, index)?,
            Step::Aggregate(a) => check_alias(registry, &a.target, index)?,
            Step::OrderBy { items } => {
                for item in items {
                    check_alias(registry, &item.target, index)?;
                }
            }
            Step::Fork(fork) => {
                check_alias(registry, &fork.source_alias, index)?;
                for branch in &fork.branches {
                    // a branch sees everything registered before the fork
                    validate_steps(&branch.steps, registry, walk)?;
                }
            }
            Step::Branch(b) => {
                // set-operation arms are fully independent sub-queries
                for arm in &b.branches {
                    let mut arm_registry = AliasRegistry::default();
                    let mut arm_walk = 0usize;
                    validate_steps(&arm.steps, &mut arm_registry, &mut arm_walk)?;
                }
            }
            Step::Path { alias } => {
                let next = steps.get(pos + 1);
                if !matches!(next, Some(Step::Traversal(_)) | Some(Step::Reachable(_))) {
                    return Err(AstError::DanglingPathCapture {
                        alias: alias.clone(),
                    });
                }
            }
            _ => {}
        }

        register_step_aliases(step, registry, index);
    }
    Ok(())
}
