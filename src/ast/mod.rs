/// Query-plan (AST) model
///
/// This module defines the step types that make up a query plan. Steps form a
/// linear ordered sequence, except `Branch`/`Fork` which embed nested
/// independent sub-sequences. Plans are built with [`builder::QueryAst`],
/// compiled to Cypher by [`crate::compiler`], or interpreted directly by
/// [`crate::engine`].

pub mod builder;

pub use builder::{AliasInfo, AliasKind, AliasRegistry, AstError, AstResult, AstSnapshot, QueryAst};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Traversal direction relative to the source node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow outgoing edges: (src)-[]->(dst)
    Out,
    /// Follow incoming edges: (src)<-[]-(dst)
    In,
    /// Follow edges in either direction
    Both,
}

/// Result multiplicity of a traversal endpoint
///
/// Determined by schema cardinality at the caller layer; here it is a plain
/// runtime enum that shapes the engine output and switches the compiler
/// between MATCH and OPTIONAL MATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Exactly one result expected
    One,
    /// Zero or one result; compiles to OPTIONAL MATCH
    Optional,
    /// Any number of results
    Many,
}

/// Comparison operators for property filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    StartsWith,
    EndsWith,
}

/// Filter condition attached to a Where step or an edge filter
///
/// `alias: None` means "the step's target alias" and is resolved against the
/// enclosing [`WhereStep::target`] when compiled or interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Condition {
    /// Property comparison: `alias.property op value`
    Compare {
        alias: Option<String>,
        property: String,
        op: CompareOp,
        value: JsonValue,
    },

    /// All sub-conditions must hold
    And { conditions: Vec<Condition> },

    /// At least one sub-condition must hold
    Or { conditions: Vec<Condition> },

    /// Negation; must contain exactly one sub-condition
    ///
    /// Kept as a list so the compiler can reject a malformed arity instead
    /// of silently mis-compiling a plan assembled from external input.
    Not { conditions: Vec<Condition> },

    /// The node has at least one edge of the given types/direction
    EdgeExists {
        alias: Option<String>,
        edge_types: Vec<String>,
        direction: Direction,
    },

    /// The node has an edge of type `edge_type` to/from the node with
    /// id `node_id`; always lowered to an id-anchored MATCH clause
    ConnectedTo {
        alias: Option<String>,
        edge_type: String,
        direction: Direction,
        node_id: String,
    },
}

impl Condition {
    /// Property comparison on the current step target
    pub fn compare(property: impl Into<String>, op: CompareOp, value: JsonValue) -> Self {
        Condition::Compare {
            alias: None,
            property: property.into(),
            op,
            value,
        }
    }

    /// Equality shorthand
    pub fn eq(property: impl Into<String>, value: JsonValue) -> Self {
        Self::compare(property, CompareOp::Eq, value)
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or { conditions }
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            conditions: vec![condition],
        }
    }

    pub fn connected_to(
        edge_type: impl Into<String>,
        direction: Direction,
        node_id: impl Into<String>,
    ) -> Self {
        Condition::ConnectedTo {
            alias: None,
            edge_type: edge_type.into(),
            direction,
            node_id: node_id.into(),
        }
    }

    /// Whether this condition or any nested condition is a ConnectedTo
    pub fn contains_connected_to(&self) -> bool {
        match self {
            Condition::ConnectedTo { .. } => true,
            Condition::And { conditions }
            | Condition::Or { conditions }
            | Condition::Not { conditions } => {
                conditions.iter().any(Condition::contains_connected_to)
            }
            _ => false,
        }
    }
}

/// Inclusive hop range for variable-length traversals
///
/// `max: None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl HopRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max: Some(max) }
    }

    pub fn at_least(min: u32) -> Self {
        Self { min, max: None }
    }
}

/// Caller-facing traversal description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalSpec {
    /// Edge types to follow; empty means any type
    pub edge_types: Vec<String>,

    /// Direction relative to the source node
    pub direction: Direction,

    /// Target node labels; empty means any label
    pub to_labels: Vec<String>,

    /// Result multiplicity of the target
    pub cardinality: Cardinality,

    /// Variable-length bounds; `None` means a single hop
    pub variable_length: Option<HopRange>,

    /// Filter evaluated against the traversed edge
    pub edge_where: Option<Condition>,

    /// Caller-facing name bound to the edge alias
    pub edge_user_alias: Option<String>,
}

impl TraversalSpec {
    /// Single outgoing hop over one edge type, any target label
    pub fn out(edge_type: impl Into<String>) -> Self {
        Self {
            edge_types: vec![edge_type.into()],
            direction: Direction::Out,
            to_labels: Vec::new(),
            cardinality: Cardinality::Many,
            variable_length: None,
            edge_where: None,
            edge_user_alias: None,
        }
    }

    /// Single incoming hop over one edge type, any source label
    pub fn in_(edge_type: impl Into<String>) -> Self {
        Self {
            direction: Direction::In,
            ..Self::out(edge_type)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.to_labels.push(label.into());
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_hops(mut self, range: HopRange) -> Self {
        self.variable_length = Some(range);
        self
    }

    pub fn with_edge_where(mut self, condition: Condition) -> Self {
        self.edge_where = Some(condition);
        self
    }

    pub fn with_edge_alias(mut self, name: impl Into<String>) -> Self {
        self.edge_user_alias = Some(name.into());
        self
    }
}

/// Traversal step with its resolved aliases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalStep {
    /// Source node alias (must be registered earlier in the sequence)
    pub from_alias: String,
    /// Newly allocated alias for the target node
    pub node_alias: String,
    /// Newly allocated alias for the traversed edge
    pub edge_alias: String,
    pub spec: TraversalSpec,
}

/// Where step: a filter scoped to a registered alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereStep {
    /// Default target for conditions that name no alias
    pub target: String,
    pub condition: Condition,
}

/// Hierarchy navigation operations over a designated tree edge type
///
/// The hierarchy convention is child -[:edge_type]-> parent: a node's parent
/// is the target of its first outgoing hierarchy edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HierarchyOp {
    Parent,
    Children,
    Ancestors,
    Descendants,
    Siblings,
    Root,
}

/// Bounded-depth hierarchy step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyStep {
    pub from_alias: String,
    /// Newly allocated alias for the reached node(s)
    pub node_alias: String,
    /// Designated hierarchy edge type
    pub edge_type: String,
    pub op: HierarchyOp,
    /// Depth bound for ancestors/descendants; `None` means unbounded
    pub max_depth: Option<u32>,
    /// Include the source node itself (depth 0)
    pub include_self: bool,
    /// Capture each result's depth under this binding name
    pub depth_alias: Option<String>,
}

/// Transitive-closure reachability step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachableStep {
    pub from_alias: String,
    pub node_alias: String,
    /// Edge types to follow; empty means any type
    pub edge_types: Vec<String>,
    pub direction: Direction,
    pub min_hops: u32,
    /// `None` means unbounded
    pub max_hops: Option<u32>,
}

/// Set operator combining independent sub-plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOperator {
    Union,
    Intersect,
}

/// An independent embedded step sequence with its terminal node alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPlan {
    pub steps: Vec<Step>,
    /// Alias whose bindings form the sub-plan's result
    pub terminal_alias: String,
    /// Node-alias counter value at which this sub-plan started allocating;
    /// fork branches get distinct offsets so merged registries never collide
    pub alias_offset: u32,
}

/// Set-operation step over fully independent sub-queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStep {
    pub operator: SetOperator,
    pub branches: Vec<SubPlan>,
    /// For Union: deduplicate results (UNION vs UNION ALL)
    pub distinct: bool,
    /// Alias under which the merged result is bound
    pub result_alias: String,
}

/// Fan-out step: multiple continuations from the same source alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkStep {
    pub source_alias: String,
    pub branches: Vec<SubPlan>,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

impl AggregateFn {
    /// Cypher function name
    pub fn cypher_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Collect => "collect",
        }
    }
}

/// Aggregation over a registered alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStep {
    pub function: AggregateFn,
    /// Alias the aggregate ranges over
    pub target: String,
    /// Property aggregated; `None` aggregates the binding itself (count/collect)
    pub property: Option<String>,
    /// Output column name
    pub result_name: String,
}

/// Single ORDER BY key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub target: String,
    pub property: String,
    pub ascending: bool,
}

/// A step in the query plan
///
/// Every step referencing an alias must reference one already registered
/// earlier in the sequence; [`QueryAst::validate`] enforces this before
/// compilation or interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    /// Bind all nodes with a label to a fresh alias
    Match { alias: String, label: String },

    /// Bind the node with a specific id to a fresh alias
    MatchById { alias: String, id: String },

    Traversal(TraversalStep),

    Where(WhereStep),

    /// Bind a caller-facing name to an internal alias
    UserAlias { alias: String, name: String },

    Hierarchy(HierarchyStep),

    Reachable(ReachableStep),

    Branch(BranchStep),

    Fork(ForkStep),

    Aggregate(AggregateStep),

    OrderBy { items: Vec<OrderByItem> },

    Limit { count: u64 },

    Skip { count: u64 },

    Distinct,

    /// Name the path walked by the next traversal/reachable step
    Path { alias: String },
}

/// Result shape declared by the caller
///
/// Validated against the alias registry when set, not deferred to compile
/// time. `MultiNode` names are caller-facing user aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum Projection {
    /// Return the current node alias; multiplicity follows the last
    /// traversal's cardinality
    #[default]
    Default,

    /// Exactly one / zero-or-one node
    Single { alias: String },

    /// All bindings of one alias
    Collection { alias: String },

    /// Several user-aliased bindings side by side; aliases listed in
    /// `collect` are gathered into arrays per remaining-alias group
    MultiNode {
        aliases: Vec<String>,
        collect: Vec<String>,
    },

    /// Scalar property fields of one alias
    Fields { alias: String, fields: Vec<String> },

    /// Aggregated scalar
    Aggregate {
        function: AggregateFn,
        alias: String,
        property: Option<String>,
        name: String,
    },

    /// Row count
    Count,

    /// Whether any row matched
    Exists,

    /// The captured path
    Path { alias: String },

    /// Node plus its captured traversal depth
    WithDepth { alias: String, depth_alias: String },
}

/// Backend-agnostic classification of a query's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultType {
    Single,
    Collection,
    MultiNode,
    Path,
    Aggregate,
    Scalar,
    Void,
}
