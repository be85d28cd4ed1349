/// AST to Cypher compiler
///
/// Stateful single pass over the step sequence, emitting ordered clauses, a
/// parameter table (`$p0,$p1,…`) and query metadata. ORDER BY / SKIP / LIMIT
/// are buffered separately and appended last regardless of where they appear
/// in the plan. Two rewrites run on the way through:
///
/// - consecutive Where steps AND-merge into one clause (see [`passes`]),
/// - ConnectedTo conditions are promoted to id-anchored MATCH clauses so the
///   target query planner can start from an id-indexed lookup.
///
/// `compile` is pure given (plan, options): compiling the same plan twice
/// yields byte-identical output.

pub mod passes;

use crate::ast::{
    AstError, BranchStep, CompareOp, Condition, Direction, HierarchyOp, HierarchyStep,
    Projection, QueryAst, ReachableStep, ResultType, SetOperator, Step, TraversalStep, WhereStep,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

/// Compilation errors
#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    /// Plan failed alias validation
    #[error(transparent)]
    Ast(#[from] AstError),

    /// NOT must wrap exactly one sub-condition
    #[error("NOT condition must have exactly 1 sub-condition, got {arity}")]
    MalformedNot { arity: usize },

    /// ConnectedTo may not appear inside AND/OR/NOT
    #[error("ConnectedTo condition cannot be nested inside AND/OR/NOT")]
    NestedConnectedTo,

    /// Intersect needs at least two branches
    #[error("Intersect requires at least 2 branches, got {arity}")]
    IntersectArity { arity: usize },

    /// Plan has no steps to compile
    #[error("Cannot compile an empty plan")]
    EmptyPlan,

    /// A union branch must be the final pattern step of a plan
    #[error("No pattern steps may follow a union branch")]
    StepsAfterUnion,
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Compiler options
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Join clauses with a single space instead of newlines
    pub compact: bool,
}

/// Summary metadata for a compiled query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMeta {
    pub complexity: u32,
    pub has_variable_length_path: bool,
    pub has_aggregation: bool,
    pub match_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_aliases: Option<Vec<String>>,
}

/// A compiled Cypher query with its parameter table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub cypher: String,
    pub params: HashMap<String, JsonValue>,
    pub result_type: ResultType,
    pub meta: QueryMeta,
}

/// Compile a plan with default options
pub fn compile(ast: &QueryAst) -> CompileResult<CompiledQuery> {
    compile_with(ast, &CompileOptions::default())
}

/// Compile a plan
pub fn compile_with(ast: &QueryAst, options: &CompileOptions) -> CompileResult<CompiledQuery> {
    ast.validate()?;
    let steps = passes::merge_where_steps(ast.steps());
    if steps.is_empty() {
        return Err(CompileError::EmptyPlan);
    }

    let mut compiler = Compiler::default();
    compiler.emit_steps(&steps)?;
    compiler.assemble(ast, &steps, options)
}

#[derive(Default)]
struct Compiler {
    clauses: Vec<String>,
    params: Vec<JsonValue>,
    order_by: Vec<String>,
    limit: Option<u64>,
    skip: Option<u64>,
    distinct: bool,
    force_distinct: bool,
    force_optional: bool,
    match_count: u32,
    where_count: u32,
    var_len: bool,
    aggregation: bool,
    ct_count: u32,
    sibling_count: u32,
    hier_path_count: u32,
    /// depth binding name -> Cypher depth expression
    depth_exprs: HashMap<String, String>,
    /// path alias waiting to prefix the next MATCH pattern
    pending_path: Option<String>,
    /// alias substitutions (intersect chaining binds arm aliases together)
    rename: HashMap<String, String>,
    /// a union branch replaces the normal clause/RETURN assembly
    union_text: Option<String>,
}

impl Compiler {
    fn name(&self, alias: &str) -> String {
        self.rename
            .get(alias)
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }

    fn param(&mut self, value: JsonValue) -> String {
        let name = format!("p{}", self.params.len());
        self.params.push(value);
        name
    }

    fn match_keyword(&self, optional: bool) -> &'static str {
        if optional || self.force_optional {
            "OPTIONAL MATCH"
        } else {
            "MATCH"
        }
    }

    /// `p0 = ` prefix when a path capture is pending
    fn take_path_prefix(&mut self) -> String {
        match self.pending_path.take() {
            Some(alias) => format!("{alias} = "),
            None => String::new(),
        }
    }

    fn emit_steps(&mut self, steps: &[Step]) -> CompileResult<()> {
        for step in steps {
            if self.union_text.is_some() {
                match step {
                    Step::OrderBy { .. } | Step::Limit { .. } | Step::Skip { .. } | Step::Distinct => {}
                    _ => return Err(CompileError::StepsAfterUnion),
                }
            }
            match step {
                Step::Match { alias, label } => {
                    let kw = self.match_keyword(false);
                    let prefix = self.take_path_prefix();
                    let name = self.name(alias);
                    self.clauses.push(format!("{kw} {prefix}({name}:{label})"));
                    self.match_count += 1;
                }
                Step::MatchById { alias, id } => {
                    let kw = self.match_keyword(false);
                    let prefix = self.take_path_prefix();
                    let name = self.name(alias);
                    let p = self.param(JsonValue::String(id.clone()));
                    self.clauses
                        .push(format!("{kw} {prefix}({name} {{id: ${p}}})"));
                    self.match_count += 1;
                }
                Step::Traversal(t) => self.emit_traversal(t)?,
                Step::Where(w) => self.emit_where(w)?,
                Step::Hierarchy(h) => self.emit_hierarchy(h),
                Step::Reachable(r) => self.emit_reachable(r),
                Step::Branch(b) => self.emit_branch(b)?,
                Step::Fork(f) => {
                    let saved = self.force_optional;
                    self.force_optional = true;
                    for branch in &f.branches {
                        self.emit_steps(&branch.steps)?;
                    }
                    self.force_optional = saved;
                }
                Step::Aggregate(_) => self.aggregation = true,
                Step::OrderBy { items } => {
                    for item in items {
                        let dir = if item.ascending { "ASC" } else { "DESC" };
                        let target = self.name(&item.target);
                        self.order_by
                            .push(format!("{target}.{} {dir}", item.property));
                    }
                }
                Step::Limit { count } => self.limit = Some(*count),
                Step::Skip { count } => self.skip = Some(*count),
                Step::Distinct => self.distinct = true,
                Step::UserAlias { .. } => {}
                Step::Path { alias } => self.pending_path = Some(alias.clone()),
            }
        }
        Ok(())
    }

    fn edge_type_part(types: &[String]) -> String {
        if types.is_empty() {
            String::new()
        } else {
            format!(":{}", types.join("|"))
        }
    }

    fn label_part(labels: &[String]) -> String {
        if labels.is_empty() {
            String::new()
        } else {
            format!(":{}", labels.join("|"))
        }
    }

    fn hop_suffix(min: u32, max: Option<u32>) -> String {
        match max {
            Some(max) => format!("*{min}..{max}"),
            None => format!("*{min}.."),
        }
    }

    fn arrow(direction: Direction, inner: &str) -> String {
        match direction {
            Direction::Out => format!("-[{inner}]->"),
            Direction::In => format!("<-[{inner}]-"),
            Direction::Both => format!("-[{inner}]-"),
        }
    }

    fn emit_traversal(&mut self, t: &TraversalStep) -> CompileResult<()> {
        let kw = self.match_keyword(t.spec.cardinality == crate::ast::Cardinality::Optional);
        let prefix = self.take_path_prefix();
        let from = self.name(&t.from_alias);
        let node = self.name(&t.node_alias);
        let edge = self.name(&t.edge_alias);

        let mut inner = format!("{edge}{}", Self::edge_type_part(&t.spec.edge_types));
        if let Some(range) = &t.spec.variable_length {
            inner.push_str(&Self::hop_suffix(range.min, range.max));
            self.var_len = true;
        }
        let arrow = Self::arrow(t.spec.direction, &inner);
        let label = Self::label_part(&t.spec.to_labels);

        self.clauses
            .push(format!("{kw} {prefix}({from}){arrow}({node}{label})"));
        self.match_count += 1;

        // edge-property filter scoped to the edge alias
        if let Some(condition) = &t.spec.edge_where {
            let rendered = self.render_condition(condition, &t.edge_alias)?;
            self.clauses.push(format!("WHERE {rendered}"));
            self.where_count += 1;
        }
        Ok(())
    }

    fn emit_where(&mut self, w: &WhereStep) -> CompileResult<()> {
        // a bare ConnectedTo lowers to its own id-anchored MATCH
        if let Condition::ConnectedTo {
            alias,
            edge_type,
            direction,
            node_id,
        } = &w.condition
        {
            let source = alias.clone().unwrap_or_else(|| w.target.clone());
            let source = self.name(&source);
            let ct_alias = format!("ct{}", self.ct_count);
            self.ct_count += 1;
            let p = self.param(JsonValue::String(node_id.clone()));
            let inner = format!(":{edge_type}");
            let arrow = Self::arrow(*direction, &inner);
            self.clauses
                .push(format!("MATCH ({source}){arrow}({ct_alias} {{id: ${p}}})"));
            self.match_count += 1;
            return Ok(());
        }

        let rendered = self.render_condition(&w.condition, &w.target)?;
        self.clauses.push(format!("WHERE {rendered}"));
        self.where_count += 1;
        Ok(())
    }

    fn render_condition(&mut self, condition: &Condition, target: &str) -> CompileResult<String> {
        match condition {
            Condition::Compare {
                alias,
                property,
                op,
                value,
            } => {
                let subject = self.name(alias.as_deref().unwrap_or(target));
                let p = self.param(value.clone());
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Lt => "<",
                    CompareOp::Lte => "<=",
                    CompareOp::Gt => ">",
                    CompareOp::Gte => ">=",
                    CompareOp::In => "IN",
                    CompareOp::Contains => "CONTAINS",
                    CompareOp::StartsWith => "STARTS WITH",
                    CompareOp::EndsWith => "ENDS WITH",
                };
                Ok(format!("{subject}.{property} {op} ${p}"))
            }
            Condition::And { conditions } => {
                let parts = conditions
                    .iter()
                    .map(|c| self.render_condition(c, target))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
            Condition::Or { conditions } => {
                let parts = conditions
                    .iter()
                    .map(|c| self.render_condition(c, target))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }
            Condition::Not { conditions } => {
                if conditions.len() != 1 {
                    return Err(CompileError::MalformedNot {
                        arity: conditions.len(),
                    });
                }
                let inner = self.render_condition(&conditions[0], target)?;
                Ok(format!("NOT ({inner})"))
            }
            Condition::EdgeExists {
                alias,
                edge_types,
                direction,
            } => {
                let subject = self.name(alias.as_deref().unwrap_or(target));
                let inner = Self::edge_type_part(edge_types);
                let arrow = Self::arrow(*direction, &inner);
                Ok(format!("EXISTS(({subject}){arrow}())"))
            }
            // reachable only from inside AND/OR/NOT; bare ConnectedTo is
            // promoted before rendering
            Condition::ConnectedTo { .. } => Err(CompileError::NestedConnectedTo),
        }
    }

    fn emit_hierarchy(&mut self, h: &HierarchyStep) {
        let kw = self.match_keyword(false);
        let from = self.name(&h.from_alias);
        let node = self.name(&h.node_alias);
        let e = &h.edge_type;

        // depth capture names the variable-length path so the projection can
        // reference length() on it
        let mut prefix = self.take_path_prefix();
        if let Some(depth) = &h.depth_alias {
            let path_alias = format!("pd{}", self.hier_path_count);
            self.hier_path_count += 1;
            self.depth_exprs
                .insert(depth.clone(), format!("length({path_alias})"));
            prefix = format!("{path_alias} = ");
        }

        match h.op {
            HierarchyOp::Parent => {
                self.clauses
                    .push(format!("{kw} {prefix}({from})-[:{e}]->({node})"));
            }
            HierarchyOp::Children => {
                self.clauses
                    .push(format!("{kw} {prefix}({from})<-[:{e}]-({node})"));
            }
            HierarchyOp::Ancestors => {
                let min = if h.include_self { 0 } else { 1 };
                let hops = Self::hop_suffix(min, h.max_depth);
                self.clauses
                    .push(format!("{kw} {prefix}({from})-[:{e}{hops}]->({node})"));
                self.var_len = true;
            }
            HierarchyOp::Descendants => {
                let min = if h.include_self { 0 } else { 1 };
                let hops = Self::hop_suffix(min, h.max_depth);
                self.clauses
                    .push(format!("{kw} {prefix}({from})<-[:{e}{hops}]-({node})"));
                self.var_len = true;
            }
            HierarchyOp::Siblings => {
                let parent = format!("sp{}", self.sibling_count);
                self.sibling_count += 1;
                self.clauses.push(format!(
                    "{kw} {prefix}({from})-[:{e}]->({parent})<-[:{e}]-({node})"
                ));
                self.clauses.push(format!("WHERE {node}.id <> {from}.id"));
                self.where_count += 1;
            }
            HierarchyOp::Root => {
                self.clauses
                    .push(format!("{kw} {prefix}({from})-[:{e}*0..]->({node})"));
                self.clauses
                    .push(format!("WHERE NOT ({node})-[:{e}]->()"));
                self.where_count += 1;
                self.var_len = true;
            }
        }
        self.match_count += 1;
    }

    fn emit_reachable(&mut self, r: &ReachableStep) {
        let kw = self.match_keyword(false);
        let prefix = self.take_path_prefix();
        let from = self.name(&r.from_alias);
        let node = self.name(&r.node_alias);

        let mut inner = Self::edge_type_part(&r.edge_types);
        inner.push_str(&Self::hop_suffix(r.min_hops, r.max_hops));
        let arrow = Self::arrow(r.direction, &inner);

        self.clauses
            .push(format!("{kw} {prefix}({from}){arrow}({node})"));
        self.match_count += 1;
        self.var_len = true;
        // multiple paths can reach the same node; results must dedupe
        self.force_distinct = true;
    }

    fn emit_branch(&mut self, b: &BranchStep) -> CompileResult<()> {
        match b.operator {
            SetOperator::Union => self.emit_union(b),
            SetOperator::Intersect => self.emit_intersect(b),
        }
    }

    fn emit_union(&mut self, b: &BranchStep) -> CompileResult<()> {
        let separator = if b.distinct { "\nUNION\n" } else { "\nUNION ALL\n" };
        let mut arms = Vec::with_capacity(b.branches.len());
        for arm in &b.branches {
            let clauses = self.emit_subplan(&arm.steps, HashMap::new())?;
            let terminal = self.name(&arm.terminal_alias);
            let result = self.name(&b.result_alias);
            arms.push(format!(
                "{}\nRETURN {terminal} AS {result}",
                clauses.join("\n")
            ));
        }
        self.union_text = Some(arms.join(separator));
        Ok(())
    }

    /// Cypher has no INTERSECT; emulate by chaining each arm's MATCH/WHERE
    /// behind a `WITH` carrying the same bound variable forward
    fn emit_intersect(&mut self, b: &BranchStep) -> CompileResult<()> {
        if b.branches.len() < 2 {
            return Err(CompileError::IntersectArity {
                arity: b.branches.len(),
            });
        }

        // every arm alias is prefixed so the inlined clauses can never
        // collide with the surrounding plan; terminals all bind to `shared`
        let shared = format!("b0{}", b.branches[0].terminal_alias);
        for (i, arm) in b.branches.iter().enumerate() {
            let mut rename: HashMap<String, String> = gather_aliases(&arm.steps)
                .into_iter()
                .map(|a| (a.clone(), format!("b{i}{a}")))
                .collect();
            rename.insert(arm.terminal_alias.clone(), shared.clone());
            let clauses = self.emit_subplan(&arm.steps, rename)?;
            self.clauses.extend(clauses);
            self.clauses.push(format!("WITH {shared}"));
        }
        self.clauses.pop(); // no WITH after the final arm
        self.rename.insert(b.result_alias.clone(), shared);
        Ok(())
    }

    /// Emit a nested step sequence into its own clause buffer, sharing the
    /// parameter table and counters with the parent
    fn emit_subplan(
        &mut self,
        steps: &[Step],
        rename: HashMap<String, String>,
    ) -> CompileResult<Vec<String>> {
        let saved_clauses = std::mem::take(&mut self.clauses);
        let saved_rename = std::mem::replace(&mut self.rename, rename);
        let result = self.emit_steps(steps);
        let clauses = std::mem::replace(&mut self.clauses, saved_clauses);
        self.rename = saved_rename;
        result?;
        Ok(clauses)
    }

    fn assemble(
        mut self,
        ast: &QueryAst,
        steps: &[Step],
        options: &CompileOptions,
    ) -> CompileResult<CompiledQuery> {
        let registry = ast.registry();
        let user_map = registry.user_alias_map();
        let mut return_aliases = None;

        let distinct_kw = if self.distinct || self.force_distinct {
            "DISTINCT "
        } else {
            ""
        };

        let (return_clause, result_type) = match ast.projection() {
            Projection::Count => {
                let subject = match ast.current_alias() {
                    Some(alias) => self.name(alias),
                    None => "*".to_string(),
                };
                (format!("RETURN count({subject}) AS count"), ResultType::Scalar)
            }
            Projection::Exists => {
                let subject = match ast.current_alias() {
                    Some(alias) => self.name(alias),
                    None => "*".to_string(),
                };
                (
                    format!("RETURN count({subject}) > 0 AS exists"),
                    ResultType::Scalar,
                )
            }
            Projection::Aggregate {
                function,
                alias,
                property,
                name,
            } => {
                self.aggregation = true;
                let subject = self.name(alias);
                let expr = match property {
                    Some(p) => format!("{}({subject}.{p})", function.cypher_name()),
                    None => format!("{}({subject})", function.cypher_name()),
                };
                (format!("RETURN {expr} AS {name}"), ResultType::Aggregate)
            }
            Projection::MultiNode { aliases, collect } => {
                let mut items = Vec::new();
                let mut names = Vec::new();
                for user in aliases {
                    let internal = user_map
                        .get(user)
                        .cloned()
                        .ok_or(AstError::UnknownUserAlias { name: user.clone() })?;
                    items.push(format!("{} AS {user}", self.name(&internal)));
                    names.push(user.clone());
                }
                for user in collect {
                    let internal = user_map
                        .get(user)
                        .cloned()
                        .ok_or(AstError::UnknownUserAlias { name: user.clone() })?;
                    items.push(format!("collect({}) AS {user}", self.name(&internal)));
                    names.push(user.clone());
                }
                return_aliases = Some(names);
                (
                    format!("RETURN {distinct_kw}{}", items.join(", ")),
                    ResultType::MultiNode,
                )
            }
            Projection::Fields { alias, fields } => {
                let subject = self.name(alias);
                let items: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{subject}.{f} AS {f}"))
                    .collect();
                (
                    format!("RETURN {}", items.join(", ")),
                    ResultType::Scalar,
                )
            }
            Projection::WithDepth { alias, depth_alias } => {
                let subject = self.name(alias);
                let depth = self
                    .depth_exprs
                    .get(depth_alias)
                    .cloned()
                    .unwrap_or_else(|| "0".to_string());
                (
                    format!("RETURN {distinct_kw}{subject} AS node, {depth} AS {depth_alias}"),
                    ResultType::Collection,
                )
            }
            Projection::Path { alias } => {
                (format!("RETURN {}", self.name(alias)), ResultType::Path)
            }
            Projection::Single { alias } => (
                format!("RETURN {distinct_kw}{}", self.name(alias)),
                ResultType::Single,
            ),
            Projection::Collection { alias } => (
                format!("RETURN {distinct_kw}{}", self.name(alias)),
                ResultType::Collection,
            ),
            Projection::Default => {
                let alias = ast.current_alias().ok_or(CompileError::EmptyPlan)?;
                (
                    format!("RETURN {distinct_kw}{}", self.name(alias)),
                    default_result_type(steps),
                )
            }
        };

        let mut parts: Vec<String> = match self.union_text.take() {
            // arms carry their own RETURNs
            Some(union) => vec![union],
            None => {
                let mut parts = std::mem::take(&mut self.clauses);
                parts.push(return_clause);
                parts
            }
        };

        if !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(skip) = self.skip {
            parts.push(format!("SKIP {skip}"));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {limit}"));
        }

        let separator = if options.compact { " " } else { "\n" };
        let cypher = parts.join(separator);

        let params: HashMap<String, JsonValue> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("p{i}"), v.clone()))
            .collect();

        let complexity = self.match_count
            + self.where_count
            + if self.var_len { 2 } else { 0 }
            + u32::from(self.aggregation);

        tracing::debug!(
            match_count = self.match_count,
            complexity,
            "compiled plan to cypher"
        );

        Ok(CompiledQuery {
            cypher,
            params,
            result_type,
            meta: QueryMeta {
                complexity,
                has_variable_length_path: self.var_len,
                has_aggregation: self.aggregation,
                match_count: self.match_count,
                return_aliases,
            },
        })
    }
}

/// All aliases a nested step sequence allocates (for intersect renaming)
fn gather_aliases(steps: &[Step]) -> Vec<String> {
    let mut out = Vec::new();
    for step in steps {
        match step {
            Step::Match { alias, .. } | Step::MatchById { alias, .. } | Step::Path { alias } => {
                out.push(alias.clone())
            }
            Step::Traversal(t) => {
                out.push(t.node_alias.clone());
                out.push(t.edge_alias.clone());
            }
            Step::Hierarchy(h) => out.push(h.node_alias.clone()),
            Step::Reachable(r) => out.push(r.node_alias.clone()),
            Step::Branch(b) => out.push(b.result_alias.clone()),
            Step::Fork(f) => {
                for branch in &f.branches {
                    out.extend(gather_aliases(&branch.steps));
                }
            }
            _ => {}
        }
    }
    out
}

/// Result multiplicity of a plan with no explicit projection; shared with
/// the in-memory engine so both backends shape the default identically
pub(crate) fn default_result_type(steps: &[Step]) -> ResultType {
    use crate::ast::Cardinality;
    for step in steps.iter().rev() {
        match step {
            Step::Traversal(t) => {
                return match t.spec.cardinality {
                    Cardinality::One | Cardinality::Optional => ResultType::Single,
                    Cardinality::Many => ResultType::Collection,
                }
            }
            Step::Hierarchy(h) => {
                return match h.op {
                    HierarchyOp::Parent | HierarchyOp::Root => ResultType::Single,
                    _ => ResultType::Collection,
                }
            }
            Step::Reachable(_) | Step::Branch(_) | Step::Match { .. } => {
                return ResultType::Collection
            }
            Step::MatchById { .. } => return ResultType::Single,
            _ => continue,
        }
    }
    ResultType::Collection
}

impl QueryAst {
    pub fn compile(&self) -> CompileResult<CompiledQuery> {
        compile(self)
    }

    pub fn compile_with(&self, options: &CompileOptions) -> CompileResult<CompiledQuery> {
        compile_with(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggregateFn, Cardinality, HopRange, TraversalSpec};
    use serde_json::json;

    fn user_posts() -> QueryAst {
        QueryAst::new()
            .match_node("user")
            .traverse(TraversalSpec::out("authored").with_label("post"))
            .unwrap()
    }

    #[test]
    fn test_simple_match_compiles() {
        let q = QueryAst::new().match_node("user").compile().unwrap();
        assert_eq!(q.cypher, "MATCH (n0:user)\nRETURN n0");
        assert_eq!(q.meta.match_count, 1);
        assert_eq!(q.result_type, ResultType::Collection);
    }

    #[test]
    fn test_match_by_id_parameterizes() {
        let q = QueryAst::new().match_by_id("u1").compile().unwrap();
        assert_eq!(q.cypher, "MATCH (n0 {id: $p0})\nRETURN n0");
        assert_eq!(q.params.get("p0"), Some(&json!("u1")));
        assert_eq!(q.result_type, ResultType::Single);
    }

    #[test]
    fn test_traversal_direction_and_types() {
        let q = user_posts().compile().unwrap();
        assert!(q.cypher.contains("MATCH (n0)-[e0:authored]->(n1:post)"));

        let q = QueryAst::new()
            .match_node("post")
            .traverse(TraversalSpec::in_("authored").with_label("user"))
            .unwrap()
            .compile()
            .unwrap();
        assert!(q.cypher.contains("MATCH (n0)<-[e0:authored]-(n1:user)"));
    }

    #[test]
    fn test_optional_cardinality_emits_optional_match() {
        let q = QueryAst::new()
            .match_node("user")
            .traverse(
                TraversalSpec::out("avatar").with_cardinality(Cardinality::Optional),
            )
            .unwrap()
            .compile()
            .unwrap();
        assert!(q.cypher.contains("OPTIONAL MATCH (n0)-[e0:avatar]->(n1)"));
        assert_eq!(q.result_type, ResultType::Single);
    }

    #[test]
    fn test_variable_length_traversal() {
        let q = QueryAst::new()
            .match_node("user")
            .traverse(TraversalSpec::out("follows").with_hops(HopRange::new(1, 3)))
            .unwrap()
            .compile()
            .unwrap();
        assert!(q.cypher.contains("[e0:follows*1..3]"));
        assert!(q.meta.has_variable_length_path);
    }

    #[test]
    fn test_where_merging_produces_one_clause() {
        let q = QueryAst::new()
            .match_node("user")
            .filter(Condition::eq("name", json!("Alice")))
            .unwrap()
            .filter(Condition::compare("age", CompareOp::Gt, json!(18)))
            .unwrap()
            .compile()
            .unwrap();

        let where_clauses = q.cypher.matches("WHERE").count();
        assert_eq!(where_clauses, 1);
        assert!(q.cypher.contains("(n0.name = $p0 AND n0.age > $p1)"));
    }

    #[test]
    fn test_connected_to_promotes_to_match() {
        let q = QueryAst::new()
            .match_node("user")
            .filter(Condition::connected_to("authored", Direction::Out, "p1"))
            .unwrap()
            .compile()
            .unwrap();

        // never an anonymous existential pattern
        assert!(!q.cypher.contains("->({id:"));
        assert!(q.cypher.contains("MATCH (n0)-[:authored]->(ct0 {id: $p0})"));
        assert_eq!(q.meta.match_count, 2);
    }

    #[test]
    fn test_chained_connected_to_counts() {
        let q = QueryAst::new()
            .match_node("user")
            .filter(Condition::connected_to("authored", Direction::Out, "p1"))
            .unwrap()
            .filter(Condition::connected_to("follows", Direction::In, "u2"))
            .unwrap()
            .compile()
            .unwrap();

        // k chained conditions: k+1 MATCH clauses, k distinct ct aliases
        assert_eq!(q.meta.match_count, 3);
        assert!(q.cypher.contains("(ct0 {id: $p0})"));
        assert!(q.cypher.contains("(ct1 {id: $p1})"));
    }

    #[test]
    fn test_nested_connected_to_rejected() {
        let err = QueryAst::new()
            .match_node("user")
            .filter(Condition::and(vec![
                Condition::eq("name", json!("a")),
                Condition::connected_to("authored", Direction::Out, "p1"),
            ]))
            .unwrap()
            .compile()
            .unwrap_err();
        assert_eq!(err, CompileError::NestedConnectedTo);
    }

    #[test]
    fn test_malformed_not_rejected() {
        let ast = QueryAst::new().match_node("user");
        // hand-assembled: the builder helpers cannot produce this shape
        let bad = ast
            .filter(Condition::Not { conditions: vec![] })
            .unwrap();
        let err = bad.compile().unwrap_err();
        assert_eq!(err, CompileError::MalformedNot { arity: 0 });
    }

    #[test]
    fn test_hierarchy_root_filter() {
        let q = QueryAst::new()
            .match_by_id("n-leaf")
            .hierarchy(HierarchyOp::Root, "parent_of")
            .unwrap()
            .compile()
            .unwrap();
        assert!(q.cypher.contains("MATCH (n0)-[:parent_of*0..]->(n1)"));
        assert!(q.cypher.contains("WHERE NOT (n1)-[:parent_of]->()"));
    }

    #[test]
    fn test_hierarchy_siblings_excludes_self() {
        let q = QueryAst::new()
            .match_by_id("n-x")
            .hierarchy(HierarchyOp::Siblings, "parent_of")
            .unwrap()
            .compile()
            .unwrap();
        assert!(q
            .cypher
            .contains("MATCH (n0)-[:parent_of]->(sp0)<-[:parent_of]-(n1)"));
        assert!(q.cypher.contains("WHERE n1.id <> n0.id"));
    }

    #[test]
    fn test_reachable_forces_distinct() {
        let q = QueryAst::new()
            .match_by_id("a")
            .reachable(vec!["linked".into()], Direction::Out, HopRange::at_least(1))
            .unwrap()
            .compile()
            .unwrap();
        assert!(q.cypher.contains("[:linked*1..]"));
        assert!(q.cypher.contains("RETURN DISTINCT n1"));
    }

    #[test]
    fn test_union_branch() {
        let admins = QueryAst::new()
            .match_node("user")
            .filter(Condition::eq("role", json!("admin")))
            .unwrap();
        let editors = QueryAst::new()
            .match_node("user")
            .filter(Condition::eq("role", json!("editor")))
            .unwrap();

        let q = QueryAst::new()
            .branch(SetOperator::Union, vec![admins, editors], true)
            .unwrap()
            .compile()
            .unwrap();

        assert_eq!(q.cypher.matches("UNION").count(), 1);
        assert_eq!(q.cypher.matches("RETURN").count(), 2);
        assert!(q.cypher.contains("RETURN n0 AS n0"));
    }

    #[test]
    fn test_intersect_chains_with() {
        let a = QueryAst::new()
            .match_node("user")
            .filter(Condition::eq("active", json!(true)))
            .unwrap();
        let b = QueryAst::new()
            .match_node("user")
            .filter(Condition::eq("verified", json!(true)))
            .unwrap();

        let q = QueryAst::new()
            .branch(SetOperator::Intersect, vec![a, b], true)
            .unwrap()
            .compile()
            .unwrap();

        assert!(q.cypher.contains("WITH b0n0"));
        // both arms constrain the same bound variable
        assert_eq!(q.cypher.matches("MATCH (b0n0:user)").count(), 2);
        assert_eq!(q.cypher.matches("RETURN").count(), 1);
    }

    #[test]
    fn test_intersect_arity_rejected() {
        let a = QueryAst::new().match_node("user");
        let err = QueryAst::new()
            .branch(SetOperator::Intersect, vec![a], true)
            .unwrap()
            .compile()
            .unwrap_err();
        assert_eq!(err, CompileError::IntersectArity { arity: 1 });
    }

    #[test]
    fn test_fork_branches_compile_optional() {
        let q = QueryAst::new()
            .match_node("user")
            .fork(vec![
                Box::new(|b: QueryAst| {
                    b.traverse(TraversalSpec::out("authored").with_label("post"))
                }) as crate::ast::builder::ForkBranchFn,
                Box::new(|b: QueryAst| {
                    b.traverse(TraversalSpec::out("follows").with_label("user"))
                }),
            ])
            .unwrap()
            .compile()
            .unwrap();

        assert_eq!(q.cypher.matches("OPTIONAL MATCH").count(), 2);
    }

    #[test]
    fn test_order_limit_skip_appended_last() {
        let q = QueryAst::new()
            .match_node("user")
            .limit(10)
            .order_by("name", true)
            .unwrap()
            .skip(5)
            .compile()
            .unwrap();

        let lines: Vec<&str> = q.cypher.lines().collect();
        assert_eq!(
            lines,
            vec![
                "MATCH (n0:user)",
                "RETURN n0",
                "ORDER BY n0.name ASC",
                "SKIP 5",
                "LIMIT 10",
            ]
        );
    }

    #[test]
    fn test_projection_count_and_exists() {
        let q = QueryAst::new().match_node("user").project_count().compile().unwrap();
        assert!(q.cypher.ends_with("RETURN count(n0) AS count"));
        assert_eq!(q.result_type, ResultType::Scalar);

        let q = QueryAst::new()
            .match_node("user")
            .project_exists()
            .compile()
            .unwrap();
        assert!(q.cypher.ends_with("RETURN count(n0) > 0 AS exists"));
    }

    #[test]
    fn test_projection_multi_node_with_collect() {
        let q = QueryAst::new()
            .match_node("user")
            .user_alias("author")
            .unwrap()
            .traverse(TraversalSpec::out("authored").with_label("post"))
            .unwrap()
            .user_alias("posts")
            .unwrap()
            .project_multi(vec!["author".into()], vec!["posts".into()])
            .unwrap()
            .compile()
            .unwrap();

        assert!(q
            .cypher
            .contains("RETURN n0 AS author, collect(n1) AS posts"));
        assert_eq!(
            q.meta.return_aliases,
            Some(vec!["author".to_string(), "posts".to_string()])
        );
        assert_eq!(q.result_type, ResultType::MultiNode);
    }

    #[test]
    fn test_aggregate_projection() {
        let q = QueryAst::new()
            .match_node("order")
            .aggregate(AggregateFn::Sum, Some("total".into()), "revenue")
            .unwrap()
            .compile()
            .unwrap();
        assert!(q.cypher.ends_with("RETURN sum(n0.total) AS revenue"));
        assert!(q.meta.has_aggregation);
        assert_eq!(q.result_type, ResultType::Aggregate);
    }

    #[test]
    fn test_path_capture() {
        let q = QueryAst::new()
            .match_by_id("a")
            .capture_path()
            .traverse(TraversalSpec::out("linked").with_hops(HopRange::new(1, 4)))
            .unwrap()
            .project_path()
            .unwrap()
            .compile()
            .unwrap();

        assert!(q.cypher.contains("MATCH p0 = (n0)-[e0:linked*1..4]->(n1)"));
        assert!(q.cypher.ends_with("RETURN p0"));
        assert_eq!(q.result_type, ResultType::Path);
    }

    #[test]
    fn test_compile_determinism() {
        let ast = user_posts()
            .filter(Condition::eq("published", json!(true)))
            .unwrap()
            .order_by("created", false)
            .unwrap()
            .limit(20);

        let a = ast.compile().unwrap();
        let b = ast.compile().unwrap();
        assert_eq!(a.cypher, b.cypher);
        assert_eq!(a.params, b.params);
    }

    #[test]
    fn test_compile_leaves_builder_reusable() {
        let base = QueryAst::new().match_node("user");
        let original = base.compile().unwrap();

        let _extended = base
            .filter(Condition::eq("name", json!("Alice")))
            .unwrap()
            .compile()
            .unwrap();

        // the original cursor still compiles to its original text
        assert_eq!(base.compile().unwrap().cypher, original.cypher);
    }

    #[test]
    fn test_edge_where_scoped_to_edge_alias() {
        let q = QueryAst::new()
            .match_node("user")
            .traverse(
                TraversalSpec::out("rated")
                    .with_label("movie")
                    .with_edge_where(Condition::compare("stars", CompareOp::Gte, json!(4))),
            )
            .unwrap()
            .compile()
            .unwrap();

        assert!(q.cypher.contains("WHERE e0.stars >= $p0"));
    }
}
