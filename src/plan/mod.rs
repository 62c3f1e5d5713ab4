//! Logical plan algebra
//!
//! Plans are trees of operator nodes. Each node is owned exclusively by its
//! parent, so arity and no-sharing invariants hold by construction. Cloning
//! a node deep-copies the whole subtree and assigns fresh node ids.

pub mod display;
pub mod expr;
pub mod validate;
pub mod visitor;

pub use expr::{
    AggregateExpr, AggregateKind, BinaryOp, ColumnRef, Expr, JoinCondition, Predicate, SortKey,
    Value,
};
pub use visitor::PlanVisitor;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-node tag, unique within a process
///
/// Ids correlate nodes across explain steps and UI renderings; they carry no
/// structural meaning and never participate in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh id
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Keep the global counter ahead of an externally supplied id
    fn ensure_ahead(n: u64) {
        NEXT_NODE_ID.fetch_max(n + 1, Ordering::Relaxed);
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let n = s
            .strip_prefix("node_")
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| D::Error::custom(format!("invalid node id '{}'", s)))?;
        NodeId::ensure_ahead(n);
        Ok(NodeId(n))
    }
}

/// JOIN type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    /// Join types whose children may be swapped without changing semantics
    /// (provided the condition's sides are swapped in kind)
    pub fn is_symmetric(&self) -> bool {
        matches!(self, JoinType::Inner | JoinType::Cross | JoinType::Full)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
            JoinType::Cross => "cross",
        };
        f.write_str(name)
    }
}

/// Hash join build side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSide {
    Left,
    Right,
}

impl fmt::Display for BuildSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildSide::Left => f.write_str("left"),
            BuildSide::Right => f.write_str("right"),
        }
    }
}

/// Physical join algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinAlgorithm {
    NestedLoop,
    Hash { build_side: BuildSide },
    SortMerge,
}

impl JoinAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinAlgorithm::NestedLoop => "nested_loop_join",
            JoinAlgorithm::Hash { .. } => "hash_join",
            JoinAlgorithm::SortMerge => "sort_merge_join",
        }
    }
}

/// Physical aggregation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateAlgorithm {
    Hash,
    Sort,
}

impl AggregateAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateAlgorithm::Hash => "hash_aggregate",
            AggregateAlgorithm::Sort => "sort_aggregate",
        }
    }
}

/// Physical sort algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortAlgorithm {
    Quicksort,
    External,
}

impl SortAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortAlgorithm::Quicksort => "quicksort",
            SortAlgorithm::External => "external_sort",
        }
    }
}

/// Scan access path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    Sequential,
    Index { index_name: String },
}

impl ScanStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStrategy::Sequential => "sequential",
            ScanStrategy::Index { .. } => "index",
        }
    }
}

/// Physical operator choice stamped onto a logical node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalHint {
    Join(JoinAlgorithm),
    Aggregate(AggregateAlgorithm),
    Sort(SortAlgorithm),
    Scan(ScanStrategy),
}

impl PhysicalHint {
    /// Project the hint as a JSON object with the conventional metadata keys
    /// (`physical_operator`, `build_side`, `scan_type`, `index_name`)
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        match self {
            PhysicalHint::Join(alg) => {
                map.insert("physical_operator".into(), alg.as_str().into());
                if let JoinAlgorithm::Hash { build_side } = alg {
                    map.insert("build_side".into(), build_side.to_string().into());
                }
            }
            PhysicalHint::Aggregate(alg) => {
                map.insert("physical_operator".into(), alg.as_str().into());
            }
            PhysicalHint::Sort(alg) => {
                map.insert("physical_operator".into(), alg.as_str().into());
            }
            PhysicalHint::Scan(strategy) => {
                map.insert("scan_type".into(), strategy.as_str().into());
                if let ScanStrategy::Index { index_name } = strategy {
                    map.insert("index_name".into(), index_name.clone().into());
                }
            }
        }
        map
    }
}

/// Operator variant with its payload and children
///
/// Plan equality, where the enumerator needs it, is structural via
/// [`PlanNode::signature`]; nodes themselves are not `PartialEq` because a
/// fresh id is part of every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "lowercase")]
pub enum Operator {
    /// Leaf table scan
    Scan {
        #[serde(rename = "table_name")]
        table: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },

    /// Filter rows by a predicate
    Filter {
        input: Box<PlanNode>,
        predicate: Predicate,
    },

    /// Project columns
    Project {
        input: Box<PlanNode>,
        columns: Vec<ColumnRef>,
    },

    /// Join two inputs; order is semantically meaningful for non-inner joins
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        join_type: JoinType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<JoinCondition>,
    },

    /// Aggregate with optional grouping
    Aggregate {
        input: Box<PlanNode>,
        group_by: Vec<ColumnRef>,
        aggregates: Vec<AggregateExpr>,
    },

    /// Sort rows
    Sort {
        input: Box<PlanNode>,
        order_by: Vec<SortKey>,
    },

    /// Limit rows returned
    Limit {
        input: Box<PlanNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<i64>,
    },

    /// Set union; reserved, not implemented by the core algorithms
    Union { inputs: Vec<PlanNode> },

    /// Subquery wrapper; reserved, not implemented by the core algorithms
    Subquery { input: Box<PlanNode> },
}

impl Operator {
    /// Variant name as used in signatures and pretty output
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Scan { .. } => "scan",
            Operator::Filter { .. } => "filter",
            Operator::Project { .. } => "project",
            Operator::Join { .. } => "join",
            Operator::Aggregate { .. } => "aggregate",
            Operator::Sort { .. } => "sort",
            Operator::Limit { .. } => "limit",
            Operator::Union { .. } => "union",
            Operator::Subquery { .. } => "subquery",
        }
    }
}

/// Logical plan node
///
/// `estimated_rows` and `estimated_cost` are stamped by the optimizer;
/// `physical` records the physical operator choice.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<PhysicalHint>,
}

/// Clone deep-copies the subtree and assigns fresh node ids throughout.
impl Clone for PlanNode {
    fn clone(&self) -> Self {
        PlanNode {
            id: NodeId::fresh(),
            op: self.op.clone(),
            estimated_rows: self.estimated_rows,
            estimated_cost: self.estimated_cost,
            physical: self.physical.clone(),
        }
    }
}

impl PlanNode {
    fn new(op: Operator) -> Self {
        Self {
            id: NodeId::fresh(),
            op,
            estimated_rows: None,
            estimated_cost: None,
            physical: None,
        }
    }

    /// Table scan leaf
    pub fn scan(table: impl Into<String>, alias: Option<String>) -> Self {
        Self::new(Operator::Scan {
            table: table.into(),
            alias,
        })
    }

    /// Filter over a child
    pub fn filter(input: PlanNode, predicate: Predicate) -> Self {
        Self::new(Operator::Filter {
            input: Box::new(input),
            predicate,
        })
    }

    /// Projection over a child
    pub fn project(input: PlanNode, columns: Vec<ColumnRef>) -> Self {
        Self::new(Operator::Project {
            input: Box::new(input),
            columns,
        })
    }

    /// Join of two children, left then right
    pub fn join(
        left: PlanNode,
        right: PlanNode,
        join_type: JoinType,
        condition: Option<JoinCondition>,
    ) -> Self {
        Self::new(Operator::Join {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            condition,
        })
    }

    /// Aggregate over a child
    pub fn aggregate(
        input: PlanNode,
        group_by: Vec<ColumnRef>,
        aggregates: Vec<AggregateExpr>,
    ) -> Self {
        Self::new(Operator::Aggregate {
            input: Box::new(input),
            group_by,
            aggregates,
        })
    }

    /// Sort over a child
    pub fn sort(input: PlanNode, order_by: Vec<SortKey>) -> Self {
        Self::new(Operator::Sort {
            input: Box::new(input),
            order_by,
        })
    }

    /// Limit/offset over a child
    pub fn limit(input: PlanNode, limit: Option<i64>, offset: Option<i64>) -> Self {
        Self::new(Operator::Limit {
            input: Box::new(input),
            limit,
            offset,
        })
    }

    /// Union of inputs (reserved)
    pub fn union(inputs: Vec<PlanNode>) -> Self {
        Self::new(Operator::Union { inputs })
    }

    /// Subquery wrapper (reserved)
    pub fn subquery(input: PlanNode) -> Self {
        Self::new(Operator::Subquery {
            input: Box::new(input),
        })
    }

    /// Children in order
    pub fn children(&self) -> Vec<&PlanNode> {
        match &self.op {
            Operator::Scan { .. } => vec![],
            Operator::Filter { input, .. }
            | Operator::Project { input, .. }
            | Operator::Aggregate { input, .. }
            | Operator::Sort { input, .. }
            | Operator::Limit { input, .. }
            | Operator::Subquery { input } => vec![input],
            Operator::Join { left, right, .. } => vec![left, right],
            Operator::Union { inputs } => inputs.iter().collect(),
        }
    }

    /// Mutable children in order
    pub fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        match &mut self.op {
            Operator::Scan { .. } => vec![],
            Operator::Filter { input, .. }
            | Operator::Project { input, .. }
            | Operator::Aggregate { input, .. }
            | Operator::Sort { input, .. }
            | Operator::Limit { input, .. }
            | Operator::Subquery { input } => vec![input],
            Operator::Join { left, right, .. } => vec![left, right],
            Operator::Union { inputs } => inputs.iter_mut().collect(),
        }
    }

    /// Rebuild this node with each child passed through `f`, preserving the
    /// node's id, estimates and physical hint. Returns the rebuilt node and
    /// whether any child reported a change.
    pub fn map_children<F>(self, f: &mut F) -> (PlanNode, bool)
    where
        F: FnMut(PlanNode) -> (PlanNode, bool),
    {
        let PlanNode {
            id,
            op,
            estimated_rows,
            estimated_cost,
            physical,
        } = self;

        let mut changed = false;
        let op = match op {
            leaf @ Operator::Scan { .. } => leaf,
            Operator::Filter { input, predicate } => {
                let (child, c) = f(*input);
                changed |= c;
                Operator::Filter {
                    input: Box::new(child),
                    predicate,
                }
            }
            Operator::Project { input, columns } => {
                let (child, c) = f(*input);
                changed |= c;
                Operator::Project {
                    input: Box::new(child),
                    columns,
                }
            }
            Operator::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                let (left, cl) = f(*left);
                let (right, cr) = f(*right);
                changed |= cl | cr;
                Operator::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    join_type,
                    condition,
                }
            }
            Operator::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                let (child, c) = f(*input);
                changed |= c;
                Operator::Aggregate {
                    input: Box::new(child),
                    group_by,
                    aggregates,
                }
            }
            Operator::Sort { input, order_by } => {
                let (child, c) = f(*input);
                changed |= c;
                Operator::Sort {
                    input: Box::new(child),
                    order_by,
                }
            }
            Operator::Limit {
                input,
                limit,
                offset,
            } => {
                let (child, c) = f(*input);
                changed |= c;
                Operator::Limit {
                    input: Box::new(child),
                    limit,
                    offset,
                }
            }
            Operator::Union { inputs } => {
                let mut mapped = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let (child, c) = f(input);
                    changed |= c;
                    mapped.push(child);
                }
                Operator::Union { inputs: mapped }
            }
            Operator::Subquery { input } => {
                let (child, c) = f(*input);
                changed |= c;
                Operator::Subquery {
                    input: Box::new(child),
                }
            }
        };

        (
            PlanNode {
                id,
                op,
                estimated_rows,
                estimated_cost,
                physical,
            },
            changed,
        )
    }

    /// Canonical structural signature: variant tag, table name for scans,
    /// then parenthesized child signatures in order. Used for deduplication
    /// during enumeration; node ids never participate.
    pub fn signature(&self) -> String {
        let mut sig = String::from(self.op.name());
        if let Operator::Scan { table, .. } = &self.op {
            sig.push(':');
            sig.push_str(table);
        }
        for child in self.children() {
            sig.push('(');
            sig.push_str(&child.signature());
            sig.push(')');
        }
        sig
    }

    /// Distinct table names scanned in this subtree, in first-seen order
    pub fn scan_tables(&self) -> Vec<String> {
        let mut tables = Vec::new();
        let mut seen = HashSet::new();
        self.collect_scan_tables(&mut tables, &mut seen);
        tables
    }

    fn collect_scan_tables(&self, tables: &mut Vec<String>, seen: &mut HashSet<String>) {
        if let Operator::Scan { table, .. } = &self.op {
            if seen.insert(table.clone()) {
                tables.push(table.clone());
            }
        }
        for child in self.children() {
            child.collect_scan_tables(tables, seen);
        }
    }

    /// Table names and aliases visible from scans in this subtree
    pub fn visible_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        self.collect_visible_names(&mut names);
        names
    }

    fn collect_visible_names(&self, names: &mut HashSet<String>) {
        if let Operator::Scan { table, alias } = &self.op {
            names.insert(table.clone());
            if let Some(alias) = alias {
                names.insert(alias.clone());
            }
        }
        for child in self.children() {
            child.collect_visible_names(names);
        }
    }

    /// Check whether a table is scanned anywhere in this subtree
    pub fn contains_table(&self, table: &str) -> bool {
        if let Operator::Scan { table: t, .. } = &self.op {
            if t == table {
                return true;
            }
        }
        self.children().iter().any(|c| c.contains_table(table))
    }

    /// Check whether the subtree consists solely of Join and Scan nodes
    pub fn is_join_only(&self) -> bool {
        match &self.op {
            Operator::Scan { .. } => true,
            Operator::Join { left, right, .. } => left.is_join_only() && right.is_join_only(),
            _ => false,
        }
    }

    /// Metadata projection of the physical hint for external JSON surfaces
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        self.physical
            .as_ref()
            .map(|hint| hint.metadata())
            .unwrap_or_default()
    }
}
