//! Rewrite rules
//!
//! A rule consumes a plan and returns the rewritten plan plus a flag saying
//! whether anything structurally changed. The engine applies its rule list
//! top-down, repeating full passes until a fixed point or the iteration
//! bound.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::optimizer::ExplainResult;
use crate::plan::{ColumnRef, Operator, PlanNode, Predicate};

/// Upper bound on full rule passes
const MAX_ITERATIONS: usize = 10;

/// Tree-rewrite rule
pub trait RewriteRule: Send + Sync {
    /// Rule name as recorded in explain traces
    fn name(&self) -> &'static str;

    /// Apply the rule, returning the new plan and whether it changed.
    /// The changed flag is set only on actual structural change.
    fn apply(&self, plan: PlanNode) -> Result<(PlanNode, bool)>;
}

/// Fixed-point rule engine
pub struct RuleBasedOptimizer {
    rules: Vec<Box<dyn RewriteRule>>,
    max_iterations: usize,
}

impl Default for RuleBasedOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedOptimizer {
    /// Create an engine with the standard rule set
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(PredicatePushdown),
                Box::new(ProjectionPushdown),
                Box::new(ConstantFolding),
                Box::new(JoinReordering),
            ],
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Create an engine with a custom rule list
    pub fn with_rules(rules: Vec<Box<dyn RewriteRule>>) -> Self {
        Self {
            rules,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Names of the configured rules
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Optimize a plan, returning the result and the explain trace
    pub fn optimize(&self, plan: &PlanNode) -> Result<(PlanNode, ExplainResult)> {
        let mut explain = ExplainResult::default();
        let optimized = self.run(plan, &mut explain)?;
        Ok((optimized, explain))
    }

    /// Optimize into a caller-supplied trace; on error the trace keeps the
    /// progress made before the failing rule
    pub fn run(&self, plan: &PlanNode, explain: &mut ExplainResult) -> Result<PlanNode> {
        let mut current = plan.clone();

        for iteration in 0..self.max_iterations {
            let mut changed = false;

            for rule in &self.rules {
                let before = current.clone();
                let (next, applied) = rule
                    .apply(current)
                    .map_err(|e| Error::Internal(format!("rule {} failed: {}", rule.name(), e)))?;
                current = next;

                if applied {
                    debug!(rule = rule.name(), iteration, "rule applied");
                    explain.record(
                        rule.name(),
                        before,
                        current.clone(),
                        format!("Applied {} rule", rule.name()),
                    );
                    explain.statistics.total_rules_applied += 1;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        Ok(current)
    }
}

/// Push filter predicates below projections and join inputs
pub struct PredicatePushdown;

impl RewriteRule for PredicatePushdown {
    fn name(&self) -> &'static str {
        "PredicatePushdown"
    }

    fn apply(&self, plan: PlanNode) -> Result<(PlanNode, bool)> {
        Ok(Self::transform(plan))
    }
}

impl PredicatePushdown {
    fn transform(plan: PlanNode) -> (PlanNode, bool) {
        match plan.op {
            Operator::Filter { input, predicate } => {
                let child = *input;
                match child.op {
                    // Filter over a projection that neither renames nor
                    // computes the predicate's columns: swap them
                    Operator::Project {
                        input: inner,
                        columns,
                    } if Self::pushable_below_project(&predicate, &columns) => {
                        let filtered = PlanNode::filter(*inner, predicate);
                        let (node, _) = Self::transform(PlanNode::project(filtered, columns));
                        (node, true)
                    }

                    // Filter over a join: push single-side predicates below
                    // the side that produces their columns
                    Operator::Join {
                        left,
                        right,
                        join_type,
                        condition,
                    } => {
                        let left_names = left.visible_names();
                        let right_names = right.visible_names();

                        if Self::references_only(&predicate, &left_names) {
                            let filtered = PlanNode::filter(*left, predicate);
                            let (node, _) = Self::transform(PlanNode::join(
                                filtered, *right, join_type, condition,
                            ));
                            (node, true)
                        } else if Self::references_only(&predicate, &right_names) {
                            let filtered = PlanNode::filter(*right, predicate);
                            let (node, _) = Self::transform(PlanNode::join(
                                *left, filtered, join_type, condition,
                            ));
                            (node, true)
                        } else {
                            // Joint-side predicate stays above the join
                            let rebuilt =
                                PlanNode::join(*left, *right, join_type, condition);
                            let (child, changed) = Self::transform(rebuilt);
                            (PlanNode::filter(child, predicate), changed)
                        }
                    }

                    _ => {
                        let (child, changed) = Self::transform(child);
                        (PlanNode::filter(child, predicate), changed)
                    }
                }
            }

            op => {
                let node = PlanNode {
                    id: plan.id,
                    op,
                    estimated_rows: plan.estimated_rows,
                    estimated_cost: plan.estimated_cost,
                    physical: plan.physical,
                };
                node.map_children(&mut Self::transform)
            }
        }
    }

    /// A predicate can move below a projection when every column it
    /// references passes through unrenamed (or the projection is `*`)
    fn pushable_below_project(predicate: &Predicate, columns: &[ColumnRef]) -> bool {
        predicate.referenced_columns().iter().all(|needed| {
            columns.iter().any(|proj| {
                if proj.is_wildcard() {
                    return true;
                }
                if proj.alias.is_some() {
                    return false;
                }
                proj.name == needed.name
                    && match (&proj.table, &needed.table) {
                        (Some(p), Some(n)) => p == n,
                        _ => true,
                    }
            })
        })
    }

    /// A predicate belongs to one join side when all its columns are
    /// qualified and every qualifier resolves within that side
    fn references_only(predicate: &Predicate, names: &HashSet<String>) -> bool {
        let columns = predicate.referenced_columns();
        !columns.is_empty()
            && columns.iter().all(|col| {
                col.table
                    .as_ref()
                    .is_some_and(|qualifier| names.contains(qualifier))
            })
    }
}

/// Remove identity projections
pub struct ProjectionPushdown;

impl RewriteRule for ProjectionPushdown {
    fn name(&self) -> &'static str {
        "ProjectionPushdown"
    }

    fn apply(&self, plan: PlanNode) -> Result<(PlanNode, bool)> {
        Ok(Self::transform(plan))
    }
}

impl ProjectionPushdown {
    fn transform(plan: PlanNode) -> (PlanNode, bool) {
        if let Operator::Project { input, columns } = plan.op {
            if Self::is_identity(&columns) {
                let (child, _) = Self::transform(*input);
                return (child, true);
            }
            let (child, changed) = Self::transform(*input);
            return (PlanNode::project(child, columns), changed);
        }

        plan.map_children(&mut Self::transform)
    }

    /// A projection of just `*` adds nothing
    fn is_identity(columns: &[ColumnRef]) -> bool {
        columns.len() == 1 && columns[0].is_wildcard() && columns[0].alias.is_none()
    }
}

/// Fold constant expressions; declared in the rule set, currently inert
pub struct ConstantFolding;

impl RewriteRule for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn apply(&self, plan: PlanNode) -> Result<(PlanNode, bool)> {
        Ok((plan, false))
    }
}

/// Reorder joins; inert here, join ordering is cost-based
pub struct JoinReordering;

impl RewriteRule for JoinReordering {
    fn name(&self) -> &'static str {
        "JoinReordering"
    }

    fn apply(&self, plan: PlanNode) -> Result<(PlanNode, bool)> {
        Ok((plan, false))
    }
}
