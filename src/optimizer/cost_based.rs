//! Cost-based optimization
//!
//! Pipeline over one input plan:
//!
//! 1. rule-engine fixed point
//! 2. join-order enumeration over the plan's join-only region
//! 3. cost-guided child-swap pass over remaining joins
//! 4. physical operator selection
//! 5. bottom-up estimate propagation
//!
//! Per-node cost failures are absorbed: the affected subtree keeps whatever
//! estimate it already had.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::cost::{CostModel, SimpleCostModel};
use crate::enumerator::PlanEnumerator;
use crate::error::Result;
use crate::optimizer::{ExplainResult, RuleBasedOptimizer};
use crate::plan::{validate, AggregateAlgorithm, BuildSide, JoinAlgorithm, Operator, PhysicalHint,
    PlanNode, ScanStrategy, SortAlgorithm};

/// Row threshold below which both join inputs go through a nested loop
const NESTED_LOOP_THRESHOLD: i64 = 1000;

/// Row threshold above which both join inputs favor a sort-merge join
const SORT_MERGE_THRESHOLD: i64 = 1_000_000;

/// Output threshold below which aggregation hashes
const HASH_AGGREGATE_THRESHOLD: i64 = 10_000;

/// Input threshold below which sorting stays in memory
const QUICKSORT_THRESHOLD: i64 = 100_000;

/// Cost-based optimizer over a shared catalog
pub struct CostBasedOptimizer {
    catalog: Arc<Catalog>,
    cost_model: SimpleCostModel,
    rule_engine: RuleBasedOptimizer,
    max_plans: usize,
}

impl CostBasedOptimizer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            cost_model: SimpleCostModel::new(),
            rule_engine: RuleBasedOptimizer::new(),
            max_plans: crate::config::DEFAULT_MAX_QUERY_PLANS,
        }
    }

    /// Override the cap on plans costed during join-order enumeration
    #[must_use]
    pub fn with_max_plans(mut self, max_plans: usize) -> Self {
        self.max_plans = max_plans;
        self
    }

    /// Optimize a plan, returning the annotated result and its explain trace
    pub fn optimize(&self, plan: &PlanNode) -> Result<(PlanNode, ExplainResult)> {
        validate::validate(plan)?;

        let mut explain = ExplainResult::default();
        let input_cost = self.cost_model.estimate_cost(plan, &self.catalog).ok();

        let rule_optimized = self.rule_engine.run(plan, &mut explain)?;

        let mut current = self.enumerate_join_region(rule_optimized.clone(), &mut explain);
        current = self.optimize_join_order(current);
        current = self.select_physical_operators(current);
        self.propagate_estimates(&mut current);

        let final_cost = self.cost_model.estimate_cost(&current, &self.catalog).ok();
        let final_total = final_cost.as_ref().map(|c| c.total_cost).unwrap_or(0.0);

        explain.record(
            "CostBasedOptimization",
            rule_optimized,
            current.clone(),
            format!("Applied cost-based optimization (final cost: {:.2})", final_total),
        );
        explain.statistics.total_rules_applied = explain.applied_rules.len();
        explain.statistics.estimated_improvement = match (&input_cost, &final_cost) {
            (Some(before), Some(after)) if before.total_cost > 0.0 => {
                (before.total_cost - after.total_cost) / before.total_cost
            }
            _ => 0.0,
        };

        debug!(final_cost = final_total, "cost-based optimization finished");
        Ok((current, explain))
    }

    /// Find the topmost join-only region under a chain of unary operators
    /// and let the enumerator reorder it; the winning order replaces the
    /// region. Enumeration failures leave the plan untouched.
    fn enumerate_join_region(&self, plan: PlanNode, explain: &mut ExplainResult) -> PlanNode {
        let before = plan.clone();

        let (rewritten, outcome) = self.replace_join_region(plan);
        if let Some((strategy, best_cost)) = outcome {
            explain.record(
                "JoinOrderEnumeration",
                before,
                rewritten.clone(),
                format!(
                    "Enumerated join orders via {} (best cost: {:.2})",
                    strategy, best_cost
                ),
            );
        }

        rewritten
    }

    fn replace_join_region(
        &self,
        mut plan: PlanNode,
    ) -> (PlanNode, Option<(crate::enumerator::EnumerationStrategy, f64)>) {
        if matches!(plan.op, Operator::Join { .. }) && plan.is_join_only() {
            if plan.scan_tables().len() < 2 {
                return (plan, None);
            }
            let enumerator =
                PlanEnumerator::new(self.catalog.clone()).with_max_plans(self.max_plans);
            return match enumerator.enumerate(&plan) {
                Ok(result) => {
                    let outcome = Some((result.strategy, result.best_cost));
                    (result.best_plan, outcome)
                }
                Err(err) => {
                    warn!(error = %err, "join-order enumeration failed; keeping input order");
                    (plan, None)
                }
            };
        }

        // Descend through a unary chain looking for the join region
        let mut outcome = None;
        if plan.children().len() == 1 {
            if let Some(child) = plan.children_mut().pop() {
                let owned = std::mem::replace(child, PlanNode::scan(String::new(), None));
                let (rewritten, found) = self.replace_join_region(owned);
                *child = rewritten;
                outcome = found;
            }
        }
        (plan, outcome)
    }

    /// For every symmetric join, swap the children (and the condition's
    /// sides) when the swapped form costs less; recurse into children
    fn optimize_join_order(&self, plan: PlanNode) -> PlanNode {
        let plan = match plan.op {
            Operator::Join {
                left,
                right,
                join_type,
                condition,
            } if join_type.is_symmetric() => {
                let current = PlanNode::join(*left, *right, join_type, condition);
                let current_cost = self.cost_model.estimate_cost(&current, &self.catalog);

                let swapped = match &current.op {
                    Operator::Join {
                        left,
                        right,
                        join_type,
                        condition,
                    } => PlanNode::join(
                        (**right).clone(),
                        (**left).clone(),
                        *join_type,
                        condition.as_ref().map(|c| c.swapped()),
                    ),
                    _ => unreachable!("constructed as a join"),
                };
                let swapped_cost = self.cost_model.estimate_cost(&swapped, &self.catalog);

                match (current_cost, swapped_cost) {
                    (Ok(current_est), Ok(swapped_est))
                        if swapped_est.total_cost < current_est.total_cost =>
                    {
                        swapped
                    }
                    _ => current,
                }
            }
            op => PlanNode {
                id: plan.id,
                op,
                estimated_rows: plan.estimated_rows,
                estimated_cost: plan.estimated_cost,
                physical: plan.physical,
            },
        };

        plan.map_children(&mut |child| (self.optimize_join_order(child), false))
            .0
    }

    /// Stamp a physical operator choice onto every node that takes one
    fn select_physical_operators(&self, plan: PlanNode) -> PlanNode {
        let mut node = plan
            .map_children(&mut |child| (self.select_physical_operators(child), false))
            .0;

        let hint = match &node.op {
            Operator::Join { left, right, .. } => {
                let left_rows = self
                    .cost_model
                    .estimate_cardinality(left, &self.catalog)
                    .unwrap_or(crate::cost::DEFAULT_TABLE_ROWS);
                let right_rows = self
                    .cost_model
                    .estimate_cardinality(right, &self.catalog)
                    .unwrap_or(crate::cost::DEFAULT_TABLE_ROWS);

                let algorithm = if left_rows < NESTED_LOOP_THRESHOLD
                    && right_rows < NESTED_LOOP_THRESHOLD
                {
                    JoinAlgorithm::NestedLoop
                } else if left_rows > SORT_MERGE_THRESHOLD && right_rows > SORT_MERGE_THRESHOLD {
                    JoinAlgorithm::SortMerge
                } else {
                    JoinAlgorithm::Hash {
                        build_side: if left_rows < right_rows {
                            BuildSide::Left
                        } else {
                            BuildSide::Right
                        },
                    }
                };
                Some(PhysicalHint::Join(algorithm))
            }

            Operator::Aggregate { group_by, .. } => {
                let output_rows = self
                    .cost_model
                    .estimate_cardinality(&node, &self.catalog)
                    .unwrap_or(crate::cost::DEFAULT_TABLE_ROWS);
                let algorithm = if group_by.is_empty() || output_rows < HASH_AGGREGATE_THRESHOLD {
                    AggregateAlgorithm::Hash
                } else {
                    AggregateAlgorithm::Sort
                };
                Some(PhysicalHint::Aggregate(algorithm))
            }

            Operator::Sort { .. } => {
                let input_rows = self
                    .cost_model
                    .estimate_cardinality(&node, &self.catalog)
                    .unwrap_or(crate::cost::DEFAULT_TABLE_ROWS);
                let algorithm = if input_rows < QUICKSORT_THRESHOLD {
                    SortAlgorithm::Quicksort
                } else {
                    SortAlgorithm::External
                };
                Some(PhysicalHint::Sort(algorithm))
            }

            Operator::Scan { .. } => Some(PhysicalHint::Scan(ScanStrategy::Sequential)),

            _ => None,
        };

        if hint.is_some() {
            node.physical = hint;
        }
        node
    }

    /// Stamp estimated rows and cost bottom-up; nodes whose estimation
    /// fails keep their prior values
    fn propagate_estimates(&self, plan: &mut PlanNode) {
        for child in plan.children_mut() {
            self.propagate_estimates(child);
        }

        if let Ok(cost) = self.cost_model.estimate_cost(plan, &self.catalog) {
            plan.estimated_rows = Some(cost.cardinality);
            plan.estimated_cost = Some(cost.total_cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, TableSchema};
    use crate::plan::{
        BinaryOp, ColumnRef, Expr, JoinCondition, JoinType, Predicate, SortKey, Value,
    };

    fn test_catalog() -> Arc<Catalog> {
        let catalog = Catalog::new();
        catalog
            .add_table(
                TableSchema::new("small")
                    .column(Column::new("id", DataType::Int).nullable(false))
                    .row_count(100),
            )
            .unwrap();
        catalog
            .add_table(
                TableSchema::new("big")
                    .column(Column::new("id", DataType::Int).nullable(false))
                    .column(Column::new("small_id", DataType::Int))
                    .row_count(1_000_000),
            )
            .unwrap();
        catalog
            .add_table(
                TableSchema::new("customers")
                    .column(Column::new("id", DataType::Int).nullable(false))
                    .column(Column::new("age", DataType::Int).ndv(70))
                    .row_count(5000),
            )
            .unwrap();
        Arc::new(catalog)
    }

    #[test]
    fn test_estimates_stamped_on_every_node() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::filter(
            PlanNode::scan("customers", None),
            Predicate::new(Expr::binary(
                BinaryOp::Gt,
                Expr::qualified_column("customers", "age"),
                Expr::literal(Value::Integer(30)),
            )),
        );

        let (optimized, _) = optimizer.optimize(&plan).unwrap();
        assert_eq!(optimized.estimated_rows, Some(1650));
        assert!(optimized.estimated_cost.is_some());
        for child in optimized.children() {
            assert!(child.estimated_rows.is_some());
        }
    }

    #[test]
    fn test_small_side_becomes_outer() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::join(
            PlanNode::scan("big", None),
            PlanNode::scan("small", None),
            JoinType::Inner,
            Some(JoinCondition::equi("big", "id", "small", "big_id")),
        );

        let (optimized, _) = optimizer.optimize(&plan).unwrap();
        match &optimized.op {
            Operator::Join { left, .. } => {
                assert!(matches!(
                    &left.op,
                    Operator::Scan { table, .. } if table == "small"
                ));
            }
            other => panic!("expected a join, got {}", other.name()),
        }

        // Mid-sized inputs hash with the smaller side building
        assert!(matches!(
            &optimized.physical,
            Some(PhysicalHint::Join(JoinAlgorithm::Hash {
                build_side: BuildSide::Left
            }))
        ));
    }

    #[test]
    fn test_left_join_children_never_swapped() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::join(
            PlanNode::scan("big", None),
            PlanNode::scan("small", None),
            JoinType::Left,
            Some(JoinCondition::equi("big", "id", "small", "big_id")),
        );

        let (optimized, _) = optimizer.optimize(&plan).unwrap();
        match &optimized.op {
            Operator::Join { left, join_type, .. } => {
                assert_eq!(*join_type, JoinType::Left);
                assert!(matches!(
                    &left.op,
                    Operator::Scan { table, .. } if table == "big"
                ));
            }
            other => panic!("expected a join, got {}", other.name()),
        }
    }

    #[test]
    fn test_nested_loop_for_tiny_joins() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::join(
            PlanNode::scan("small", None),
            PlanNode::scan("small", None),
            JoinType::Inner,
            Some(JoinCondition::equi("small", "id", "small", "id")),
        );

        let (optimized, _) = optimizer.optimize(&plan).unwrap();
        assert!(matches!(
            &optimized.physical,
            Some(PhysicalHint::Join(JoinAlgorithm::NestedLoop))
        ));
    }

    #[test]
    fn test_aggregate_and_sort_hints() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::sort(
            PlanNode::aggregate(
                PlanNode::scan("customers", None),
                vec![ColumnRef::new("age")],
                vec![],
            ),
            vec![SortKey::asc(Expr::column(None, "age"))],
        );

        let (optimized, _) = optimizer.optimize(&plan).unwrap();
        assert!(matches!(
            &optimized.physical,
            Some(PhysicalHint::Sort(SortAlgorithm::Quicksort))
        ));
        let aggregate = optimized.children()[0];
        assert!(matches!(
            &aggregate.physical,
            Some(PhysicalHint::Aggregate(AggregateAlgorithm::Hash))
        ));
    }

    #[test]
    fn test_scan_stamped_sequential() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let (optimized, _) = optimizer.optimize(&PlanNode::scan("customers", None)).unwrap();
        assert!(matches!(
            &optimized.physical,
            Some(PhysicalHint::Scan(ScanStrategy::Sequential))
        ));
    }

    #[test]
    fn test_explain_ends_with_cost_step() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let (_, explain) = optimizer.optimize(&PlanNode::scan("customers", None)).unwrap();
        assert_eq!(
            explain.applied_rules.last().map(String::as_str),
            Some("CostBasedOptimization")
        );
        assert_eq!(
            explain.statistics.total_rules_applied,
            explain.applied_rules.len()
        );
    }

    #[test]
    fn test_scan_tables_preserved() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::project(
            PlanNode::join(
                PlanNode::scan("big", None),
                PlanNode::scan("small", None),
                JoinType::Inner,
                Some(JoinCondition::equi("big", "id", "small", "big_id")),
            ),
            vec![ColumnRef::wildcard()],
        );

        let (optimized, _) = optimizer.optimize(&plan).unwrap();
        let mut before: Vec<String> = plan.scan_tables();
        let mut after: Vec<String> = optimized.scan_tables();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_invalid_plan_rejected() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::scan("", None);
        assert!(matches!(
            optimizer.optimize(&plan),
            Err(crate::Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_join_region_under_projection_enumerated() {
        let catalog = test_catalog();
        let optimizer = CostBasedOptimizer::new(catalog);

        let plan = PlanNode::project(
            PlanNode::join(
                PlanNode::scan("big", None),
                PlanNode::scan("small", None),
                JoinType::Inner,
                Some(JoinCondition::equi("big", "id", "small", "big_id")),
            ),
            vec![ColumnRef::new("id")],
        );

        let (optimized, explain) = optimizer.optimize(&plan).unwrap();
        assert!(explain
            .applied_rules
            .iter()
            .any(|r| r == "JoinOrderEnumeration"));
        assert!(matches!(optimized.op, Operator::Project { .. }));
    }
}
