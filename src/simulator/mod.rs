//! Execution simulation
//!
//! Walks a plan tree post-order and accumulates estimated runtime metrics
//! (CPU, I/O, memory, network) without touching any real data. Connector
//! models adjust the generic numbers for backend-specific behavior.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::plan::{
    AggregateAlgorithm, JoinAlgorithm, Operator, PhysicalHint, PlanNode, SortAlgorithm,
};

/// Row count assumed when a node carries no estimate
const DEFAULT_ROWS: i64 = 1000;

/// Rows per page for scan I/O
const ROWS_PER_PAGE: i64 = 100;

/// Run size for external sorting
const EXTERNAL_SORT_RUN_SIZE: i64 = 10_000;

/// Row threshold above which an unhinted sort spills to disk
const EXTERNAL_SORT_THRESHOLD: i64 = 100_000;

/// Fixed filter selectivity used by the simulator
const FILTER_SELECTIVITY: f64 = 0.3;

/// Simulated backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    Postgres,
    Mongo,
    Generic,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Connector::Postgres => "postgres",
            Connector::Mongo => "mongo",
            Connector::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Per-operator trace record, keyed by `<node_id>_<kind>` in the metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum OperatorTrace {
    Scan {
        table_name: String,
        rows_scanned: i64,
        pages_read: i64,
        scan_type: String,
    },
    Filter {
        input_rows: i64,
        output_rows: i64,
        selectivity: f64,
    },
    Project {
        input_rows: i64,
        output_rows: i64,
        projected_columns: usize,
    },
    Join {
        left_rows: i64,
        right_rows: i64,
        output_rows: i64,
        join_algorithm: String,
        join_type: String,
    },
    Aggregate {
        input_rows: i64,
        output_rows: i64,
        group_by_columns: usize,
        aggregate_functions: usize,
        algorithm: String,
    },
    Sort {
        input_rows: i64,
        output_rows: i64,
        sort_columns: usize,
        algorithm: String,
        runs_created: i64,
    },
    Limit {
        input_rows: i64,
        output_rows: i64,
        limit: Option<i64>,
        offset: Option<i64>,
        early_termination: bool,
    },
}

/// Estimated runtime metrics for one simulated execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Wall clock elapsed inside the simulation call
    pub execution_time: Duration,
    pub rows_processed: i64,
    pub rows_returned: i64,
    pub cpu_time: Duration,
    pub io_operations: i64,
    pub memory_used: i64,
    pub network_traffic: i64,
    pub operator_metrics: BTreeMap<String, OperatorTrace>,
    pub connector: Connector,
    pub simulation_only: bool,
}

impl ExecutionMetrics {
    fn new(connector: Connector) -> Self {
        Self {
            execution_time: Duration::ZERO,
            rows_processed: 0,
            rows_returned: 0,
            cpu_time: Duration::ZERO,
            io_operations: 0,
            memory_used: 0,
            network_traffic: 0,
            operator_metrics: BTreeMap::new(),
            connector,
            simulation_only: true,
        }
    }
}

/// Simulate executing a plan against a backend model
///
/// The `options` map is accepted for transport compatibility and currently
/// unused by every connector.
pub fn simulate_execution(
    plan: &PlanNode,
    connector: Connector,
    options: Option<&serde_json::Value>,
) -> Result<ExecutionMetrics> {
    let _ = options;
    let started = Instant::now();

    let mut metrics = ExecutionMetrics::new(connector);
    simulate_node(plan, &mut metrics)?;

    match connector {
        Connector::Postgres => apply_postgres_adjustments(plan, &mut metrics),
        Connector::Mongo => apply_mongo_adjustments(plan, &mut metrics),
        Connector::Generic => {}
    }

    metrics.execution_time = started.elapsed();
    debug!(
        connector = %connector,
        rows_returned = metrics.rows_returned,
        io_operations = metrics.io_operations,
        "simulation finished"
    );
    Ok(metrics)
}

/// Post-order accumulation: children first, then this node's contribution
fn simulate_node(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    for child in plan.children() {
        simulate_node(child, metrics)?;
    }

    match &plan.op {
        Operator::Scan { .. } => simulate_scan(plan, metrics),
        Operator::Filter { .. } => simulate_filter(plan, metrics),
        Operator::Project { .. } => simulate_project(plan, metrics),
        Operator::Join { .. } => simulate_join(plan, metrics),
        Operator::Aggregate { .. } => simulate_aggregate(plan, metrics),
        Operator::Sort { .. } => simulate_sort(plan, metrics),
        Operator::Limit { .. } => simulate_limit(plan, metrics),
        Operator::Union { .. } | Operator::Subquery { .. } => Err(Error::Unsupported(format!(
            "cannot simulate {} nodes",
            plan.op.name()
        ))),
    }
}

fn estimated_rows(node: &PlanNode) -> i64 {
    node.estimated_rows.unwrap_or(DEFAULT_ROWS)
}

fn input_rows(plan: &PlanNode) -> i64 {
    plan.children()
        .first()
        .map(|child| estimated_rows(child))
        .unwrap_or(DEFAULT_ROWS)
}

fn micros(us: f64) -> Duration {
    Duration::from_micros(us.max(0.0) as u64)
}

/// log2 clamped at 1 for degenerate inputs
fn log2(x: f64) -> f64 {
    if x <= 1.0 {
        1.0
    } else {
        x.log2()
    }
}

fn simulate_scan(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let Operator::Scan { table, .. } = &plan.op else {
        unreachable!("dispatched on scan")
    };

    let rows = estimated_rows(plan);
    let pages = (rows / ROWS_PER_PAGE).max(1);

    metrics.io_operations += pages;
    metrics.rows_processed += rows;
    metrics.rows_returned = rows;
    metrics.memory_used += rows * 100;
    metrics.cpu_time += micros(rows as f64 * 10.0);

    let scan_type = match &plan.physical {
        Some(PhysicalHint::Scan(strategy)) => strategy.as_str().to_string(),
        _ => "sequential".to_string(),
    };

    metrics.operator_metrics.insert(
        format!("{}_scan", plan.id),
        OperatorTrace::Scan {
            table_name: table.clone(),
            rows_scanned: rows,
            pages_read: pages,
            scan_type,
        },
    );

    Ok(())
}

fn simulate_filter(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let input = input_rows(plan);
    let output = (input as f64 * FILTER_SELECTIVITY) as i64;

    metrics.rows_processed += input;
    metrics.rows_returned = output;
    metrics.cpu_time += micros(input as f64 * 5.0);

    metrics.operator_metrics.insert(
        format!("{}_filter", plan.id),
        OperatorTrace::Filter {
            input_rows: input,
            output_rows: output,
            selectivity: FILTER_SELECTIVITY,
        },
    );

    Ok(())
}

fn simulate_project(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let Operator::Project { columns, .. } = &plan.op else {
        unreachable!("dispatched on project")
    };

    let input = input_rows(plan);

    metrics.rows_processed += input;
    metrics.rows_returned = input;
    metrics.cpu_time += micros(input as f64 * 2.0);

    metrics.operator_metrics.insert(
        format!("{}_project", plan.id),
        OperatorTrace::Project {
            input_rows: input,
            output_rows: input,
            projected_columns: columns.len(),
        },
    );

    Ok(())
}

fn simulate_join(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let Operator::Join {
        left,
        right,
        join_type,
        ..
    } = &plan.op
    else {
        unreachable!("dispatched on join")
    };

    let left_rows = estimated_rows(left);
    let right_rows = estimated_rows(right);

    let algorithm = match &plan.physical {
        Some(PhysicalHint::Join(algorithm)) => algorithm.clone(),
        _ => JoinAlgorithm::NestedLoop,
    };

    let output = (left_rows as f64 * right_rows as f64 * 0.1) as i64;
    let (cpu, memory) = match &algorithm {
        JoinAlgorithm::NestedLoop => (
            micros(left_rows as f64 * right_rows as f64 * 2.0),
            left_rows * 100,
        ),
        JoinAlgorithm::Hash { .. } => (
            micros((left_rows + right_rows) as f64 * 10.0),
            left_rows * 150,
        ),
        JoinAlgorithm::SortMerge => {
            let sort = left_rows as f64 * log2(left_rows as f64)
                + right_rows as f64 * log2(right_rows as f64);
            let merge = (left_rows + right_rows) as f64;
            (
                micros(sort * 5.0 + merge * 5.0),
                (left_rows + right_rows) * 100,
            )
        }
    };

    metrics.rows_processed += left_rows + right_rows;
    metrics.rows_returned = output;
    metrics.cpu_time += cpu;
    metrics.memory_used += memory;

    metrics.operator_metrics.insert(
        format!("{}_join", plan.id),
        OperatorTrace::Join {
            left_rows,
            right_rows,
            output_rows: output,
            join_algorithm: algorithm.as_str().to_string(),
            join_type: join_type.to_string(),
        },
    );

    Ok(())
}

fn simulate_aggregate(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let Operator::Aggregate {
        group_by,
        aggregates,
        ..
    } = &plan.op
    else {
        unreachable!("dispatched on aggregate")
    };

    let input = input_rows(plan);

    let output = if group_by.is_empty() {
        1
    } else {
        // Each grouping column shrinks the distinct count by 30 percent
        let mut groups = input as f64;
        for _ in group_by {
            groups *= 0.7;
        }
        (groups as i64).clamp(1, input.max(1))
    };

    let algorithm = match &plan.physical {
        Some(PhysicalHint::Aggregate(algorithm)) => *algorithm,
        _ => AggregateAlgorithm::Hash,
    };

    let (cpu, memory) = match algorithm {
        AggregateAlgorithm::Hash => (micros(input as f64 * 15.0), output * 200),
        AggregateAlgorithm::Sort => {
            let sort = input as f64 * log2(input as f64) * 10.0;
            let aggregate = input as f64 * 5.0;
            (micros(sort + aggregate), input * 100)
        }
    };

    metrics.rows_processed += input;
    metrics.rows_returned = output;
    metrics.cpu_time += cpu;
    metrics.memory_used += memory;

    metrics.operator_metrics.insert(
        format!("{}_aggregate", plan.id),
        OperatorTrace::Aggregate {
            input_rows: input,
            output_rows: output,
            group_by_columns: group_by.len(),
            aggregate_functions: aggregates.len(),
            algorithm: algorithm.as_str().to_string(),
        },
    );

    Ok(())
}

fn simulate_sort(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let Operator::Sort { order_by, .. } = &plan.op else {
        unreachable!("dispatched on sort")
    };

    let input = input_rows(plan);

    let algorithm = match &plan.physical {
        Some(PhysicalHint::Sort(algorithm)) => *algorithm,
        _ if input > EXTERNAL_SORT_THRESHOLD => SortAlgorithm::External,
        _ => SortAlgorithm::Quicksort,
    };

    let runs = (input + EXTERNAL_SORT_RUN_SIZE - 1) / EXTERNAL_SORT_RUN_SIZE;
    let (cpu, memory, io) = match algorithm {
        SortAlgorithm::Quicksort => (
            micros(input as f64 * log2(input as f64) * 20.0),
            input * 150,
            0,
        ),
        SortAlgorithm::External => {
            // Sort fixed-size runs, then merge passes over the whole input
            let sort_runs =
                runs as f64 * EXTERNAL_SORT_RUN_SIZE as f64 * log2(EXTERNAL_SORT_RUN_SIZE as f64);
            let merge = input as f64 * log2(runs as f64);
            (
                micros(sort_runs * 10.0 + merge * 5.0),
                EXTERNAL_SORT_RUN_SIZE * 150,
                input * 3 / 100,
            )
        }
    };

    metrics.rows_processed += input;
    metrics.rows_returned = input;
    metrics.cpu_time += cpu;
    metrics.memory_used += memory;
    metrics.io_operations += io;

    metrics.operator_metrics.insert(
        format!("{}_sort", plan.id),
        OperatorTrace::Sort {
            input_rows: input,
            output_rows: input,
            sort_columns: order_by.len(),
            algorithm: algorithm.as_str().to_string(),
            runs_created: runs,
        },
    );

    Ok(())
}

fn simulate_limit(plan: &PlanNode, metrics: &mut ExecutionMetrics) -> Result<()> {
    let Operator::Limit { limit, offset, .. } = &plan.op else {
        unreachable!("dispatched on limit")
    };

    let input = input_rows(plan);
    let mut output = input;

    match limit {
        Some(limit) => {
            if let Some(offset) = offset {
                let processed = (offset + limit).min(input);
                output = (processed - offset).max(0);
                metrics.rows_processed += processed;
            } else if *limit < input {
                output = *limit;
                metrics.rows_processed += *limit;
            } else {
                metrics.rows_processed += input;
            }
        }
        None => {
            metrics.rows_processed += input;
        }
    }

    // A token per-row charge over everything processed so far
    metrics.cpu_time += micros(metrics.rows_processed as f64);
    metrics.rows_returned = output;

    metrics.operator_metrics.insert(
        format!("{}_limit", plan.id),
        OperatorTrace::Limit {
            input_rows: input,
            output_rows: output,
            limit: *limit,
            offset: *offset,
            early_termination: output < input,
        },
    );

    Ok(())
}

// ============ Connector adjustments ============

/// Postgres: hash joins and aggregation are faster, scans benefit from the
/// buffer cache. Applied once per matching node.
fn apply_postgres_adjustments(plan: &PlanNode, metrics: &mut ExecutionMetrics) {
    match &plan.op {
        Operator::Join { .. } => {
            if matches!(
                &plan.physical,
                Some(PhysicalHint::Join(JoinAlgorithm::Hash { .. }))
            ) {
                metrics.cpu_time = metrics.cpu_time.mul_f64(0.85);
            }
        }
        Operator::Aggregate { .. } => {
            metrics.cpu_time = metrics.cpu_time.mul_f64(0.9);
        }
        Operator::Scan { .. } => {
            metrics.io_operations = (metrics.io_operations as f64 * 0.8) as i64;
        }
        _ => {}
    }

    for child in plan.children() {
        apply_postgres_adjustments(child, metrics);
    }
}

/// Mongo: every document crosses the wire, aggregation pipelines are cheap,
/// joins ($lookup) are expensive. Applied once per matching node.
fn apply_mongo_adjustments(plan: &PlanNode, metrics: &mut ExecutionMetrics) {
    match &plan.op {
        Operator::Scan { .. } => {
            metrics.network_traffic += metrics.rows_processed * 300;
        }
        Operator::Aggregate { .. } => {
            metrics.cpu_time = metrics.cpu_time.mul_f64(0.7);
        }
        Operator::Join { .. } => {
            metrics.cpu_time = metrics.cpu_time.mul_f64(1.3);
            metrics.network_traffic += metrics.rows_processed * 200;
        }
        _ => {}
    }

    for child in plan.children() {
        apply_mongo_adjustments(child, metrics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{
        AggregateExpr, AggregateKind, BinaryOp, ColumnRef, Expr, JoinCondition, JoinType,
        Predicate, SortKey, Value,
    };

    fn scan_with_rows(table: &str, rows: i64) -> PlanNode {
        let mut scan = PlanNode::scan(table, None);
        scan.estimated_rows = Some(rows);
        scan
    }

    #[test]
    fn test_scan_metrics() {
        let plan = scan_with_rows("users", 5000);
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();

        assert_eq!(metrics.rows_processed, 5000);
        assert_eq!(metrics.rows_returned, 5000);
        assert_eq!(metrics.io_operations, 50);
        assert_eq!(metrics.memory_used, 500_000);
        assert_eq!(metrics.cpu_time, Duration::from_micros(50_000));
        assert!(metrics.simulation_only);
    }

    #[test]
    fn test_scan_defaults_to_thousand_rows() {
        let plan = PlanNode::scan("users", None);
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        assert_eq!(metrics.rows_returned, 1000);
        assert_eq!(metrics.io_operations, 10);
    }

    #[test]
    fn test_filter_applies_fixed_selectivity() {
        let plan = PlanNode::filter(
            scan_with_rows("users", 1000),
            Predicate::new(Expr::binary(
                BinaryOp::Gt,
                Expr::column(None, "age"),
                Expr::literal(Value::Integer(30)),
            )),
        );
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        assert_eq!(metrics.rows_returned, 300);
    }

    #[test]
    fn test_join_algorithms_differ_in_cost() {
        let join = |hint| {
            let mut plan = PlanNode::join(
                scan_with_rows("a", 1000),
                scan_with_rows("b", 1000),
                JoinType::Inner,
                Some(JoinCondition::equi("a", "id", "b", "a_id")),
            );
            plan.physical = Some(PhysicalHint::Join(hint));
            plan
        };

        let nested = simulate_execution(
            &join(JoinAlgorithm::NestedLoop),
            Connector::Generic,
            None,
        )
        .unwrap();
        let hashed = simulate_execution(
            &join(JoinAlgorithm::Hash {
                build_side: crate::plan::BuildSide::Left,
            }),
            Connector::Generic,
            None,
        )
        .unwrap();

        // 2us per comparison dominates 10us per row at this size
        assert!(nested.cpu_time > hashed.cpu_time);
        assert_eq!(nested.rows_returned, 100_000);
        assert_eq!(hashed.rows_returned, 100_000);
        // Two scans at 100 bytes/row plus a 150 bytes/row build side
        assert_eq!(hashed.memory_used, 2 * 100_000 + 150_000);
    }

    #[test]
    fn test_aggregate_without_group_by_returns_one_row() {
        let plan = PlanNode::aggregate(
            scan_with_rows("orders", 2000),
            vec![],
            vec![AggregateExpr::new(AggregateKind::Count, None)],
        );
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        assert_eq!(metrics.rows_returned, 1);
    }

    #[test]
    fn test_aggregate_group_by_shrinks_output() {
        let plan = PlanNode::aggregate(
            scan_with_rows("orders", 1000),
            vec![ColumnRef::new("status"), ColumnRef::new("region")],
            vec![AggregateExpr::new(AggregateKind::Count, None)],
        );
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        // 1000 * 0.7 * 0.7
        assert_eq!(metrics.rows_returned, 489);
    }

    #[test]
    fn test_sort_quicksort_below_threshold() {
        let plan = PlanNode::sort(
            scan_with_rows("events", 50_000),
            vec![SortKey::asc(Expr::column(None, "ts"))],
        );
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();

        let trace = metrics
            .operator_metrics
            .values()
            .find_map(|t| match t {
                OperatorTrace::Sort { algorithm, .. } => Some(algorithm.clone()),
                _ => None,
            })
            .expect("sort trace");
        assert_eq!(trace, "quicksort");

        // The sort itself does no I/O; only the scan reads pages
        assert_eq!(metrics.io_operations, 500);
        assert_eq!(metrics.memory_used, 50_000 * 100 + 50_000 * 150);
    }

    #[test]
    fn test_sort_external_above_threshold() {
        let plan = PlanNode::sort(
            scan_with_rows("events", 500_000),
            vec![SortKey::asc(Expr::column(None, "ts"))],
        );
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();

        let (algorithm, runs) = metrics
            .operator_metrics
            .values()
            .find_map(|t| match t {
                OperatorTrace::Sort {
                    algorithm,
                    runs_created,
                    ..
                } => Some((algorithm.clone(), *runs_created)),
                _ => None,
            })
            .expect("sort trace");
        assert_eq!(algorithm, "external_sort");
        assert_eq!(runs, 50);

        // Scan pages plus 3 passes over the data
        assert_eq!(metrics.io_operations, 5000 + 15_000);
        // Run-sized sort buffer, not the whole input
        assert_eq!(metrics.memory_used, 500_000 * 100 + 10_000 * 150);
    }

    #[test]
    fn test_limit_with_offset() {
        let plan = PlanNode::limit(scan_with_rows("users", 1000), Some(100), Some(950));
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        // Only 50 rows remain past the offset
        assert_eq!(metrics.rows_returned, 50);
    }

    #[test]
    fn test_limit_larger_than_input() {
        let plan = PlanNode::limit(scan_with_rows("users", 1000), Some(5000), None);
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        assert_eq!(metrics.rows_returned, 1000);
    }

    #[test]
    fn test_scan_only_returns_cardinality() {
        let plan = scan_with_rows("users", 4321);
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();
        assert_eq!(metrics.rows_returned, 4321);
    }

    #[test]
    fn test_postgres_reduces_scan_io() {
        let plan = scan_with_rows("users", 5000);
        let generic = simulate_execution(&plan, Connector::Generic, None).unwrap();
        let postgres = simulate_execution(&plan, Connector::Postgres, None).unwrap();

        assert_eq!(generic.io_operations, 50);
        assert_eq!(postgres.io_operations, 40);
        assert_eq!(postgres.connector, Connector::Postgres);
    }

    #[test]
    fn test_postgres_speeds_up_hash_join() {
        let mut plan = PlanNode::join(
            scan_with_rows("a", 10_000),
            scan_with_rows("b", 10_000),
            JoinType::Inner,
            Some(JoinCondition::equi("a", "id", "b", "a_id")),
        );
        plan.physical = Some(PhysicalHint::Join(JoinAlgorithm::Hash {
            build_side: crate::plan::BuildSide::Left,
        }));

        let generic = simulate_execution(&plan, Connector::Generic, None).unwrap();
        let postgres = simulate_execution(&plan, Connector::Postgres, None).unwrap();
        assert!(postgres.cpu_time < generic.cpu_time);
    }

    #[test]
    fn test_mongo_adds_network_traffic() {
        let plan = scan_with_rows("users", 1000);
        let metrics = simulate_execution(&plan, Connector::Mongo, None).unwrap();
        assert_eq!(metrics.network_traffic, 1000 * 300);
        assert_eq!(metrics.connector, Connector::Mongo);
    }

    #[test]
    fn test_union_not_simulatable() {
        let plan = PlanNode::union(vec![
            PlanNode::scan("a", None),
            PlanNode::scan("b", None),
        ]);
        assert!(matches!(
            simulate_execution(&plan, Connector::Generic, None),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_operator_traces_keyed_by_node_id() {
        let plan = PlanNode::filter(
            scan_with_rows("users", 1000),
            Predicate::new(Expr::binary(
                BinaryOp::Gt,
                Expr::column(None, "age"),
                Expr::literal(Value::Integer(30)),
            )),
        );
        let metrics = simulate_execution(&plan, Connector::Generic, None).unwrap();

        assert!(metrics
            .operator_metrics
            .contains_key(&format!("{}_filter", plan.id)));
        let child_id = plan.children()[0].id;
        assert!(metrics
            .operator_metrics
            .contains_key(&format!("{}_scan", child_id)));
    }
}
