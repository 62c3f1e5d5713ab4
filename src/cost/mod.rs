//! Cost model
//!
//! Bottom-up cardinality and cost estimation over plan trees. Costs are a
//! five-way tuple (total, cpu, io, network, memory) in abstract units;
//! cardinalities are signed 64-bit row counts.

use serde::{Deserialize, Serialize};

use crate::catalog::stats::operator_selectivity;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::plan::{JoinType, Operator, PlanNode, Predicate};

/// Row count assumed for tables the catalog does not know
pub const DEFAULT_TABLE_ROWS: i64 = 1000;

/// Rows per page for I/O estimation
const ROWS_PER_PAGE: f64 = 100.0;

/// Cost estimate for a plan subtree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_cost: f64,
    pub cpu_cost: f64,
    pub io_cost: f64,
    pub network_cost: f64,
    pub memory_cost: f64,
    pub cardinality: i64,
}

/// Cost model over logical plan trees
pub trait CostModel: Send + Sync {
    /// Estimate the full cost of executing a plan subtree
    fn estimate_cost(&self, plan: &PlanNode, catalog: &Catalog) -> Result<CostEstimate>;

    /// Estimate the number of rows a plan subtree produces
    fn estimate_cardinality(&self, plan: &PlanNode, catalog: &Catalog) -> Result<i64>;
}

/// Textbook cost model with fixed per-operator constants
#[derive(Debug, Clone)]
pub struct SimpleCostModel {
    /// Cost of reading one page sequentially
    pub seq_page_cost: f64,
    /// Cost of reading one page at random
    pub random_page_cost: f64,
    /// CPU cost of handling one tuple
    pub cpu_tuple_cost: f64,
    /// Multiplier on join comparison work
    pub join_factor: f64,
    /// Multiplier on sort comparison work
    pub sort_factor: f64,
    /// Multiplier on hash table work
    pub hash_factor: f64,
}

impl Default for SimpleCostModel {
    fn default() -> Self {
        Self {
            seq_page_cost: 1.0,
            random_page_cost: 4.0,
            cpu_tuple_cost: 0.01,
            join_factor: 1.5,
            sort_factor: 2.0,
            hash_factor: 1.2,
        }
    }
}

impl SimpleCostModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selectivity of a filter predicate from its top operator
    fn predicate_selectivity(&self, predicate: &Predicate) -> f64 {
        match predicate.top_operator() {
            Some(op) => operator_selectivity(op),
            None => 0.5,
        }
    }

    fn scan_cost(&self, table: &str, catalog: &Catalog) -> CostEstimate {
        let Ok(schema) = catalog.get_table(table) else {
            // Unknown table: a flat pessimistic default
            return CostEstimate {
                total_cost: 1000.0,
                cpu_cost: 200.0,
                io_cost: 800.0,
                network_cost: 0.0,
                memory_cost: 0.0,
                cardinality: DEFAULT_TABLE_ROWS,
            };
        };

        let pages = (schema.row_count as f64 / ROWS_PER_PAGE).max(1.0);
        let io_cost = pages * self.seq_page_cost;
        let cpu_cost = schema.row_count as f64 * self.cpu_tuple_cost;

        CostEstimate {
            total_cost: io_cost + cpu_cost,
            cpu_cost,
            io_cost,
            network_cost: 0.0,
            memory_cost: 0.0,
            cardinality: schema.row_count,
        }
    }
}

impl CostModel for SimpleCostModel {
    fn estimate_cardinality(&self, plan: &PlanNode, catalog: &Catalog) -> Result<i64> {
        let cardinality = match &plan.op {
            Operator::Scan { table, .. } => match catalog.get_table(table) {
                Ok(schema) => schema.row_count,
                Err(_) => DEFAULT_TABLE_ROWS,
            },

            Operator::Filter { input, predicate } => {
                let child = self.estimate_cardinality(input, catalog)?;
                let selectivity = self.predicate_selectivity(predicate);
                (child as f64 * selectivity) as i64
            }

            Operator::Project { input, .. } => self.estimate_cardinality(input, catalog)?,

            Operator::Join {
                left,
                right,
                join_type,
                ..
            } => {
                let left_card = self.estimate_cardinality(left, catalog)?;
                let right_card = self.estimate_cardinality(right, catalog)?;
                match join_type {
                    JoinType::Cross => left_card.saturating_mul(right_card),
                    JoinType::Inner => {
                        (left_card.saturating_mul(right_card) as f64 * 0.1) as i64
                    }
                    JoinType::Left => left_card,
                    JoinType::Right => right_card,
                    JoinType::Full => left_card.saturating_add(right_card),
                }
            }

            Operator::Aggregate {
                input, group_by, ..
            } => {
                if group_by.is_empty() {
                    1
                } else {
                    let child = self.estimate_cardinality(input, catalog)?;
                    ((child as f64 * 0.1) as i64).clamp(1, child.max(1))
                }
            }

            Operator::Sort { input, .. } => self.estimate_cardinality(input, catalog)?,

            Operator::Limit { input, limit, .. } => {
                let child = self.estimate_cardinality(input, catalog)?;
                match limit {
                    Some(limit) => child.min(*limit),
                    None => child,
                }
            }

            // Reserved variants get the flat default
            Operator::Union { .. } | Operator::Subquery { .. } => DEFAULT_TABLE_ROWS,
        };

        Ok(cardinality)
    }

    fn estimate_cost(&self, plan: &PlanNode, catalog: &Catalog) -> Result<CostEstimate> {
        let estimate = match &plan.op {
            Operator::Scan { table, .. } => self.scan_cost(table, catalog),

            Operator::Filter { input, predicate } => {
                let child = self.estimate_cost(input, catalog)?;
                let selectivity = self.predicate_selectivity(predicate);
                let filter_cpu = child.cardinality as f64 * self.cpu_tuple_cost * 0.5;

                CostEstimate {
                    total_cost: child.total_cost + filter_cpu,
                    cpu_cost: child.cpu_cost + filter_cpu,
                    cardinality: (child.cardinality as f64 * selectivity) as i64,
                    ..child
                }
            }

            Operator::Project { input, .. } => {
                let child = self.estimate_cost(input, catalog)?;
                let project_cpu = child.cardinality as f64 * self.cpu_tuple_cost * 0.1;

                CostEstimate {
                    total_cost: child.total_cost + project_cpu,
                    cpu_cost: child.cpu_cost + project_cpu,
                    ..child
                }
            }

            Operator::Join { left, right, .. } => {
                let left_cost = self.estimate_cost(left, catalog)?;
                let right_cost = self.estimate_cost(right, catalog)?;

                // The product before selectivity, so orders that shrink
                // intermediate results are preferred
                let join_cpu = left_cost.cardinality as f64
                    * right_cost.cardinality as f64
                    * self.cpu_tuple_cost
                    * self.join_factor;

                CostEstimate {
                    total_cost: left_cost.total_cost + right_cost.total_cost + join_cpu,
                    cpu_cost: left_cost.cpu_cost + right_cost.cpu_cost + join_cpu,
                    io_cost: left_cost.io_cost + right_cost.io_cost,
                    network_cost: left_cost.network_cost + right_cost.network_cost,
                    memory_cost: left_cost.memory_cost + right_cost.memory_cost,
                    cardinality: self.estimate_cardinality(plan, catalog)?,
                }
            }

            Operator::Aggregate { input, .. } => {
                let child = self.estimate_cost(input, catalog)?;
                let agg_cpu = child.cardinality as f64 * self.cpu_tuple_cost * self.hash_factor;

                CostEstimate {
                    total_cost: child.total_cost + agg_cpu,
                    cpu_cost: child.cpu_cost + agg_cpu,
                    memory_cost: child.memory_cost + child.cardinality as f64 * 0.1,
                    cardinality: self.estimate_cardinality(plan, catalog)?,
                    ..child
                }
            }

            Operator::Sort { input, .. } => {
                let child = self.estimate_cost(input, catalog)?;
                if child.cardinality <= 1 {
                    return Ok(child);
                }

                let n = child.cardinality as f64;
                let sort_cpu = n * n.log2() * self.cpu_tuple_cost * self.sort_factor;

                CostEstimate {
                    total_cost: child.total_cost + sort_cpu,
                    cpu_cost: child.cpu_cost + sort_cpu,
                    memory_cost: child.memory_cost + n * 0.2,
                    ..child
                }
            }

            Operator::Limit { input, limit, .. } => {
                let child = self.estimate_cost(input, catalog)?;
                let cardinality = self.estimate_cardinality(plan, catalog)?;

                match limit {
                    Some(limit) if *limit < child.cardinality => {
                        // Early termination scales the whole child cost
                        let fraction = *limit as f64 / child.cardinality as f64;
                        CostEstimate {
                            total_cost: child.total_cost * fraction,
                            cpu_cost: child.cpu_cost * fraction,
                            io_cost: child.io_cost * fraction,
                            network_cost: child.network_cost * fraction,
                            memory_cost: child.memory_cost * fraction,
                            cardinality,
                        }
                    }
                    _ => child,
                }
            }

            Operator::Union { .. } | Operator::Subquery { .. } => {
                let cardinality = self.estimate_cardinality(plan, catalog)?;
                let cpu_cost = cardinality as f64 * self.cpu_tuple_cost;
                CostEstimate {
                    total_cost: cpu_cost,
                    cpu_cost,
                    cardinality,
                    ..Default::default()
                }
            }
        };

        Ok(estimate)
    }
}
