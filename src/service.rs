//! In-process operation surface
//!
//! [`OptimizerService`] bundles the shared catalog and configuration behind
//! the published operations: parse, optimize, simulate and catalog
//! administration. A thin transport layer is expected to sit on top; every
//! operation here is synchronous and returns the crate error taxonomy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{Catalog, Column, ColumnStatistics, TableSchema};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::optimizer::{CostBasedOptimizer, ExplainResult, RuleBasedOptimizer};
use crate::plan::{validate, PlanNode};
use crate::simulator::{self, Connector, ExecutionMetrics};

/// Query dialect accepted by [`OptimizerService::parse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sql,
    Mongo,
    Athena,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Sql => "sql",
            Dialect::Mongo => "mongo",
            Dialect::Athena => "athena",
        };
        f.write_str(name)
    }
}

/// Optimization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeStrategy {
    Rule,
    Cost,
}

/// Frontend seam: anything able to turn a query string into a plan
pub trait PlanParser: Send + Sync {
    fn parse(&self, query: &str) -> Result<PlanNode>;
}

/// Result of one optimize call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeOutcome {
    pub optimized_plan: PlanNode,
    pub explain: ExplainResult,
}

/// The published operations over shared state
pub struct OptimizerService {
    catalog: Arc<Catalog>,
    config: Config,
    parser: Option<Box<dyn PlanParser>>,
}

impl OptimizerService {
    /// Service over a fresh catalog
    pub fn new(config: Config) -> Self {
        Self {
            catalog: Arc::new(Catalog::new()),
            config,
            parser: None,
        }
    }

    /// Service over an existing shared catalog
    pub fn with_catalog(catalog: Arc<Catalog>, config: Config) -> Self {
        Self {
            catalog,
            config,
            parser: None,
        }
    }

    /// Install a SQL frontend
    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn PlanParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// The shared catalog
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Parse a query into a validated logical plan
    pub fn parse(&self, dialect: Dialect, query: &str) -> Result<PlanNode> {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("empty query".to_string()));
        }

        let plan = match dialect {
            Dialect::Sql => match &self.parser {
                Some(parser) => parser.parse(query)?,
                None => {
                    return Err(Error::Unsupported(
                        "no SQL frontend installed".to_string(),
                    ))
                }
            },
            Dialect::Mongo | Dialect::Athena => {
                return Err(Error::Unsupported(format!(
                    "{} parsing not yet implemented",
                    dialect
                )))
            }
        };

        validate::validate(&plan)?;
        Ok(plan)
    }

    /// Optimize a plan under the requested strategy
    pub fn optimize(&self, plan: &PlanNode, strategy: OptimizeStrategy) -> Result<OptimizeOutcome> {
        validate::validate(plan)?;

        let strategy = match strategy {
            // A disabled cost optimizer degrades to the rule strategy
            OptimizeStrategy::Cost if !self.config.enable_cost_based_optimizer => {
                OptimizeStrategy::Rule
            }
            other => other,
        };

        match strategy {
            OptimizeStrategy::Rule => {
                if !self.config.enable_rule_based_optimizer {
                    return Ok(OptimizeOutcome {
                        optimized_plan: plan.clone(),
                        explain: ExplainResult::default(),
                    });
                }
                let (optimized_plan, explain) = RuleBasedOptimizer::new().optimize(plan)?;
                Ok(OptimizeOutcome {
                    optimized_plan,
                    explain,
                })
            }
            OptimizeStrategy::Cost => {
                let optimizer = CostBasedOptimizer::new(self.catalog.clone())
                    .with_max_plans(self.config.max_query_plans);
                let (optimized_plan, explain) = optimizer.optimize(plan)?;
                Ok(OptimizeOutcome {
                    optimized_plan,
                    explain,
                })
            }
        }
    }

    /// Simulate executing a plan against a backend model
    pub fn simulate(
        &self,
        plan: &PlanNode,
        connector: Connector,
        options: Option<&serde_json::Value>,
    ) -> Result<ExecutionMetrics> {
        validate::validate(plan)?;
        simulator::simulate_execution(plan, connector, options)
    }

    // ============ Catalog administration ============

    /// Register a table
    pub fn add_table(&self, schema: TableSchema) -> Result<()> {
        if schema.name.is_empty() {
            return Err(Error::InvalidArgument("empty table name".to_string()));
        }
        info!(table = %schema.name, "adding table to catalog");
        self.catalog.add_table(schema)?;
        Ok(())
    }

    /// All registered table names
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.list_tables()
    }

    /// Snapshot of one table's schema and statistics
    pub fn get_table_stats(&self, name: &str) -> Result<TableSchema> {
        Ok(self.catalog.get_table(name)?)
    }

    /// Snapshot of one column's statistics
    pub fn get_column_stats(&self, table: &str, column: &str) -> Result<Column> {
        Ok(self.catalog.column_stats(table, column)?)
    }

    /// Update a table's row count and per-column statistics
    pub fn update_table_stats(
        &self,
        name: &str,
        row_count: i64,
        column_stats: &HashMap<String, ColumnStatistics>,
    ) -> Result<()> {
        self.catalog.update_stats(name, row_count, column_stats)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::plan::{ColumnRef, Operator};

    fn service() -> OptimizerService {
        let service = OptimizerService::new(Config::default());
        service
            .add_table(
                TableSchema::new("orders")
                    .column(Column::new("id", DataType::Int).nullable(false))
                    .row_count(2000),
            )
            .unwrap();
        service
    }

    #[test]
    fn test_parse_unsupported_dialects() {
        let service = service();
        assert!(matches!(
            service.parse(Dialect::Mongo, "{}"),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            service.parse(Dialect::Athena, "SELECT 1"),
            Err(Error::Unsupported(_))
        ));
        // No frontend installed
        assert!(matches!(
            service.parse(Dialect::Sql, "SELECT 1"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_parse_empty_query() {
        let service = service();
        assert!(matches!(
            service.parse(Dialect::Sql, "   "),
            Err(Error::InvalidArgument(_))
        ));
    }

    struct StubParser;

    impl PlanParser for StubParser {
        fn parse(&self, _query: &str) -> Result<PlanNode> {
            Ok(PlanNode::scan("orders", None))
        }
    }

    #[test]
    fn test_parse_with_installed_frontend() {
        let service = service().with_parser(Box::new(StubParser));
        let plan = service.parse(Dialect::Sql, "SELECT * FROM orders").unwrap();
        assert!(matches!(plan.op, Operator::Scan { .. }));
    }

    #[test]
    fn test_optimize_rule_strategy() {
        let service = service();
        let plan = PlanNode::project(
            PlanNode::scan("orders", None),
            vec![ColumnRef::wildcard()],
        );

        let outcome = service.optimize(&plan, OptimizeStrategy::Rule).unwrap();
        assert_eq!(outcome.optimized_plan.signature(), "scan:orders");
        assert!(outcome
            .explain
            .applied_rules
            .contains(&"ProjectionPushdown".to_string()));
    }

    #[test]
    fn test_optimize_cost_strategy_stamps_estimates() {
        let service = service();
        let plan = PlanNode::scan("orders", None);

        let outcome = service.optimize(&plan, OptimizeStrategy::Cost).unwrap();
        assert_eq!(outcome.optimized_plan.estimated_rows, Some(2000));
    }

    #[test]
    fn test_disabled_rule_optimizer_returns_input() {
        let config = Config {
            enable_rule_based_optimizer: false,
            ..Config::default()
        };
        let service = OptimizerService::new(config);

        let plan = PlanNode::project(
            PlanNode::scan("orders", None),
            vec![ColumnRef::wildcard()],
        );
        let outcome = service.optimize(&plan, OptimizeStrategy::Rule).unwrap();
        assert_eq!(outcome.optimized_plan.signature(), plan.signature());
        assert!(outcome.explain.applied_rules.is_empty());
    }

    #[test]
    fn test_disabled_cost_optimizer_degrades_to_rule() {
        let config = Config {
            enable_cost_based_optimizer: false,
            ..Config::default()
        };
        let service = OptimizerService::new(config);

        let plan = PlanNode::project(
            PlanNode::scan("orders", None),
            vec![ColumnRef::wildcard()],
        );
        let outcome = service.optimize(&plan, OptimizeStrategy::Cost).unwrap();
        // Rule rewrites ran, cost annotations did not
        assert_eq!(outcome.optimized_plan.signature(), "scan:orders");
        assert!(outcome.optimized_plan.estimated_cost.is_none());
    }

    #[test]
    fn test_simulate_via_service() {
        let service = service();
        let plan = PlanNode::scan("orders", None);
        let metrics = service
            .simulate(&plan, Connector::Postgres, None)
            .unwrap();
        assert_eq!(metrics.connector, Connector::Postgres);
        assert!(metrics.simulation_only);
    }

    #[test]
    fn test_catalog_errors_map_to_taxonomy() {
        let service = service();
        assert!(matches!(
            service.get_table_stats("missing"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.add_table(TableSchema::new("orders")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            service.update_table_stats("missing", 5, &HashMap::new()),
            Err(Error::NotFound(_))
        ));
    }
}
