//! Query optimization
//!
//! Two strategies over the same plan algebra:
//!
//! ```text
//! PlanNode
//!   → RuleBasedOptimizer::optimize()   rewrite rules to a fixed point
//!   → CostBasedOptimizer::optimize()   rules + join-order search +
//!                                      physical selection + estimates
//! ```
//!
//! Both produce an [`ExplainResult`] tracing every rewrite with deep-cloned
//! before/after snapshots.

pub mod cost_based;
pub mod rules;

pub use cost_based::CostBasedOptimizer;
pub use rules::{
    ConstantFolding, JoinReordering, PredicatePushdown, ProjectionPushdown, RewriteRule,
    RuleBasedOptimizer,
};

use serde::{Deserialize, Serialize};

use crate::plan::PlanNode;

/// One recorded rewrite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationStep {
    pub rule_name: String,
    /// Snapshot of the root before the rewrite
    #[serde(rename = "before_plan")]
    pub before: PlanNode,
    /// Snapshot of the root after the rewrite
    #[serde(rename = "after_plan")]
    pub after: PlanNode,
    pub description: String,
}

/// Aggregate statistics over one optimization call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationStatistics {
    pub total_rules_applied: usize,
    /// Relative total-cost reduction against the input plan; 0 when either
    /// estimate is unavailable
    pub estimated_improvement: f64,
}

/// Trace of the rewrites applied during optimization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainResult {
    pub applied_rules: Vec<String>,
    pub steps: Vec<OptimizationStep>,
    pub statistics: OptimizationStatistics,
}

impl ExplainResult {
    /// Record one applied rewrite
    pub(crate) fn record(
        &mut self,
        rule_name: &str,
        before: PlanNode,
        after: PlanNode,
        description: String,
    ) {
        self.applied_rules.push(rule_name.to_string());
        self.steps.push(OptimizationStep {
            rule_name: rule_name.to_string(),
            before,
            after,
            description,
        });
    }
}
