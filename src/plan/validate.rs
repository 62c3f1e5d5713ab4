//! Structural validity checks for plan trees
//!
//! Variant arity and exclusive child ownership are guaranteed by the type
//! shape; what remains is field-level validity: non-empty names, sensible
//! limits, aggregate arguments.

use crate::error::{Error, Result};
use crate::plan::{AggregateKind, Operator, PlanNode};

/// Check a plan tree for structural validity
///
/// Returns `InvalidArgument` on the first violation found.
pub fn validate(plan: &PlanNode) -> Result<()> {
    match &plan.op {
        Operator::Scan { table, .. } => {
            if table.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "scan node {} has an empty table name",
                    plan.id
                )));
            }
        }
        Operator::Project { columns, .. } => {
            if columns.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "project node {} has no columns",
                    plan.id
                )));
            }
        }
        Operator::Limit { limit, offset, .. } => {
            if limit.is_some_and(|l| l < 0) {
                return Err(Error::InvalidArgument(format!(
                    "limit node {} has a negative limit",
                    plan.id
                )));
            }
            if offset.is_some_and(|o| o < 0) {
                return Err(Error::InvalidArgument(format!(
                    "limit node {} has a negative offset",
                    plan.id
                )));
            }
        }
        Operator::Aggregate { aggregates, .. } => {
            for agg in aggregates {
                if agg.kind != AggregateKind::Count && agg.column.is_none() {
                    return Err(Error::InvalidArgument(format!(
                        "aggregate node {} applies {} without a column",
                        plan.id, agg.kind
                    )));
                }
            }
        }
        Operator::Sort { order_by, .. } => {
            if order_by.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "sort node {} has no sort keys",
                    plan.id
                )));
            }
        }
        Operator::Union { inputs } => {
            if inputs.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "union node {} has no inputs",
                    plan.id
                )));
            }
        }
        Operator::Filter { .. } | Operator::Join { .. } | Operator::Subquery { .. } => {}
    }

    for child in plan.children() {
        validate(child)?;
    }

    Ok(())
}
