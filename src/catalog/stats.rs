//! Selectivity estimation
//!
//! The oracle is a pluggable capability on the catalog so refined
//! estimators (histogram-aware, sampling-based) can be introduced without
//! touching the cost model.

use crate::catalog::Column;
use crate::plan::{BinaryOp, Value};

/// Default selectivity for an equality predicate when NDV is unknown
pub const DEFAULT_EQ_SELECTIVITY: f64 = 0.1;

/// Selectivity for range comparison predicates
pub const RANGE_SELECTIVITY: f64 = 0.33;

/// Selectivity for LIKE predicates
pub const LIKE_SELECTIVITY: f64 = 0.1;

/// Fallback selectivity for anything else
pub const DEFAULT_SELECTIVITY: f64 = 0.5;

/// Pluggable selectivity estimator
pub trait SelectivityOracle: Send + Sync {
    /// Selectivity of `column op value`, in (0, 1]
    fn column_selectivity(&self, column: &Column, op: BinaryOp, value: &Value) -> f64;
}

/// Baseline oracle: NDV-aware equality, fixed fractions otherwise
pub struct DefaultSelectivityOracle;

impl SelectivityOracle for DefaultSelectivityOracle {
    fn column_selectivity(&self, column: &Column, op: BinaryOp, _value: &Value) -> f64 {
        match op {
            BinaryOp::Eq => match column.ndv {
                Some(ndv) if ndv > 0 => 1.0 / ndv as f64,
                _ => DEFAULT_EQ_SELECTIVITY,
            },
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => RANGE_SELECTIVITY,
            BinaryOp::Like => LIKE_SELECTIVITY,
            _ => DEFAULT_SELECTIVITY,
        }
    }
}

/// Selectivity of a predicate by its top operator alone, with no column
/// context (used by the cost model on bare predicates)
pub fn operator_selectivity(op: BinaryOp) -> f64 {
    match op {
        BinaryOp::Eq => DEFAULT_EQ_SELECTIVITY,
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => RANGE_SELECTIVITY,
        BinaryOp::Like => LIKE_SELECTIVITY,
        _ => DEFAULT_SELECTIVITY,
    }
}

/// Selectivity class of a join edge: equality edges are the most selective,
/// range edges intermediate, everything else a coin flip
pub fn join_edge_selectivity(op: BinaryOp) -> f64 {
    match op {
        BinaryOp::Eq => 0.1,
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => 0.33,
        _ => 0.5,
    }
}
