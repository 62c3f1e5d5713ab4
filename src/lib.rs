//! optiq - a teaching-grade relational query optimizer
//!
//! Features:
//! - Logical plan algebra with constructors, deep cloning and a visitor
//! - In-memory catalog with per-column statistics and a selectivity oracle
//! - Bottom-up cardinality and cost estimation
//! - Rule-based rewriting to a fixed point with an explain trace
//! - Join-order search: bitmask DP for small queries, greedy heuristics
//!   for large ones, plus physical operator selection
//! - Per-connector execution simulation (postgres, mongo, generic)
//!
//! No real data is ever read; everything is estimated from catalog
//! statistics. The crate is synchronous per invocation; only the catalog
//! is shared between threads.

pub mod catalog;
pub mod config;
pub mod cost;
pub mod enumerator;
pub mod error;
pub mod optimizer;
pub mod plan;
pub mod service;
pub mod simulator;

pub use error::{Error, Result};
