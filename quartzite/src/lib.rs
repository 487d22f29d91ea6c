//! ## Background
//!
//! A dataflow query compiler hands its optimizer a logical operator plan built by a language
//! front-end. The optimizer rewrites it with an ordered list of heuristic rules, assigns each
//! operator a physical implementation, and finally makes sure every operator receives its input
//! partitioned, ordered and grouped the way its physical implementation needs. Where an input
//! does not already deliver these structural properties, an enforcer (a data exchange or a sort)
//! is inserted. Sorts that are already implied by the data's delivered properties are removed.
//!
//! There is no cost-based search here. Rules are applied in fixed batches, each batch driven by
//! a controller that either sweeps the plan once or repeats until the plan no longer changes.
//!
//! ## Design
//!
//! * [`plan`] Arena of operator nodes addressed by stable indices, plus schema bookkeeping.
//! * [`operator`] Logical operator kinds and their physical implementations.
//! * [`expr`] Expressions, variables and function identifiers.
//! * [`properties`] Equivalence classes, functional dependencies and structural properties.
//! * [`heuristic`] Rule controllers and the [`heuristic::optimize`] entry point.
//! * [`rules`] Rewrite rules, including join selection and property enforcement.
//!
//! ## Reference
//!
//! 1. Borkar, V., Bu, Y., Carman, E.P., Onose, N., Westmann, T., Pirzadeh, P., Carey, M.J. and
//! Tsotras, V.J., 2015. Algebricks: a data model-agnostic compiler backend for big data
//! languages. In Proceedings of the Sixth ACM Symposium on Cloud Computing (pp. 422-433).
//! 2. Simmen, D., Shekita, E. and Malkemus, T., 1996. Fundamental techniques for order
//! optimization. ACM SIGMOD Record, 25(2), pp.57-67.

#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod error;
pub mod expr;
pub mod heuristic;
pub mod metadata;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod properties;
pub mod rules;
pub mod stat;

#[cfg(test)]
pub(crate) mod test_utils;

pub use heuristic::optimize;
