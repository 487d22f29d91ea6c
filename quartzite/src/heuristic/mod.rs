//! Heuristic rule application.
//!
//! Rules are grouped in [`RuleBatch`]es. A batch sweeps the plan from the root, trying every rule
//! on every operator slot, under one of two [`RuleController`]s: a single sweep, or sweeps
//! repeated until no rule changes the plan anymore. [`optimize`] runs the logical batches and
//! then the physical ones.
mod controller;
pub use controller::*;
mod optimizer;
pub use optimizer::*;
