//! Expressions evaluated by operators.
//!
//! Variables are opaque integers allocated by [`crate::optimizer::OptimizationContext`]; an
//! expression refers to the value of a variable produced by some operator below it.
mod variable;
pub use variable::*;
mod function;
pub use function::*;
mod expression;
pub use expression::*;
mod typing;
pub use typing::*;
