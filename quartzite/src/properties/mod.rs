//! Properties of operators.
//!
//! Equivalence classes and functional dependencies describe what is known about the values of
//! variables at an operator. Structural properties describe how the data produced by an
//! operator is partitioned, and ordered or grouped inside each partition. Both are transient:
//! they are derived on demand and cached in [`crate::optimizer::OptimizationContext`].
mod equivalence;
pub use equivalence::*;
mod local;
pub use local::*;
mod partitioning;
pub use partitioning::*;
mod structural;
pub use structural::*;
mod requirements;
pub use requirements::*;
mod dependencies;
pub use dependencies::*;
