//! Relational operators.
//!
//! A [`LogicalOperator`] describes what an operator computes, and a
//! [`physical::PhysicalOperator`] how it is computed. Physical operators are only chosen once
//! logical rewriting is finished, and they are the ones that know which structural properties
//! they need from their inputs and deliver to their parent.
use std::collections::HashMap;
use std::fmt::Formatter;

use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use strum_macros::Display;

use crate::expr::{Expression, LogicalVariable};
use crate::plan::NodeId;

mod logical;
pub use logical::*;
mod source;
pub use source::*;
mod stream;
pub use stream::*;
mod join;
pub use join::*;
mod group;
pub use group::*;
mod order;
pub use order::*;
mod union;
pub use union::*;
mod sink;
pub use sink::*;
pub mod physical;

/// How an operator forwards the variables of its inputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariablePropagation {
    /// Forwards every variable of its first input.
    All,
    /// Forwards every input variable and appends its own.
    AddNew,
    /// Decides for itself, see [`OperatorTrait::compute_schema`].
    Custom,
}

/// Where an operator runs.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Default, Display)]
pub enum ExecutionMode {
    /// On a single location.
    #[default]
    Unpartitioned,
    /// On every partition of its input.
    Partitioned,
    /// Inside a nested plan, or on whatever partition its input is.
    Local,
}

/// A sub plan owned by an operator, evaluated for each tuple or group of its owner.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct NestedPlan {
    pub roots: Vec<NodeId>,
}

impl NestedPlan {
    pub fn new(roots: Vec<NodeId>) -> Self {
        Self { roots }
    }
}

#[enum_dispatch(LogicalOperator)]
pub trait OperatorTrait {
    /// Number of inputs.
    fn arity(&self) -> usize;

    fn propagation(&self) -> VariablePropagation;

    /// Variables assigned by this operator.
    fn produced_variables(&self) -> Vec<LogicalVariable> {
        vec![]
    }

    /// Variables read by this operator itself, not by its inputs or nested plans.
    fn used_variables(&self) -> Vec<LogicalVariable> {
        let mut vars = Vec::new();
        for expr in self.expressions() {
            expr.collect_used_variables(&mut vars);
        }
        vars
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![]
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        vec![]
    }

    /// Rewrites every used reference of a variable in `renames`. Produced variables are kept.
    fn rename_used_variables(
        &mut self,
        renames: &HashMap<LogicalVariable, LogicalVariable>,
    ) -> bool {
        self.expressions_mut()
            .into_iter()
            .fold(false, |changed, expr| expr.rename_variables(renames) || changed)
    }

    fn nested_plans(&self) -> &[NestedPlan] {
        &[]
    }

    fn nested_plans_mut(&mut self) -> Option<&mut Vec<NestedPlan>> {
        None
    }

    /// Output schema from the schemas of the inputs and the nested plan roots.
    fn compute_schema(
        &self,
        inputs: &[&[LogicalVariable]],
        _nested_roots: &[&[LogicalVariable]],
    ) -> Vec<LogicalVariable> {
        match self.propagation() {
            VariablePropagation::All => inputs.first().map(|s| s.to_vec()).unwrap_or_default(),
            VariablePropagation::AddNew => {
                let mut schema: Vec<LogicalVariable> = inputs.concat();
                for var in self.produced_variables() {
                    if !schema.contains(&var) {
                        schema.push(var);
                    }
                }
                schema
            }
            VariablePropagation::Custom => self.produced_variables(),
        }
    }
}

#[enum_dispatch(LogicalOperator)]
pub trait DisplayFields {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result;
}

pub(crate) fn rename_in_place(
    vars: &mut [LogicalVariable],
    renames: &HashMap<LogicalVariable, LogicalVariable>,
) -> bool {
    let mut changed = false;
    for var in vars.iter_mut() {
        if let Some(new_var) = renames.get(&*var) {
            if *new_var != *var {
                *var = *new_var;
                changed = true;
            }
        }
    }
    changed
}

pub(crate) fn join_vars(vars: &[LogicalVariable]) -> String {
    format!("[{}]", vars.iter().join(", "))
}

pub(crate) fn join_assignments(vars: &[LogicalVariable], exprs: &[Expression]) -> String {
    format!(
        "[{}]",
        vars.iter()
            .zip(exprs.iter())
            .map(|(var, expr)| format!("{} := {}", var, expr))
            .join(", ")
    )
}
