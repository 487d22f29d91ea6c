use std::collections::HashMap;
use std::fmt::Formatter;

use itertools::Itertools;

use crate::expr::{Expression, LogicalVariable};
use crate::operator::{
    join_assignments, join_vars, rename_in_place, DisplayFields, NestedPlan, OperatorTrait,
    VariablePropagation,
};

/// Groups its input on `group_by` keys and evaluates the nested plans once per group.
///
/// Decoration variables are carried along with each group without being part of the key; they
/// must be determined by the keys.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct GroupBy {
    pub group_by: Vec<(LogicalVariable, Expression)>,
    pub decor: Vec<(LogicalVariable, Expression)>,
    pub nested_plans: Vec<NestedPlan>,
}

impl GroupBy {
    pub fn new(
        group_by: Vec<(LogicalVariable, Expression)>,
        decor: Vec<(LogicalVariable, Expression)>,
        nested_plans: Vec<NestedPlan>,
    ) -> Self {
        Self {
            group_by,
            decor,
            nested_plans,
        }
    }

    pub fn group_by_variables(&self) -> Vec<LogicalVariable> {
        self.group_by.iter().map(|(var, _)| *var).collect()
    }

    pub fn decor_variables(&self) -> Vec<LogicalVariable> {
        self.decor.iter().map(|(var, _)| *var).collect()
    }

    /// Output variable to input variable, for keys and decorations that are variable references.
    pub fn variable_mapping(&self) -> Vec<(LogicalVariable, LogicalVariable)> {
        self.group_by
            .iter()
            .chain(self.decor.iter())
            .filter_map(|(var, expr)| expr.as_variable().map(|input| (*var, input)))
            .collect()
    }
}

impl OperatorTrait for GroupBy {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn produced_variables(&self) -> Vec<LogicalVariable> {
        self.group_by
            .iter()
            .chain(self.decor.iter())
            .map(|(var, _)| *var)
            .collect()
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.group_by
            .iter()
            .chain(self.decor.iter())
            .map(|(_, expr)| expr)
            .collect()
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        self.group_by
            .iter_mut()
            .chain(self.decor.iter_mut())
            .map(|(_, expr)| expr)
            .collect()
    }

    fn nested_plans(&self) -> &[NestedPlan] {
        &self.nested_plans
    }

    fn nested_plans_mut(&mut self) -> Option<&mut Vec<NestedPlan>> {
        Some(&mut self.nested_plans)
    }

    fn compute_schema(
        &self,
        _inputs: &[&[LogicalVariable]],
        nested_roots: &[&[LogicalVariable]],
    ) -> Vec<LogicalVariable> {
        let mut schema: Vec<LogicalVariable> = nested_roots.concat();
        for var in self.produced_variables() {
            if !schema.contains(&var) {
                schema.push(var);
            }
        }
        schema
    }
}

impl DisplayFields for GroupBy {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        let (keys, key_exprs): (Vec<_>, Vec<_>) = self.group_by.iter().cloned().unzip();
        let mut s = fmt.debug_struct("");
        s.field(
            "group_by",
            &format_args!("{}", join_assignments(&keys, &key_exprs)),
        );
        if !self.decor.is_empty() {
            let (decor, decor_exprs): (Vec<_>, Vec<_>) = self.decor.iter().cloned().unzip();
            s.field(
                "decor",
                &format_args!("{}", join_assignments(&decor, &decor_exprs)),
            );
        }
        s.finish()
    }
}

/// Computes aggregates over its whole input, producing a single tuple.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Aggregate {
    pub variables: Vec<LogicalVariable>,
    pub expressions: Vec<Expression>,
}

impl Aggregate {
    pub fn new(variables: Vec<LogicalVariable>, expressions: Vec<Expression>) -> Self {
        Self {
            variables,
            expressions,
        }
    }
}

impl OperatorTrait for Aggregate {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn produced_variables(&self) -> Vec<LogicalVariable> {
        self.variables.clone()
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.expressions.iter().collect()
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        self.expressions.iter_mut().collect()
    }
}

impl DisplayFields for Aggregate {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field(
                "aggregates",
                &format_args!("{}", join_assignments(&self.variables, &self.expressions)),
            )
            .finish()
    }
}

/// Removes duplicates on `variables`, which become its only output.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Distinct {
    pub variables: Vec<LogicalVariable>,
}

impl Distinct {
    pub fn new(variables: Vec<LogicalVariable>) -> Self {
        Self { variables }
    }
}

impl OperatorTrait for Distinct {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn used_variables(&self) -> Vec<LogicalVariable> {
        self.variables.clone()
    }

    fn rename_used_variables(
        &mut self,
        renames: &HashMap<LogicalVariable, LogicalVariable>,
    ) -> bool {
        let changed = rename_in_place(&mut self.variables, renames);
        if changed {
            self.variables = self.variables.iter().copied().unique().collect();
        }
        changed
    }

    fn compute_schema(
        &self,
        _inputs: &[&[LogicalVariable]],
        _nested_roots: &[&[LogicalVariable]],
    ) -> Vec<LogicalVariable> {
        self.variables.clone()
    }
}

impl DisplayFields for Distinct {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("variables", &format_args!("{}", join_vars(&self.variables)))
            .finish()
    }
}

/// Evaluates its nested plans for every input tuple, appending their results.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Subplan {
    pub nested_plans: Vec<NestedPlan>,
}

impl Subplan {
    pub fn new(nested_plans: Vec<NestedPlan>) -> Self {
        Self { nested_plans }
    }
}

impl OperatorTrait for Subplan {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn nested_plans(&self) -> &[NestedPlan] {
        &self.nested_plans
    }

    fn nested_plans_mut(&mut self) -> Option<&mut Vec<NestedPlan>> {
        Some(&mut self.nested_plans)
    }

    fn compute_schema(
        &self,
        inputs: &[&[LogicalVariable]],
        nested_roots: &[&[LogicalVariable]],
    ) -> Vec<LogicalVariable> {
        let mut schema: Vec<LogicalVariable> = inputs.concat();
        for var in nested_roots.concat() {
            if !schema.contains(&var) {
                schema.push(var);
            }
        }
        schema
    }
}

impl DisplayFields for Subplan {
    fn display(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}
