use std::collections::{HashMap, HashSet};
use std::fmt::Formatter;

use crate::expr::{Expression, LogicalVariable};
use crate::operator::{
    join_assignments, join_vars, rename_in_place, DisplayFields, OperatorTrait,
    VariablePropagation,
};

/// Keeps the tuples satisfying `condition`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Select {
    pub condition: Expression,
}

impl Select {
    pub fn new(condition: Expression) -> Self {
        Self { condition }
    }
}

impl OperatorTrait for Select {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.condition]
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        vec![&mut self.condition]
    }
}

impl DisplayFields for Select {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("condition", &format_args!("{}", self.condition))
            .finish()
    }
}

/// Appends `variables[i] := expressions[i]` to every tuple.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Assign {
    pub variables: Vec<LogicalVariable>,
    pub expressions: Vec<Expression>,
}

impl Assign {
    pub fn new(variables: Vec<LogicalVariable>, expressions: Vec<Expression>) -> Self {
        Self {
            variables,
            expressions,
        }
    }

    pub fn assignments(&self) -> impl Iterator<Item = (LogicalVariable, &Expression)> {
        self.variables.iter().copied().zip(self.expressions.iter())
    }
}

impl OperatorTrait for Assign {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::AddNew
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

impl DisplayFields for Assign {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field(
                "assignments",
                &format_args!("{}", join_assignments(&self.variables, &self.expressions)),
            )
            .finish()
    }
}

/// Keeps exactly `variables`, in this order.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Project {
    pub variables: Vec<LogicalVariable>,
}

impl Project {
    pub fn new(variables: Vec<LogicalVariable>) -> Self {
        Self { variables }
    }
}

impl OperatorTrait for Project {
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
            let mut seen = HashSet::new();
            self.variables.retain(|var| seen.insert(*var));
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

impl DisplayFields for Project {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("variables", &format_args!("{}", join_vars(&self.variables)))
            .finish()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Limit {
    pub limit: usize,
    pub offset: Option<usize>,
}

impl Limit {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            offset: None,
        }
    }

    pub fn with_offset(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset: Some(offset),
        }
    }
}

impl OperatorTrait for Limit {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }
}

impl DisplayFields for Limit {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        let mut s = fmt.debug_struct("");
        s.field("limit", &self.limit);
        if let Some(offset) = self.offset {
            s.field("offset", &offset);
        }
        s.finish()
    }
}

/// Produces one tuple per item of the collection computed by `expression`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Unnest {
    pub variable: LogicalVariable,
    pub expression: Expression,
    /// Optional variable holding the item's position.
    pub position: Option<LogicalVariable>,
}

impl Unnest {
    pub fn new(variable: LogicalVariable, expression: Expression) -> Self {
        Self {
            variable,
            expression,
            position: None,
        }
    }
}

impl OperatorTrait for Unnest {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::AddNew
    }

    fn produced_variables(&self) -> Vec<LogicalVariable> {
        let mut vars = vec![self.variable];
        vars.extend(self.position);
        vars
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.expression]
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        vec![&mut self.expression]
    }
}

impl DisplayFields for Unnest {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("variable", &format_args!("{}", self.variable))
            .field("expression", &format_args!("{}", self.expression))
            .finish()
    }
}

/// Assigns aggregates computed over all tuples seen so far.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RunningAggregate {
    pub variables: Vec<LogicalVariable>,
    pub expressions: Vec<Expression>,
}

impl RunningAggregate {
    pub fn new(variables: Vec<LogicalVariable>, expressions: Vec<Expression>) -> Self {
        Self {
            variables,
            expressions,
        }
    }
}

impl OperatorTrait for RunningAggregate {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::AddNew
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

impl DisplayFields for RunningAggregate {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field(
                "aggregates",
                &format_args!("{}", join_assignments(&self.variables, &self.expressions)),
            )
            .finish()
    }
}

/// Feeds its input to several parents.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Replicate {}

impl Replicate {
    pub fn new() -> Self {
        Self {}
    }
}

impl OperatorTrait for Replicate {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }
}

impl DisplayFields for Replicate {
    fn display(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}

/// Moves data between partitions, the kind of movement is its physical operator.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Exchange {}

impl Exchange {
    pub fn new() -> Self {
        Self {}
    }
}

impl OperatorTrait for Exchange {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }
}

impl DisplayFields for Exchange {
    fn display(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}

/// Pipes `inputs` through an external command producing `outputs`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Script {
    pub command: String,
    pub inputs: Vec<LogicalVariable>,
    pub outputs: Vec<LogicalVariable>,
}

impl Script {
    pub fn new<S: Into<String>>(
        command: S,
        inputs: Vec<LogicalVariable>,
        outputs: Vec<LogicalVariable>,
    ) -> Self {
        Self {
            command: command.into(),
            inputs,
            outputs,
        }
    }
}

impl OperatorTrait for Script {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn produced_variables(&self) -> Vec<LogicalVariable> {
        self.outputs.clone()
    }

    fn used_variables(&self) -> Vec<LogicalVariable> {
        self.inputs.clone()
    }

    fn rename_used_variables(
        &mut self,
        renames: &HashMap<LogicalVariable, LogicalVariable>,
    ) -> bool {
        rename_in_place(&mut self.inputs, renames)
    }
}

impl DisplayFields for Script {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("command", &self.command)
            .field("inputs", &format_args!("{}", join_vars(&self.inputs)))
            .field("outputs", &format_args!("{}", join_vars(&self.outputs)))
            .finish()
    }
}
