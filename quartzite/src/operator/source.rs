use std::fmt::Formatter;

use crate::expr::LogicalVariable;
use crate::operator::{join_vars, DisplayFields, OperatorTrait, VariablePropagation};
use crate::plan::NodeId;

/// Produces a single empty tuple, the leaf of every top level plan.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct EmptyTupleSource {}

impl EmptyTupleSource {
    pub fn new() -> Self {
        Self {}
    }
}

impl OperatorTrait for EmptyTupleSource {
    fn arity(&self) -> usize {
        0
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }
}

impl DisplayFields for EmptyTupleSource {
    fn display(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}

/// Leaf of a nested plan, yields the tuples of the owning operator's input.
///
/// `source` points back to the owner. It is never an input edge.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct NestedTupleSource {
    source: NodeId,
}

impl NestedTupleSource {
    pub fn new(source: NodeId) -> Self {
        Self { source }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }
}

impl OperatorTrait for NestedTupleSource {
    fn arity(&self) -> usize {
        0
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }
}

impl DisplayFields for NestedTupleSource {
    fn display(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}

/// Reads a data source, binding one variable per column.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DataSourceScan {
    data_source: String,
    variables: Vec<LogicalVariable>,
}

impl DataSourceScan {
    pub fn new<S: Into<String>>(data_source: S, variables: Vec<LogicalVariable>) -> Self {
        Self {
            data_source: data_source.into(),
            variables,
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn variables(&self) -> &[LogicalVariable] {
        &self.variables
    }
}

impl OperatorTrait for DataSourceScan {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::AddNew
    }

    fn produced_variables(&self) -> Vec<LogicalVariable> {
        self.variables.clone()
    }
}

impl DisplayFields for DataSourceScan {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("data_source", &self.data_source)
            .field("variables", &format_args!("{}", join_vars(&self.variables)))
            .finish()
    }
}
