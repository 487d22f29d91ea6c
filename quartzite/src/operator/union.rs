use std::collections::HashMap;
use std::fmt::Formatter;

use itertools::Itertools;

use crate::expr::LogicalVariable;
use crate::operator::{DisplayFields, OperatorTrait, VariablePropagation};

/// One output variable of a union and the input variables it takes its values from.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UnionMapping {
    pub left: LogicalVariable,
    pub right: LogicalVariable,
    pub output: LogicalVariable,
}

/// Concatenates its two inputs without removing duplicates.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UnionAll {
    pub mappings: Vec<UnionMapping>,
}

impl UnionAll {
    pub fn new(mappings: Vec<UnionMapping>) -> Self {
        Self { mappings }
    }
}

impl OperatorTrait for UnionAll {
    fn arity(&self) -> usize {
        2
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn produced_variables(&self) -> Vec<LogicalVariable> {
        self.mappings.iter().map(|m| m.output).collect()
    }

    fn used_variables(&self) -> Vec<LogicalVariable> {
        self.mappings
            .iter()
            .flat_map(|m| [m.left, m.right])
            .unique()
            .collect()
    }

    fn rename_used_variables(
        &mut self,
        renames: &HashMap<LogicalVariable, LogicalVariable>,
    ) -> bool {
        let mut changed = false;
        for mapping in &mut self.mappings {
            for var in [&mut mapping.left, &mut mapping.right] {
                if let Some(new_var) = renames.get(&*var) {
                    if *new_var != *var {
                        *var = *new_var;
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

impl DisplayFields for UnionAll {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        let mappings = self
            .mappings
            .iter()
            .map(|m| format!("{} := ({}, {})", m.output, m.left, m.right))
            .join(", ");
        fmt.debug_struct("")
            .field("mappings", &format_args!("[{}]", mappings))
            .finish()
    }
}
