use std::fmt::Formatter;

use strum_macros::AsRefStr;

use crate::expr::{Expression, LogicalVariable};
use crate::operator::{DisplayFields, OperatorTrait, VariablePropagation};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// Joins its left (input 0) and right (input 1) inputs on `condition`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub condition: Expression,
}

impl Join {
    pub fn new(kind: JoinKind, condition: Expression) -> Self {
        Self { kind, condition }
    }

    pub fn inner(condition: Expression) -> Self {
        Self::new(JoinKind::Inner, condition)
    }
}

impl OperatorTrait for Join {
    fn arity(&self) -> usize {
        2
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::Custom
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.condition]
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        vec![&mut self.condition]
    }

    fn compute_schema(
        &self,
        inputs: &[&[LogicalVariable]],
        _nested_roots: &[&[LogicalVariable]],
    ) -> Vec<LogicalVariable> {
        inputs.concat()
    }
}

impl DisplayFields for Join {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("kind", &self.kind)
            .field("condition", &format_args!("{}", self.condition))
            .finish()
    }
}
