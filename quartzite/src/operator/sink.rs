use std::fmt::Formatter;

use itertools::Itertools;
use strum_macros::AsRefStr;

use crate::expr::Expression;
use crate::operator::{DisplayFields, OperatorTrait, VariablePropagation};

/// Writes the values of `expressions` to an external sink.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Write {
    pub sink: String,
    pub expressions: Vec<Expression>,
}

impl Write {
    pub fn new<S: Into<String>>(sink: S, expressions: Vec<Expression>) -> Self {
        Self {
            sink: sink.into(),
            expressions,
        }
    }
}

impl OperatorTrait for Write {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.expressions.iter().collect()
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        self.expressions.iter_mut().collect()
    }
}

impl DisplayFields for Write {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("sink", &self.sink)
            .field(
                "expressions",
                &format_args!("[{}]", self.expressions.iter().join(", ")),
            )
            .finish()
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum InsertDeleteKind {
    Insert,
    Delete,
}

/// Inserts or deletes `payload` in a dataset, keyed by `primary_keys`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct InsertDelete {
    pub kind: InsertDeleteKind,
    pub dataset: String,
    pub payload: Expression,
    pub primary_keys: Vec<Expression>,
}

impl InsertDelete {
    pub fn new<S: Into<String>>(
        kind: InsertDeleteKind,
        dataset: S,
        payload: Expression,
        primary_keys: Vec<Expression>,
    ) -> Self {
        Self {
            kind,
            dataset: dataset.into(),
            payload,
            primary_keys,
        }
    }
}

impl OperatorTrait for InsertDelete {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }

    fn expressions(&self) -> Vec<&Expression> {
        std::iter::once(&self.payload)
            .chain(self.primary_keys.iter())
            .collect()
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        std::iter::once(&mut self.payload)
            .chain(self.primary_keys.iter_mut())
            .collect()
    }
}

impl DisplayFields for InsertDelete {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("kind", &self.kind)
            .field("dataset", &self.dataset)
            .finish()
    }
}

/// Consumes its input, the end of a plan without a result.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Sink {}

impl Sink {
    pub fn new() -> Self {
        Self {}
    }
}

impl OperatorTrait for Sink {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }
}

impl DisplayFields for Sink {
    fn display(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}
