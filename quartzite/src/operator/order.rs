use std::fmt::Formatter;

use itertools::Itertools;

use crate::expr::Expression;
use crate::operator::{DisplayFields, OperatorTrait, VariablePropagation};
use crate::properties::{OrderColumn, OrderKind};

/// Sorts its input, optionally keeping only the first `top_k` tuples.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Order {
    pub order: Vec<(OrderKind, Expression)>,
    pub top_k: Option<usize>,
}

impl Order {
    pub fn new(order: Vec<(OrderKind, Expression)>) -> Self {
        Self { order, top_k: None }
    }

    /// Sort order over plain variables, the only form properties can describe.
    pub fn from_columns(columns: &[OrderColumn]) -> Self {
        Self::new(
            columns
                .iter()
                .map(|c| (c.kind, Expression::Variable(c.column)))
                .collect(),
        )
    }

    /// `None` if some order expression is not a variable reference.
    pub fn order_columns(&self) -> Option<Vec<OrderColumn>> {
        self.order
            .iter()
            .map(|(kind, expr)| {
                expr.as_variable().map(|column| OrderColumn {
                    column,
                    kind: *kind,
                })
            })
            .collect()
    }
}

impl OperatorTrait for Order {
    fn arity(&self) -> usize {
        1
    }

    fn propagation(&self) -> VariablePropagation {
        VariablePropagation::All
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.order.iter().map(|(_, expr)| expr).collect()
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        self.order.iter_mut().map(|(_, expr)| expr).collect()
    }
}

impl DisplayFields for Order {
    fn display(&self, fmt: &mut Formatter) -> std::fmt::Result {
        let order = self
            .order
            .iter()
            .map(|(kind, expr)| format!("{} {}", expr, kind))
            .join(", ");
        let mut s = fmt.debug_struct("");
        s.field("order", &format_args!("[{}]", order));
        if let Some(top_k) = self.top_k {
            s.field("top_k", &top_k);
        }
        s.finish()
    }
}
