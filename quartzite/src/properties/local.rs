use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display as StrumDisplay;

use crate::expr::LogicalVariable;
use crate::properties::{closure, determines, EquivalenceClasses, FunctionalDependency};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderKind {
    Asc,
    Desc,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OrderColumn {
    pub column: LogicalVariable,
    pub kind: OrderKind,
}

impl OrderColumn {
    pub fn asc(column: LogicalVariable) -> Self {
        Self {
            column,
            kind: OrderKind::Asc,
        }
    }

    pub fn desc(column: LogicalVariable) -> Self {
        Self {
            column,
            kind: OrderKind::Desc,
        }
    }
}

impl Display for OrderColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.column, self.kind)
    }
}

/// Property of the tuples inside one partition.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum LocalProperty {
    /// Sorted on the column, after all preceding order properties.
    Order(OrderColumn),
    /// Tuples with equal values on the columns are adjacent.
    Grouping(BTreeSet<LogicalVariable>),
}

impl LocalProperty {
    pub fn columns(&self) -> Vec<LogicalVariable> {
        match self {
            LocalProperty::Order(order) => vec![order.column],
            LocalProperty::Grouping(columns) => columns.iter().copied().collect(),
        }
    }

    /// Maps columns through `map`, `None` if some column cannot be mapped.
    pub fn map_columns<F>(&self, map: F) -> Option<Self>
    where
        F: Fn(LogicalVariable) -> Option<LogicalVariable>,
    {
        match self {
            LocalProperty::Order(order) => Some(LocalProperty::Order(OrderColumn {
                column: map(order.column)?,
                kind: order.kind,
            })),
            LocalProperty::Grouping(columns) => columns
                .iter()
                .map(|column| map(*column))
                .collect::<Option<BTreeSet<_>>>()
                .map(LocalProperty::Grouping),
        }
    }
}

impl Display for LocalProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalProperty::Order(order) => write!(f, "{}", order),
            LocalProperty::Grouping(columns) => write!(f, "{{{}}}", columns.iter().join(", ")),
        }
    }
}

/// Canonical form of a local property list.
///
/// Columns are replaced by their class representative, constant columns are dropped, and so is
/// an order column determined by the order columns before it.
pub fn normalize_local_properties(
    props: &[LocalProperty],
    classes: &EquivalenceClasses,
    fds: &[FunctionalDependency],
) -> Vec<LocalProperty> {
    let mut result = Vec::with_capacity(props.len());
    let mut preceding: Vec<LogicalVariable> = Vec::new();
    for prop in props {
        match prop {
            LocalProperty::Order(order) => {
                if classes.is_constant(order.column) {
                    continue;
                }
                let column = classes.representative_variable(order.column);
                if closure(&preceding, fds, classes).contains(&column) {
                    continue;
                }
                preceding.push(column);
                result.push(LocalProperty::Order(OrderColumn {
                    column,
                    kind: order.kind,
                }));
            }
            LocalProperty::Grouping(columns) => {
                let columns = reduce_columns(columns, classes, fds);
                if !columns.is_empty() {
                    preceding.extend(columns.iter().copied());
                    result.push(LocalProperty::Grouping(columns));
                }
            }
        }
    }
    result
}

/// Drops constants and columns determined by the remaining ones, keeping at least one.
fn reduce_columns(
    columns: &BTreeSet<LogicalVariable>,
    classes: &EquivalenceClasses,
    fds: &[FunctionalDependency],
) -> BTreeSet<LogicalVariable> {
    let mut reduced: BTreeSet<LogicalVariable> = columns
        .iter()
        .filter(|column| !classes.is_constant(**column))
        .map(|column| classes.representative_variable(*column))
        .collect();
    for column in reduced.clone().iter().rev() {
        if reduced.len() <= 1 {
            break;
        }
        let rest: Vec<LogicalVariable> =
            reduced.iter().copied().filter(|c| c != column).collect();
        if determines(&rest, [column], fds, classes) {
            reduced.remove(column);
        }
    }
    reduced
}

fn same_grouping(
    left: &BTreeSet<LogicalVariable>,
    right: &BTreeSet<LogicalVariable>,
    classes: &EquivalenceClasses,
    fds: &[FunctionalDependency],
) -> bool {
    left == right
        || (determines(left, right, fds, classes) && determines(right, left, fds, classes))
}

/// Whether `delivered` satisfies `required`, modulo equivalence classes and dependencies.
///
/// An order needs the same order next in the delivered list. A grouping is met by a grouping on
/// mutually determined columns, or by a run of orders whose columns are mutually determined with
/// the grouping columns.
pub fn match_local_properties(
    required: &[LocalProperty],
    delivered: &[LocalProperty],
    classes: &EquivalenceClasses,
    fds: &[FunctionalDependency],
) -> bool {
    let required = normalize_local_properties(required, classes, fds);
    let delivered = normalize_local_properties(delivered, classes, fds);

    let mut next = 0;
    for prop in &required {
        match prop {
            LocalProperty::Order(order) => match delivered.get(next) {
                Some(LocalProperty::Order(delivered_order)) if delivered_order == order => {
                    next += 1
                }
                _ => return false,
            },
            LocalProperty::Grouping(columns) => match delivered.get(next) {
                Some(LocalProperty::Grouping(delivered_columns))
                    if same_grouping(columns, delivered_columns, classes, fds) =>
                {
                    next += 1
                }
                Some(LocalProperty::Order(_)) => {
                    let mut prefix = BTreeSet::new();
                    let mut matched = false;
                    while let Some(LocalProperty::Order(order)) = delivered.get(next) {
                        if !determines(columns, [&order.column], fds, classes) {
                            break;
                        }
                        prefix.insert(order.column);
                        next += 1;
                        if same_grouping(columns, &prefix, classes, fds) {
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        return false;
                    }
                }
                _ => return false,
            },
        }
    }
    true
}
