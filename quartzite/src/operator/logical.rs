use enum_as_inner::EnumAsInner;
use std::fmt::{Display, Formatter};

use crate::operator::{
    Aggregate, Assign, DataSourceScan, DisplayFields, Distinct, EmptyTupleSource, Exchange,
    GroupBy, InsertDelete, Join, Limit, NestedTupleSource, Order, Project, Replicate,
    RunningAggregate, Script, Select, Sink, Subplan, UnionAll, Unnest, Write,
};
use enum_dispatch::enum_dispatch;
use strum_macros::AsRefStr;

/// Logical operator kinds.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum LogicalOperator {
    EmptyTupleSource(EmptyTupleSource),
    NestedTupleSource(NestedTupleSource),
    DataSourceScan(DataSourceScan),
    Select(Select),
    Assign(Assign),
    Project(Project),
    Join(Join),
    GroupBy(GroupBy),
    Aggregate(Aggregate),
    RunningAggregate(RunningAggregate),
    Distinct(Distinct),
    Order(Order),
    Limit(Limit),
    Unnest(Unnest),
    Subplan(Subplan),
    Exchange(Exchange),
    Replicate(Replicate),
    UnionAll(UnionAll),
    Write(Write),
    InsertDelete(InsertDelete),
    Sink(Sink),
    Script(Script),
}

impl LogicalOperator {
    pub fn name(&self) -> &str {
        self.as_ref()
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())?;
        self.display(f)
    }
}
