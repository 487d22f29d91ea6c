//! Physical operators.
//!
//! A physical operator states which structural properties it requires from each input, given
//! what its parent requires from it, and which properties it delivers given what its inputs
//! deliver. Property enforcement uses both to decide where exchanges and sorts are needed.
use std::fmt::{Display, Formatter};

use anyhow::bail;
use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use strum_macros::AsRefStr;

use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::operator::ExecutionMode;
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, Plan};
use crate::properties::{
    LocalProperty, PartitioningProperty, PhysicalRequirements, StructuralPropertiesVector,
};

mod source;
pub use source::*;
mod stream;
pub use stream::*;
mod aggregate;
pub use aggregate::*;
mod sort;
pub use sort::*;
mod join;
pub use join::*;
mod exchange;
pub use exchange::*;
mod sink;
pub use sink::*;

/// Physical relational operator.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum PhysicalOperator {
    EmptyTupleSource(EmptyTupleSource),
    NestedTupleSource(NestedTupleSource),
    DataSourceScan(DataSourceScan),
    StreamSelect(StreamSelect),
    Assign(Assign),
    StreamProject(StreamProject),
    StreamLimit(StreamLimit),
    Unnest(Unnest),
    RunningAggregate(RunningAggregate),
    Subplan(Subplan),
    Replicate(Replicate),
    UnionAll(UnionAll),
    Script(Script),
    Aggregate(Aggregate),
    PreclusteredGroupBy(PreclusteredGroupBy),
    ExternalGroupBy(ExternalGroupBy),
    PreSortedDistinctBy(PreSortedDistinctBy),
    StableSort(StableSort),
    InMemoryStableSort(InMemoryStableSort),
    HybridHashJoin(HybridHashJoin),
    InMemoryHashJoin(InMemoryHashJoin),
    NestedLoopJoin(NestedLoopJoin),
    OneToOneExchange(OneToOneExchange),
    HashPartitionExchange(HashPartitionExchange),
    RangePartitionExchange(RangePartitionExchange),
    BroadcastExchange(BroadcastExchange),
    RandomMergeExchange(RandomMergeExchange),
    SortMergeExchange(SortMergeExchange),
    RandomPartitionExchange(RandomPartitionExchange),
    SinkWrite(SinkWrite),
    InsertDelete(InsertDelete),
    Sink(Sink),
}

impl PhysicalOperator {
    pub fn name(&self) -> &str {
        self.as_ref()
    }

    pub fn is_exchange(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::OneToOneExchange(_)
                | PhysicalOperator::HashPartitionExchange(_)
                | PhysicalOperator::RangePartitionExchange(_)
                | PhysicalOperator::BroadcastExchange(_)
                | PhysicalOperator::RandomMergeExchange(_)
                | PhysicalOperator::SortMergeExchange(_)
                | PhysicalOperator::RandomPartitionExchange(_)
        )
    }

    pub fn is_sort(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::StableSort(_) | PhysicalOperator::InMemoryStableSort(_)
        )
    }
}

impl Display for PhysicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())?;
        self.display_fields(f)
    }
}

/// What a physical operator can see while deriving properties.
pub struct DerivePropContext<'a> {
    pub plan: &'a Plan,
    pub node: NodeId,
    /// What the parent requires from this operator, `None` for anything.
    pub required: Option<&'a StructuralPropertiesVector>,
    pub optimizer: &'a OptimizationContext,
}

impl<'a> DerivePropContext<'a> {
    pub fn mode(&self) -> ExecutionMode {
        self.plan.node(self.node).execution_mode
    }

    pub fn arity(&self) -> usize {
        self.plan.inputs(self.node).len()
    }

    /// Delivered properties of input `index`, which must already be derived.
    pub fn input_delivered(&self, index: usize) -> OptResult<StructuralPropertiesVector> {
        let input = self.plan.input(self.node, index)?;
        match self.optimizer.delivered_properties(input) {
            Some(delivered) => Ok(delivered.clone()),
            None => bail!(OptError::internal(format!(
                "Delivered properties of {} are not derived",
                self.plan.operator(input).name()
            ))),
        }
    }
}

#[enum_dispatch(PhysicalOperator)]
pub trait PhysicalOperatorTrait {
    /// Required properties of each input given what the parent requires.
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements>;

    /// Properties delivered given what the inputs deliver.
    fn delivered_properties(&self, ctx: &DerivePropContext)
        -> OptResult<StructuralPropertiesVector>;

    /// Whether the operator can be pipelined inside a single dataflow stage.
    fn is_micro_operator(&self) -> bool;

    fn display_fields(&self, _fmt: &mut Formatter) -> std::fmt::Result {
        Ok(())
    }
}

/// No requirement on any input.
pub(crate) fn no_requirements(ctx: &DerivePropContext) -> OptResult<PhysicalRequirements> {
    Ok(PhysicalRequirements::none(ctx.arity()))
}

/// Single partition when the operator itself runs on a single partition.
pub(crate) fn unpartitioned_if_global(ctx: &DerivePropContext) -> OptResult<PhysicalRequirements> {
    match ctx.mode() {
        ExecutionMode::Unpartitioned => Ok(PhysicalRequirements::new(vec![Some(
            StructuralPropertiesVector::unpartitioned(vec![]),
        )])),
        _ => no_requirements(ctx),
    }
}

/// Keeps what is still expressible over `vars`: the partitioning if all its columns survive,
/// and the longest prefix of local properties over surviving columns.
pub(crate) fn project_properties(
    delivered: &StructuralPropertiesVector,
    vars: &[LogicalVariable],
) -> StructuralPropertiesVector {
    map_properties(delivered, |var| {
        if vars.contains(&var) {
            Some(var)
        } else {
            None
        }
    })
}

/// Renames the columns of `delivered` through `map`. A partitioning that cannot be renamed
/// degrades to random partitioning on the same domain.
pub(crate) fn map_properties<F>(
    delivered: &StructuralPropertiesVector,
    map: F,
) -> StructuralPropertiesVector
where
    F: Fn(LogicalVariable) -> Option<LogicalVariable>,
{
    let partitioning = delivered.partitioning.as_ref().map(|partitioning| {
        partitioning
            .map_columns(&map)
            .unwrap_or_else(|| PartitioningProperty::Random {
                domain: partitioning.domain().cloned(),
            })
    });
    let local: Vec<LocalProperty> = delivered
        .local
        .iter()
        .map_while(|prop| prop.map_columns(&map))
        .collect();
    StructuralPropertiesVector::new(partitioning, local)
}

/// Display helper for column lists.
pub(crate) fn columns_field<T: Display>(columns: &[T]) -> String {
    use itertools::Itertools;
    format!("[{}]", columns.iter().join(", "))
}

#[cfg(test)]
mod tests {
    use crate::expr::LogicalVariable;
    use crate::operator::physical::{map_properties, project_properties};
    use crate::properties::{
        LocalProperty, OrderColumn, PartitioningProperty, StructuralPropertiesVector,
    };

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_project_truncates_local_properties() {
        let delivered = StructuralPropertiesVector::new(
            Some(PartitioningProperty::hashed(vec![v(1)])),
            vec![
                LocalProperty::Order(OrderColumn::asc(v(1))),
                LocalProperty::Order(OrderColumn::asc(v(2))),
                LocalProperty::Order(OrderColumn::asc(v(3))),
            ],
        );
        let projected = project_properties(&delivered, &[v(1), v(3)]);
        assert_eq!(
            StructuralPropertiesVector::new(
                Some(PartitioningProperty::hashed(vec![v(1)])),
                vec![LocalProperty::Order(OrderColumn::asc(v(1)))],
            ),
            projected
        );

        let dropped = project_properties(&delivered, &[v(2)]);
        assert_eq!(Some(PartitioningProperty::random()), dropped.partitioning);
        assert!(dropped.local.is_empty());
    }

    #[test]
    fn test_map_renames_columns() {
        let delivered = StructuralPropertiesVector::new(
            Some(PartitioningProperty::hashed(vec![v(1)])),
            vec![LocalProperty::Order(OrderColumn::asc(v(1)))],
        );
        let mapped = map_properties(&delivered, |var| if var == v(1) { Some(v(5)) } else { None });
        assert_eq!(
            StructuralPropertiesVector::new(
                Some(PartitioningProperty::hashed(vec![v(5)])),
                vec![LocalProperty::Order(OrderColumn::asc(v(5)))],
            ),
            mapped
        );
    }
}
