use std::fmt::Formatter;

use crate::error::OptResult;
use crate::operator::physical::{columns_field, DerivePropContext, PhysicalOperatorTrait};
use crate::operator::ExecutionMode;
use crate::properties::{
    LocalProperty, OrderColumn, PartitioningProperty, PhysicalRequirements,
    StructuralPropertiesVector,
};

fn order_properties(order: &[OrderColumn]) -> Vec<LocalProperty> {
    order.iter().cloned().map(LocalProperty::Order).collect()
}

/// A sort placed by the user asks for its order from below, so that enforcement can satisfy it
/// with a partitioned sort and an order preserving merge. Sorts inserted as enforcers run
/// locally and require nothing.
fn sort_requirements(
    ctx: &DerivePropContext,
    order: &[OrderColumn],
) -> OptResult<PhysicalRequirements> {
    let required = match ctx.mode() {
        ExecutionMode::Unpartitioned => Some(StructuralPropertiesVector::unpartitioned(
            order_properties(order),
        )),
        ExecutionMode::Partitioned => Some(StructuralPropertiesVector::new(
            None,
            order_properties(order),
        )),
        ExecutionMode::Local => None,
    };
    Ok(PhysicalRequirements::new(vec![required]))
}

fn sort_delivered(
    ctx: &DerivePropContext,
    order: &[OrderColumn],
) -> OptResult<StructuralPropertiesVector> {
    let partitioning = match ctx.mode() {
        ExecutionMode::Unpartitioned => Some(PartitioningProperty::Unpartitioned),
        _ => ctx.input_delivered(0)?.partitioning,
    };
    Ok(StructuralPropertiesVector::new(
        partitioning,
        order_properties(order),
    ))
}

/// External merge sort.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StableSort {
    pub order: Vec<OrderColumn>,
}

impl PhysicalOperatorTrait for StableSort {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        sort_requirements(ctx, &self.order)
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        sort_delivered(ctx, &self.order)
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("order", &format_args!("{}", columns_field(&self.order)))
            .finish()
    }
}

/// Sort of the tuples of one nested plan invocation, kept in memory.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct InMemoryStableSort {
    pub order: Vec<OrderColumn>,
}

impl PhysicalOperatorTrait for InMemoryStableSort {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        sort_requirements(ctx, &self.order)
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        sort_delivered(ctx, &self.order)
    }

    fn is_micro_operator(&self) -> bool {
        true
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("order", &format_args!("{}", columns_field(&self.order)))
            .finish()
    }
}
