//! Exchanges move tuples between partitions. They are the only operators that change the
//! partitioning of a stream, and are inserted by property enforcement.
use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::operator::physical::{
    columns_field, no_requirements, DerivePropContext, PhysicalOperatorTrait,
};
use crate::properties::{
    LocalProperty, NodeDomain, OrderColumn, PartitioningProperty, PhysicalRequirements,
    StructuralPropertiesVector,
};

macro_rules! exchange_requirements {
    () => {
        fn required_properties_for_children(
            &self,
            ctx: &DerivePropContext,
        ) -> OptResult<PhysicalRequirements> {
            no_requirements(ctx)
        }

        fn is_micro_operator(&self) -> bool {
            false
        }
    };
}

/// Keeps every tuple on its partition.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct OneToOneExchange {}

impl PhysicalOperatorTrait for OneToOneExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        ctx.input_delivered(0)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct HashPartitionExchange {
    pub columns: Vec<LogicalVariable>,
    pub domain: Option<NodeDomain>,
}

impl PhysicalOperatorTrait for HashPartitionExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::new(
            Some(PartitioningProperty::HashPartitioned {
                columns: self.columns.clone(),
                domain: self.domain.clone(),
            }),
            vec![],
        ))
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("columns", &format_args!("{}", columns_field(&self.columns)))
            .finish()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RangePartitionExchange {
    pub columns: Vec<OrderColumn>,
    pub domain: Option<NodeDomain>,
}

impl PhysicalOperatorTrait for RangePartitionExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::new(
            Some(PartitioningProperty::RangePartitioned {
                columns: self.columns.clone(),
                domain: self.domain.clone(),
            }),
            vec![],
        ))
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("columns", &format_args!("{}", columns_field(&self.columns)))
            .finish()
    }
}

/// Replicates every tuple to all partitions of the domain.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BroadcastExchange {
    pub domain: Option<NodeDomain>,
}

impl PhysicalOperatorTrait for BroadcastExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::new(
            Some(PartitioningProperty::Broadcast {
                domain: self.domain.clone(),
            }),
            vec![],
        ))
    }
}

/// Gathers all partitions into one, in arrival order.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct RandomMergeExchange {}

impl PhysicalOperatorTrait for RandomMergeExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::unpartitioned(vec![]))
    }
}

/// Gathers partitions that are each sorted on `order` into one sorted partition.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SortMergeExchange {
    pub order: Vec<OrderColumn>,
}

impl PhysicalOperatorTrait for SortMergeExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::unpartitioned(
            self.order.iter().cloned().map(LocalProperty::Order).collect(),
        ))
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("order", &format_args!("{}", columns_field(&self.order)))
            .finish()
    }
}

/// Spreads tuples over the partitions of a domain without regard to their values.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RandomPartitionExchange {
    pub domain: Option<NodeDomain>,
}

impl PhysicalOperatorTrait for RandomPartitionExchange {
    exchange_requirements!();

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::new(
            Some(PartitioningProperty::Random {
                domain: self.domain.clone(),
            }),
            vec![],
        ))
    }
}
