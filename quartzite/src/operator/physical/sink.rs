use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::operator::physical::{
    columns_field, no_requirements, DerivePropContext, PhysicalOperatorTrait,
};
use crate::operator::ExecutionMode;
use crate::properties::{PartitioningProperty, PhysicalRequirements, StructuralPropertiesVector};

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SinkWrite {
    pub sink: String,
}

impl PhysicalOperatorTrait for SinkWrite {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        no_requirements(ctx)
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        ctx.input_delivered(0)
    }

    fn is_micro_operator(&self) -> bool {
        true
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("").field("sink", &self.sink).finish()
    }
}

/// Modifies a dataset partitioned on its primary key, so partitioned input must be
/// hash partitioned the same way.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct InsertDelete {
    pub dataset: String,
    pub primary_keys: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for InsertDelete {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        if ctx.mode() != ExecutionMode::Partitioned || self.primary_keys.is_empty() {
            return no_requirements(ctx);
        }
        Ok(PhysicalRequirements::new(vec![Some(
            StructuralPropertiesVector::new(
                Some(PartitioningProperty::hashed(self.primary_keys.clone())),
                vec![],
            ),
        )]))
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        ctx.input_delivered(0)
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("dataset", &self.dataset)
            .field(
                "primary_keys",
                &format_args!("{}", columns_field(&self.primary_keys)),
            )
            .finish()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Sink {}

impl PhysicalOperatorTrait for Sink {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        no_requirements(ctx)
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        ctx.input_delivered(0)
    }

    fn is_micro_operator(&self) -> bool {
        false
    }
}
