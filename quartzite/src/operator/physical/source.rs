use std::fmt::Formatter;

use anyhow::bail;

use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::operator::physical::{
    columns_field, no_requirements, DerivePropContext, PhysicalOperatorTrait,
};
use crate::plan::NodeId;
use crate::properties::{PhysicalRequirements, StructuralPropertiesVector};

#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct EmptyTupleSource {}

impl PhysicalOperatorTrait for EmptyTupleSource {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        no_requirements(ctx)
    }

    fn delivered_properties(
        &self,
        _ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::unpartitioned(vec![]))
    }

    fn is_micro_operator(&self) -> bool {
        true
    }
}

/// Delivers whatever the input of the owning operator delivers.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct NestedTupleSource {
    pub source: NodeId,
}

impl PhysicalOperatorTrait for NestedTupleSource {
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
        let owner_input = ctx.plan.input(self.source, 0)?;
        match ctx.optimizer.delivered_properties(owner_input) {
            Some(delivered) => Ok(delivered.clone()),
            None => bail!(OptError::internal(
                "Nested tuple source derived before the input of its owner"
            )),
        }
    }

    fn is_micro_operator(&self) -> bool {
        true
    }
}

/// Reads a data source, delivering the partitioning and order the source is stored with.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DataSourceScan {
    pub data_source: String,
    pub variables: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for DataSourceScan {
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
        ctx.optimizer
            .metadata()
            .data_source_properties(&self.data_source, &self.variables)
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("data_source", &self.data_source)
            .field("variables", &format_args!("{}", columns_field(&self.variables)))
            .finish()
    }
}
