use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::operator::physical::{
    columns_field, no_requirements, project_properties, unpartitioned_if_global,
    DerivePropContext, PhysicalOperatorTrait,
};
use crate::operator::ExecutionMode;
use crate::properties::{
    PartitioningProperty, PhysicalRequirements, StructuralPropertiesVector,
};

macro_rules! pipelined_operator {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
        pub struct $name {}

        impl PhysicalOperatorTrait for $name {
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
        }
    };
}

pipelined_operator!(StreamSelect);
pipelined_operator!(Assign);
pipelined_operator!(Unnest);
pipelined_operator!(
    /// Runs its nested plans once per input tuple.
    Subplan
);
pipelined_operator!(Replicate);

/// Keeps the listed variables, along with what is still known about them.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StreamProject {
    pub variables: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for StreamProject {
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
        Ok(project_properties(&ctx.input_delivered(0)?, &self.variables))
    }

    fn is_micro_operator(&self) -> bool {
        true
    }
}

/// A limit is exact only when it sees every tuple, so a global limit needs a single partition.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct StreamLimit {}

impl PhysicalOperatorTrait for StreamLimit {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        unpartitioned_if_global(ctx)
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
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct RunningAggregate {}

impl PhysicalOperatorTrait for RunningAggregate {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        unpartitioned_if_global(ctx)
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
}

/// Concatenates its inputs. Nothing is known about the order of the result.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct UnionAll {}

impl PhysicalOperatorTrait for UnionAll {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        match ctx.mode() {
            ExecutionMode::Unpartitioned => Ok(PhysicalRequirements::new(vec![
                Some(StructuralPropertiesVector::unpartitioned(vec![]));
                2
            ])),
            _ => no_requirements(ctx),
        }
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        let partitioning = match ctx.mode() {
            ExecutionMode::Unpartitioned => PartitioningProperty::Unpartitioned,
            _ => PartitioningProperty::Random {
                domain: ctx
                    .input_delivered(0)?
                    .partitioning
                    .and_then(|p| p.domain().cloned()),
            },
        };
        Ok(StructuralPropertiesVector::new(Some(partitioning), vec![]))
    }

    fn is_micro_operator(&self) -> bool {
        false
    }
}

/// Pipes tuples through an external command.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Script {
    pub command: String,
    pub outputs: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for Script {
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
        let partitioning = ctx.input_delivered(0)?.partitioning.map(|p| match p {
            PartitioningProperty::HashPartitioned { domain, .. }
            | PartitioningProperty::RangePartitioned { domain, .. } => {
                PartitioningProperty::Random { domain }
            }
            other => other,
        });
        Ok(StructuralPropertiesVector::new(partitioning, vec![]))
    }

    fn is_micro_operator(&self) -> bool {
        true
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("command", &self.command)
            .field("outputs", &format_args!("{}", columns_field(&self.outputs)))
            .finish()
    }
}
