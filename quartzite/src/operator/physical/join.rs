use std::fmt::Formatter;

use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::operator::physical::{
    columns_field, no_requirements, DerivePropContext, PhysicalOperatorTrait,
};
use crate::operator::{ExecutionMode, JoinKind};
use crate::properties::{
    PartitioningProperty, PhysicalRequirements, PropertiesCoordinator,
    StructuralPropertiesVector,
};

/// How the inputs of a partitioned join are brought together.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum JoinPartitioning {
    /// Both inputs hash partitioned on the join keys.
    Pairwise,
    /// The build input (input 1) is replicated to every partition of the probe input.
    Broadcast,
}

fn hash_join_requirements(
    ctx: &DerivePropContext,
    partitioning: JoinPartitioning,
    left_keys: &[LogicalVariable],
    right_keys: &[LogicalVariable],
) -> OptResult<PhysicalRequirements> {
    if ctx.mode() != ExecutionMode::Partitioned {
        return no_requirements(ctx);
    }
    Ok(match partitioning {
        JoinPartitioning::Pairwise => PhysicalRequirements::new(vec![
            Some(StructuralPropertiesVector::new(
                Some(PartitioningProperty::hashed(left_keys.to_vec())),
                vec![],
            )),
            Some(StructuralPropertiesVector::new(
                Some(PartitioningProperty::hashed(right_keys.to_vec())),
                vec![],
            )),
        ])
        .with_coordinator(PropertiesCoordinator::EqualityCoordination {
            left_keys: left_keys.to_vec(),
            right_keys: right_keys.to_vec(),
        }),
        JoinPartitioning::Broadcast => broadcast_build_side(),
    })
}

fn broadcast_build_side() -> PhysicalRequirements {
    PhysicalRequirements::new(vec![
        None,
        Some(StructuralPropertiesVector::new(
            Some(PartitioningProperty::broadcast()),
            vec![],
        )),
    ])
}

fn hash_join_partitioning(
    ctx: &DerivePropContext,
    partitioning: JoinPartitioning,
    left_keys: &[LogicalVariable],
) -> OptResult<Option<PartitioningProperty>> {
    let probe = ctx.input_delivered(0)?.partitioning;
    if ctx.mode() != ExecutionMode::Partitioned {
        return Ok(probe);
    }
    Ok(match partitioning {
        JoinPartitioning::Pairwise => Some(PartitioningProperty::HashPartitioned {
            columns: left_keys.to_vec(),
            domain: probe.and_then(|p| p.domain().cloned()),
        }),
        JoinPartitioning::Broadcast => probe,
    })
}

fn display_hash_join(
    fmt: &mut Formatter,
    kind: JoinKind,
    partitioning: JoinPartitioning,
    left_keys: &[LogicalVariable],
    right_keys: &[LogicalVariable],
) -> std::fmt::Result {
    fmt.debug_struct("")
        .field("kind", &format_args!("{}", kind.as_ref()))
        .field("partitioning", &format_args!("{}", partitioning.as_ref()))
        .field("left_keys", &format_args!("{}", columns_field(left_keys)))
        .field("right_keys", &format_args!("{}", columns_field(right_keys)))
        .finish()
}

/// Hash join that spills partitions of both inputs when the build side exceeds memory.
/// Input 0 probes, input 1 builds.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct HybridHashJoin {
    pub kind: JoinKind,
    pub partitioning: JoinPartitioning,
    pub left_keys: Vec<LogicalVariable>,
    pub right_keys: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for HybridHashJoin {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        hash_join_requirements(ctx, self.partitioning, &self.left_keys, &self.right_keys)
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        let partitioning = hash_join_partitioning(ctx, self.partitioning, &self.left_keys)?;
        Ok(StructuralPropertiesVector::new(partitioning, vec![]))
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        display_hash_join(
            fmt,
            self.kind,
            self.partitioning,
            &self.left_keys,
            &self.right_keys,
        )
    }
}

/// Hash join whose build side fits in memory. The probe input streams through, keeping its
/// local properties.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct InMemoryHashJoin {
    pub kind: JoinKind,
    pub partitioning: JoinPartitioning,
    pub left_keys: Vec<LogicalVariable>,
    pub right_keys: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for InMemoryHashJoin {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        hash_join_requirements(ctx, self.partitioning, &self.left_keys, &self.right_keys)
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        let partitioning = hash_join_partitioning(ctx, self.partitioning, &self.left_keys)?;
        Ok(StructuralPropertiesVector::new(
            partitioning,
            ctx.input_delivered(0)?.local,
        ))
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        display_hash_join(
            fmt,
            self.kind,
            self.partitioning,
            &self.left_keys,
            &self.right_keys,
        )
    }
}

/// Fallback for conditions without equi-join keys. Input 1 is materialized and broadcast.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct NestedLoopJoin {
    pub kind: JoinKind,
}

impl PhysicalOperatorTrait for NestedLoopJoin {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        match ctx.mode() {
            ExecutionMode::Partitioned => Ok(broadcast_build_side()),
            _ => no_requirements(ctx),
        }
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(StructuralPropertiesVector::new(
            ctx.input_delivered(0)?.partitioning,
            vec![],
        ))
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("kind", &format_args!("{}", self.kind.as_ref()))
            .finish()
    }
}
