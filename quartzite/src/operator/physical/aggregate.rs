use std::collections::BTreeSet;
use std::fmt::Formatter;

use itertools::Itertools;

use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::operator::physical::{
    columns_field, map_properties, project_properties, unpartitioned_if_global,
    DerivePropContext, PhysicalOperatorTrait,
};
use crate::operator::ExecutionMode;
use crate::properties::{
    LocalProperty, OrderColumn, PartitioningProperty, PhysicalRequirements,
    StructuralPropertiesVector,
};

/// Folds all input tuples into one.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Aggregate {}

impl PhysicalOperatorTrait for Aggregate {
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
        let partitioning = match ctx.mode() {
            ExecutionMode::Unpartitioned => Some(PartitioningProperty::Unpartitioned),
            _ => ctx.input_delivered(0)?.partitioning,
        };
        Ok(StructuralPropertiesVector::new(partitioning, vec![]))
    }

    fn is_micro_operator(&self) -> bool {
        true
    }
}

/// Output and input variable of each group key and decor entry, `(output, input)`.
pub type GroupingColumns = Vec<(LogicalVariable, LogicalVariable)>;

fn output_of(columns: &[&GroupingColumns], var: LogicalVariable) -> Option<LogicalVariable> {
    columns
        .iter()
        .flat_map(|c| c.iter())
        .find(|(_, input)| *input == var)
        .map(|(output, _)| *output)
}

fn inputs_of(columns: &GroupingColumns) -> Vec<LogicalVariable> {
    columns.iter().map(|(_, input)| *input).collect()
}

fn hash_if_partitioned(
    ctx: &DerivePropContext,
    keys: &GroupingColumns,
) -> Option<PartitioningProperty> {
    match ctx.mode() {
        ExecutionMode::Partitioned => Some(PartitioningProperty::hashed(inputs_of(keys))),
        _ => None,
    }
}

fn display_grouping(
    fmt: &mut Formatter,
    keys: &GroupingColumns,
    decor: &GroupingColumns,
) -> std::fmt::Result {
    let assignments =
        |columns: &GroupingColumns| -> String {
            format!(
                "[{}]",
                columns
                    .iter()
                    .map(|(output, input)| format!("{} := {}", output, input))
                    .join(", ")
            )
        };
    let mut builder = fmt.debug_struct("");
    builder.field("keys", &format_args!("{}", assignments(keys)));
    if !decor.is_empty() {
        builder.field("decor", &format_args!("{}", assignments(decor)));
    }
    builder.finish()
}

/// Group-by over input that is already clustered on the keys. Groups are finished as soon as
/// the key changes, so whatever order the input has survives.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PreclusteredGroupBy {
    pub keys: GroupingColumns,
    pub decor: GroupingColumns,
}

impl PhysicalOperatorTrait for PreclusteredGroupBy {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        let grouping: BTreeSet<LogicalVariable> = inputs_of(&self.keys).into_iter().collect();
        Ok(PhysicalRequirements::new(vec![Some(
            StructuralPropertiesVector::new(
                hash_if_partitioned(ctx, &self.keys),
                vec![LocalProperty::Grouping(grouping)],
            ),
        )]))
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        let delivered = ctx.input_delivered(0)?;
        Ok(map_properties(&delivered, |var| {
            output_of(&[&self.keys, &self.decor], var)
        }))
    }

    fn is_micro_operator(&self) -> bool {
        true
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        display_grouping(fmt, &self.keys, &self.decor)
    }
}

/// Hash based group-by that spills to disk. Needs co-located keys, emits groups in no
/// particular order.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ExternalGroupBy {
    pub keys: GroupingColumns,
    pub decor: GroupingColumns,
}

impl PhysicalOperatorTrait for ExternalGroupBy {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        let required = hash_if_partitioned(ctx, &self.keys)
            .map(|partitioning| StructuralPropertiesVector::new(Some(partitioning), vec![]));
        Ok(PhysicalRequirements::new(vec![required]))
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        let delivered = ctx.input_delivered(0)?;
        let mut mapped = map_properties(&delivered, |var| {
            output_of(&[&self.keys, &self.decor], var)
        });
        mapped.local.clear();
        Ok(mapped)
    }

    fn is_micro_operator(&self) -> bool {
        false
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        display_grouping(fmt, &self.keys, &self.decor)
    }
}

/// Duplicate elimination over input sorted on the distinct columns.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PreSortedDistinctBy {
    pub columns: Vec<LogicalVariable>,
}

impl PhysicalOperatorTrait for PreSortedDistinctBy {
    fn required_properties_for_children(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<PhysicalRequirements> {
        let partitioning = match ctx.mode() {
            ExecutionMode::Partitioned => Some(PartitioningProperty::hashed(self.columns.clone())),
            ExecutionMode::Unpartitioned => Some(PartitioningProperty::Unpartitioned),
            ExecutionMode::Local => None,
        };
        let local = self
            .columns
            .iter()
            .map(|column| LocalProperty::Order(OrderColumn::asc(*column)))
            .collect();
        Ok(PhysicalRequirements::new(vec![Some(
            StructuralPropertiesVector::new(partitioning, local),
        )]))
    }

    fn delivered_properties(
        &self,
        ctx: &DerivePropContext,
    ) -> OptResult<StructuralPropertiesVector> {
        Ok(project_properties(&ctx.input_delivered(0)?, &self.columns))
    }

    fn is_micro_operator(&self) -> bool {
        true
    }

    fn display_fields(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("")
            .field("columns", &format_args!("{}", columns_field(&self.columns)))
            .finish()
    }
}
