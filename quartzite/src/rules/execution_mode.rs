use std::collections::HashSet;

use crate::error::OptResult;
use crate::operator::{ExecutionMode, LogicalOperator};
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::rules::RuleId::SetExecutionMode;
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref SET_EXECUTION_MODE_PATTERN: Pattern = pattern(any).finish();
}

/// Decides where each operator runs, bottom up.
///
/// Operators of nested plans run locally. A scan of a partitioned data source runs partitioned,
/// and so does every operator above a partitioned input, except for the ones that need to see
/// all tuples at once: global aggregates, limits, running aggregates and orders.
#[derive(Clone, Default)]
pub struct SetExecutionModeRule {
    nested: HashSet<NodeId>,
}

impl SetExecutionModeRule {
    pub fn new() -> Self {
        Self::default()
    }

    fn execution_mode(
        &self,
        plan: &Plan,
        ctx: &OptimizationContext,
        node: NodeId,
    ) -> OptResult<ExecutionMode> {
        if self.nested.contains(&node) {
            return Ok(ExecutionMode::Local);
        }
        let mode = match plan.operator(node) {
            LogicalOperator::EmptyTupleSource(_) => ExecutionMode::Unpartitioned,
            LogicalOperator::DataSourceScan(scan) => {
                let properties = ctx
                    .metadata()
                    .data_source_properties(scan.data_source(), scan.variables())?;
                match properties.partitioning {
                    Some(partitioning) if partitioning.is_partitioned() => {
                        ExecutionMode::Partitioned
                    }
                    _ => ExecutionMode::Unpartitioned,
                }
            }
            LogicalOperator::Aggregate(_)
            | LogicalOperator::RunningAggregate(_)
            | LogicalOperator::Limit(_)
            | LogicalOperator::Order(_) => ExecutionMode::Unpartitioned,
            _ => {
                let partitioned = plan
                    .inputs(node)
                    .iter()
                    .any(|input| plan.node(*input).execution_mode == ExecutionMode::Partitioned);
                if partitioned {
                    ExecutionMode::Partitioned
                } else {
                    ExecutionMode::Unpartitioned
                }
            }
        };
        Ok(mode)
    }
}

impl Rule for SetExecutionModeRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        if slot == OperatorSlot::Root {
            self.nested = plan.nested_nodes();
        }
        Ok(false)
    }

    fn rewrite_post(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let node = plan.node_at(slot)?;
        let mode = self.execution_mode(plan, ctx, node)?;
        if plan.node(node).execution_mode == mode {
            return Ok(false);
        }
        plan.node_mut(node).execution_mode = mode;
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &SET_EXECUTION_MODE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        SetExecutionMode
    }
}
