use std::collections::HashSet;

use anyhow::bail;
use log::debug;

use crate::error::{OptError, OptResult};
use crate::expr::{Expression, LogicalVariable};
use crate::operator::physical::{self, PhysicalOperator};
use crate::operator::LogicalOperator;
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::properties::{compute_fds_and_equivalence_classes, OrderColumn};
use crate::rules::RuleId::SetPhysicalOperators;
use crate::rules::{any, choose_join_strategy, pattern, PatterBuilder, Pattern, Rule, RuleId};
use crate::stat::estimate_logical_properties;

pub const HASH_GROUP_BY_ANNOTATION: &str = "hash-group-by";

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref SET_PHYSICAL_OPERATORS_PATTERN: Pattern = pattern(any).finish();
}

/// Chooses a physical implementation for every operator.
///
/// Group-bys are preclustered unless annotated with `hash-group-by`, orders are chosen by
/// [`choose_sort`], joins by [`choose_join_strategy`].
#[derive(Clone, Default)]
pub struct SetPhysicalOperatorsRule {
    nested: HashSet<NodeId>,
}

impl SetPhysicalOperatorsRule {
    pub fn new() -> Self {
        Self::default()
    }
}

fn variable_of(operator: &str, expr: &Expression) -> OptResult<LogicalVariable> {
    match expr.as_variable() {
        Some(var) => Ok(var),
        None => bail!(OptError::malformed(
            operator,
            format!("{} is not a variable reference", expr)
        )),
    }
}

fn grouping_columns(
    columns: &[(LogicalVariable, Expression)],
) -> OptResult<physical::GroupingColumns> {
    columns
        .iter()
        .map(|(out, expr)| Ok((*out, variable_of("GroupBy", expr)?)))
        .collect()
}

/// Sorts in memory inside nested plans, and when the whole input is estimated to fit the memory
/// of an external sort.
pub(crate) fn choose_sort(
    plan: &Plan,
    ctx: &mut OptimizationContext,
    input: NodeId,
    order: Vec<OrderColumn>,
    nested: bool,
) -> OptResult<PhysicalOperator> {
    let frames = estimate_logical_properties(plan, ctx, input)?.frames(ctx.physical_config());
    let in_memory = nested
        || frames
            .map(|frames| ctx.physical_config().fits_sort_memory(frames))
            .unwrap_or(false);
    debug!("Sort input needs {:?} frames, in memory: {}", frames, in_memory);
    Ok(if in_memory {
        physical::InMemoryStableSort { order }.into()
    } else {
        physical::StableSort { order }.into()
    })
}

fn physical_operator(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
    nested: bool,
) -> OptResult<PhysicalOperator> {
    if let LogicalOperator::GroupBy(_) = plan.operator(node) {
        // May move keys to the decorations first.
        compute_fds_and_equivalence_classes(plan, ctx, node)?;
    }
    if let LogicalOperator::Join(_) = plan.operator(node) {
        return choose_join_strategy(plan, ctx, node);
    }

    let operator: PhysicalOperator = match plan.operator(node) {
        LogicalOperator::EmptyTupleSource(_) => physical::EmptyTupleSource {}.into(),
        LogicalOperator::NestedTupleSource(nts) => physical::NestedTupleSource {
            source: nts.source(),
        }
        .into(),
        LogicalOperator::DataSourceScan(scan) => physical::DataSourceScan {
            data_source: scan.data_source().to_string(),
            variables: scan.variables().to_vec(),
        }
        .into(),
        LogicalOperator::Select(_) => physical::StreamSelect {}.into(),
        LogicalOperator::Assign(_) => physical::Assign {}.into(),
        LogicalOperator::Project(project) => physical::StreamProject {
            variables: project.variables.clone(),
        }
        .into(),
        LogicalOperator::Limit(_) => physical::StreamLimit {}.into(),
        LogicalOperator::Unnest(_) => physical::Unnest {}.into(),
        LogicalOperator::RunningAggregate(_) => physical::RunningAggregate {}.into(),
        LogicalOperator::Subplan(_) => physical::Subplan {}.into(),
        LogicalOperator::Replicate(_) => physical::Replicate {}.into(),
        LogicalOperator::UnionAll(_) => physical::UnionAll {}.into(),
        LogicalOperator::Script(script) => physical::Script {
            command: script.command.clone(),
            outputs: script.outputs.clone(),
        }
        .into(),
        LogicalOperator::Aggregate(_) => physical::Aggregate {}.into(),
        LogicalOperator::GroupBy(group_by) => {
            let keys = grouping_columns(&group_by.group_by)?;
            let decor = grouping_columns(&group_by.decor)?;
            if plan.node(node).annotation(HASH_GROUP_BY_ANNOTATION).is_some() {
                physical::ExternalGroupBy { keys, decor }.into()
            } else {
                physical::PreclusteredGroupBy { keys, decor }.into()
            }
        }
        LogicalOperator::Distinct(distinct) => physical::PreSortedDistinctBy {
            columns: distinct.variables.clone(),
        }
        .into(),
        LogicalOperator::Order(order) => {
            let columns = match order.order_columns() {
                Some(columns) => columns,
                None => bail!(OptError::unsupported(
                    "Order",
                    "ordering by an expression that is not a variable"
                )),
            };
            let input = plan.input(node, 0)?;
            choose_sort(plan, ctx, input, columns, nested)?
        }
        LogicalOperator::Exchange(_) => physical::OneToOneExchange {}.into(),
        LogicalOperator::Write(write) => physical::SinkWrite {
            sink: write.sink.clone(),
        }
        .into(),
        LogicalOperator::InsertDelete(insert_delete) => physical::InsertDelete {
            dataset: insert_delete.dataset.clone(),
            primary_keys: insert_delete
                .primary_keys
                .iter()
                .map(|key| variable_of("InsertDelete", key))
                .collect::<OptResult<Vec<_>>>()?,
        }
        .into(),
        LogicalOperator::Sink(_) => physical::Sink {}.into(),
        LogicalOperator::Join(_) => {
            bail!(OptError::internal("Join is implemented by its own rule"))
        }
    };
    Ok(operator)
}

impl Rule for SetPhysicalOperatorsRule {
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
        let inputs_before = plan.inputs(node);
        let operator = physical_operator(plan, ctx, node, self.nested.contains(&node))?;
        let changed = plan.node(node).physical.as_ref() != Some(&operator)
            || plan.inputs(node) != inputs_before;
        if changed {
            debug!("Implementing {} with {}", plan.operator(node).name(), operator);
            plan.node_mut(node).physical = Some(operator);
        }
        Ok(changed)
    }

    fn pattern(&self) -> &Pattern {
        &SET_PHYSICAL_OPERATORS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        SetPhysicalOperators
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OptError;
    use crate::expr::FunctionIdentifier::{Count, Plus};
    use crate::expr::{Expression, LogicalVariable};
    use crate::heuristic::RuleBatch;
    use crate::operator::physical::PhysicalOperator;
    use crate::operator::Join;
    use crate::optimizer::OptimizationContext;
    use crate::plan::PlanBuilder;
    use crate::properties::OrderKind;
    use crate::rules::SetPhysicalOperatorsRule;
    use crate::stat::Statistics;
    use crate::test_utils::{data_source, metadata_with};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    fn context() -> OptimizationContext {
        let metadata = metadata_with(vec![data_source("A", &["k", "x"])]);
        OptimizationContext::new(metadata.into_arc())
    }

    fn batch() -> RuleBatch {
        RuleBatch::once(
            "physical-operator-assignment",
            true,
            vec![SetPhysicalOperatorsRule::new().into()],
        )
    }

    #[test]
    fn test_group_by_with_nested_order() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .group_by(vec![(v(3), v(1).into())], vec![], |nested| {
                nested
                    .order(vec![(OrderKind::Asc, v(2).into())])
                    .aggregate(vec![v(4)], vec![Expression::call(Count, vec![v(2).into()])])
            })
            .order(vec![(OrderKind::Desc, v(3).into())])
            .build()
            .unwrap();

        batch().run(&mut plan, &mut ctx).unwrap();

        let order = plan.root();
        let group_by = plan.input(order, 0).unwrap();
        let aggregate = plan.nested_roots(group_by)[0];
        let nested_order = plan.input(aggregate, 0).unwrap();
        assert!(matches!(
            plan.node(order).physical,
            Some(PhysicalOperator::StableSort(_))
        ));
        assert!(matches!(
            plan.node(group_by).physical,
            Some(PhysicalOperator::PreclusteredGroupBy(_))
        ));
        assert!(matches!(
            plan.node(nested_order).physical,
            Some(PhysicalOperator::InMemoryStableSort(_))
        ));
        plan.validate(true).unwrap();
    }

    #[test]
    fn test_hash_group_by_annotation() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .group_by(vec![(v(3), v(1).into())], vec![], |nested| {
                nested.aggregate(vec![v(4)], vec![Expression::call(Count, vec![v(2).into()])])
            })
            .annotate("hash-group-by", "true")
            .build()
            .unwrap();

        batch().run(&mut plan, &mut ctx).unwrap();
        assert!(matches!(
            plan.node(plan.root()).physical,
            Some(PhysicalOperator::ExternalGroupBy(_))
        ));
    }

    #[test]
    fn test_group_by_on_expression_is_malformed() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .group_by(
                vec![(
                    v(3),
                    Expression::call(Plus, vec![v(1).into(), Expression::constant(1i64)]),
                )],
                vec![],
                |nested| {
                    nested.aggregate(vec![v(4)], vec![Expression::call(Count, vec![v(2).into()])])
                },
            )
            .build()
            .unwrap();

        let err = batch().run(&mut plan, &mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::MalformedPlan { .. })
        ));
    }

    #[test]
    fn test_small_order_sorts_in_memory() {
        let metadata = metadata_with(vec![
            data_source("A", &["k", "x"]).with_statistics(Statistics::new(1000, 16)),
            data_source("B", &["k", "x"]).with_statistics(Statistics::new(1_000_000_000, 16)),
        ]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let mut builder = PlanBuilder::new();
        let large = builder
            .scan("B", vec![v(3), v(4)])
            .order(vec![(OrderKind::Asc, v(3).into())])
            .detach()
            .unwrap();
        let mut plan = builder
            .scan("A", vec![v(1), v(2)])
            .order(vec![(OrderKind::Asc, v(1).into())])
            .join(Join::inner(Expression::eq(v(1), v(3))), large)
            .build()
            .unwrap();

        batch().run(&mut plan, &mut ctx).unwrap();

        let join = plan.root();
        assert!(matches!(
            plan.node(plan.input(join, 0).unwrap()).physical,
            Some(PhysicalOperator::InMemoryStableSort(_))
        ));
        assert!(matches!(
            plan.node(plan.input(join, 1).unwrap()).physical,
            Some(PhysicalOperator::StableSort(_))
        ));
    }
}
