//! Structural property enforcement.
//!
//! Requirements flow top-down from the root, which accepts any partitioning, and deliveries flow
//! bottom-up. Whenever an input delivers less than its parent requires, exchanges and sorts are
//! inserted on that input edge. A user order whose input already delivers its order after
//! enforcement is spliced out.
use std::collections::BTreeSet;

use anyhow::bail;
use log::{debug, warn};

use crate::error::{OptError, OptResult};
use crate::operator::physical::{
    self, DerivePropContext, PhysicalOperator, PhysicalOperatorTrait,
};
use crate::operator::{Exchange, ExecutionMode, LogicalOperator, Order};
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::properties::{
    compute_fds_and_equivalence_classes, equivalence_classes_and_fds, match_local_properties,
    LocalProperty, NodeDomain, OrderColumn, PartitioningProperty, PropertiesCoordinator,
    StructuralPropertiesVector,
};
use crate::rules::physical::choose_sort;
use crate::rules::RuleId::EnforceStructuralProperties;
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref ENFORCE_STRUCTURAL_PROPERTIES_PATTERN: Pattern = pattern(any).finish();
}

/// Inserts the exchanges and sorts the physical operators need, starting at the root.
///
/// Processed operators are marked applied, so running the rule on an enforced plan changes
/// nothing.
#[derive(Clone, Default)]
pub struct EnforceStructuralPropertiesRule {}

impl EnforceStructuralPropertiesRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for EnforceStructuralPropertiesRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        if slot != OperatorSlot::Root {
            return Ok(false);
        }
        let required = StructuralPropertiesVector::random();
        enforce_slot(plan, ctx, slot, Some(&required), false, 0)
    }

    fn pattern(&self) -> &Pattern {
        &ENFORCE_STRUCTURAL_PROPERTIES_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        EnforceStructuralProperties
    }
}

fn physical_of(plan: &Plan, node: NodeId) -> OptResult<PhysicalOperator> {
    match &plan.node(node).physical {
        Some(physical) => Ok(physical.clone()),
        None => bail!(OptError::internal(format!(
            "{} has no physical operator",
            plan.operator(node).name()
        ))),
    }
}

fn delivered_of(
    ctx: &OptimizationContext,
    plan: &Plan,
    node: NodeId,
) -> OptResult<StructuralPropertiesVector> {
    match ctx.delivered_properties(node) {
        Some(delivered) => Ok(delivered.clone()),
        None => bail!(OptError::internal(format!(
            "Delivered properties of {} are not derived",
            plan.operator(node).name()
        ))),
    }
}

fn sort_order(physical: &PhysicalOperator) -> Option<&[OrderColumn]> {
    match physical {
        PhysicalOperator::StableSort(sort) => Some(&sort.order),
        PhysicalOperator::InMemoryStableSort(sort) => Some(&sort.order),
        _ => None,
    }
}

/// The domain shared by the inputs of `node`, the default domain if they disagree.
fn children_domain(ctx: &OptimizationContext, plan: &Plan, node: NodeId) -> OptResult<NodeDomain> {
    let mut domain: Option<NodeDomain> = None;
    for input in plan.inputs(node) {
        let delivered = delivered_of(ctx, plan, input)?;
        let input_domain = match delivered.partitioning.as_ref().and_then(|p| p.domain()) {
            Some(input_domain) => input_domain.clone(),
            None => continue,
        };
        match &domain {
            None => domain = Some(input_domain),
            Some(existing) if *existing != input_domain => {
                warn!(
                    "Inputs of {} span domains {} and {}, using the default domain",
                    plan.operator(node).name(),
                    existing,
                    input_domain
                );
                return Ok(NodeDomain::Default);
            }
            Some(_) => {}
        }
    }
    Ok(domain.unwrap_or_default())
}

fn enforce_slot(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    slot: OperatorSlot,
    required: Option<&StructuralPropertiesVector>,
    nested: bool,
    depth: usize,
) -> OptResult<bool> {
    let node = plan.node_at(slot)?;
    if ctx.is_rule_applied(EnforceStructuralProperties, node) {
        return Ok(false);
    }
    compute_fds_and_equivalence_classes(plan, ctx, node)?;
    let physical = physical_of(plan, node)?;
    let requirements = physical.required_properties_for_children(&DerivePropContext {
        plan,
        node,
        required,
        optimizer: ctx,
    })?;

    let mut changed = false;
    for index in 0..plan.inputs(node).len() {
        let input_required = requirements.required.get(index).cloned().flatten();
        let input_slot = OperatorSlot::Input {
            parent: node,
            index,
        };
        changed |= enforce_slot(plan, ctx, input_slot, input_required.as_ref(), nested, 0)?;
    }

    let domain = children_domain(ctx, plan, node)?;
    let (classes, fds) = equivalence_classes_and_fds(plan, ctx, node)?;
    let may_expand = requirements.coordinator == PropertiesCoordinator::NoCoordination;
    for index in 0..plan.inputs(node).len() {
        let mut input_required = match requirements.required.get(index).cloned().flatten() {
            Some(input_required) => input_required,
            None => continue,
        };
        input_required.partitioning = input_required
            .partitioning
            .map(|partitioning| partitioning.fill_domain(&domain));
        if index == 1 {
            let first = delivered_of(ctx, plan, plan.input(node, 0)?)?;
            input_required =
                requirements
                    .coordinator
                    .coordinate(&input_required, &first, &classes, &fds)?;
        }

        let input = plan.input(node, index)?;
        let delivered = delivered_of(ctx, plan, input)?;
        let (input_classes, input_fds) = equivalence_classes_and_fds(plan, ctx, input)?;
        if let Some(diff) = delivered.unsatisfied_relative_to(
            &input_required,
            may_expand,
            &input_classes,
            &input_fds,
        ) {
            debug!(
                "{} delivers {} to {}, which requires {}",
                plan.operator(input).name(),
                delivered,
                plan.operator(node).name(),
                input_required
            );
            add_enforcers(plan, ctx, node, index, &input_required, &diff, nested)?;
            changed = true;
        }
    }

    for nested_slot in plan.child_slots(node) {
        if let OperatorSlot::NestedRoot { .. } = nested_slot {
            changed |= enforce_slot(plan, ctx, nested_slot, None, true, 0)?;
        }
    }

    if let Some(order) = sort_order(&physical) {
        if is_redundant_sort(plan, ctx, node, order)? {
            if depth >= ctx.config().max_sort_elimination_cascade {
                bail!(OptError::internal(format!(
                    "Redundant order removal did not terminate after {} steps",
                    depth
                )));
            }
            // The node now in the slot delivers to a new parent, derive it again.
            let input = remove_sort(plan, slot, node)?;
            ctx.clear_rule_applied(EnforceStructuralProperties, input);
            enforce_slot(plan, ctx, slot, required, nested, depth + 1)?;
            return Ok(true);
        }
    }

    let delivered = physical.delivered_properties(&DerivePropContext {
        plan,
        node,
        required,
        optimizer: ctx,
    })?;
    ctx.set_delivered_properties(node, delivered);
    ctx.set_rule_applied(EnforceStructuralProperties, node);
    Ok(changed)
}

/// A sort is redundant when its input already delivers its order. A top-k order also drops
/// tuples and is never redundant.
fn is_redundant_sort(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
    order: &[OrderColumn],
) -> OptResult<bool> {
    if let LogicalOperator::Order(logical) = plan.operator(node) {
        if logical.top_k.is_some() {
            return Ok(false);
        }
    }
    let input = plan.input(node, 0)?;
    let delivered = delivered_of(ctx, plan, input)?;
    let (classes, fds) = equivalence_classes_and_fds(plan, ctx, input)?;
    let local: Vec<LocalProperty> = order.iter().cloned().map(LocalProperty::Order).collect();
    Ok(match_local_properties(&local, &delivered.local, &classes, &fds))
}

/// Splices the sort at `slot` out, together with a project right below it that keeps every
/// variable. Returns the node now held by `slot`.
fn remove_sort(plan: &mut Plan, slot: OperatorSlot, sort: NodeId) -> OptResult<NodeId> {
    let mut input = plan.input(sort, 0)?;
    debug!("Removing redundant {}", plan.operator(sort).name());
    if let LogicalOperator::Project(project) = plan.operator(input) {
        let below = plan.input(input, 0)?;
        if plan.schema(below)? == project.variables.as_slice() {
            debug!("Removing project below redundant order");
            input = below;
        }
    }
    plan.set_slot(slot, input)?;
    plan.refresh_schemas()?;
    Ok(input)
}

/// Columns to sort on so that `local` holds. A grouping is met by sorting ascending.
fn sort_columns(local: &[LocalProperty]) -> Vec<OrderColumn> {
    let mut seen = BTreeSet::new();
    let mut columns = Vec::new();
    for prop in local {
        match prop {
            LocalProperty::Order(order) => {
                if seen.insert(order.column) {
                    columns.push(order.clone());
                }
            }
            LocalProperty::Grouping(grouping) => {
                for column in grouping {
                    if seen.insert(*column) {
                        columns.push(OrderColumn::asc(*column));
                    }
                }
            }
        }
    }
    columns
}

fn partitioning_exchange(partitioning: &PartitioningProperty) -> OptResult<PhysicalOperator> {
    let exchange: PhysicalOperator = match partitioning {
        PartitioningProperty::HashPartitioned { columns, domain } => {
            if columns.is_empty() {
                bail!(OptError::unsupported(
                    "Exchange",
                    "hash partitioning on no columns"
                ));
            }
            physical::HashPartitionExchange {
                columns: columns.clone(),
                domain: domain.clone(),
            }
            .into()
        }
        PartitioningProperty::RangePartitioned { columns, domain } => {
            physical::RangePartitionExchange {
                columns: columns.clone(),
                domain: domain.clone(),
            }
            .into()
        }
        PartitioningProperty::Broadcast { domain } => physical::BroadcastExchange {
            domain: domain.clone(),
        }
        .into(),
        PartitioningProperty::Random { domain } => physical::RandomPartitionExchange {
            domain: domain.clone(),
        }
        .into(),
        PartitioningProperty::Unpartitioned => bail!(OptError::internal(
            "Partitioning exchange requested for a single partition"
        )),
    };
    Ok(exchange)
}

/// Makes input `index` of `parent` deliver `required`, given the unsatisfied part `diff`.
///
/// Inside nested plans only local properties are enforced.
fn add_enforcers(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    parent: NodeId,
    index: usize,
    required: &StructuralPropertiesVector,
    diff: &StructuralPropertiesVector,
    nested: bool,
) -> OptResult<()> {
    let partitioning = if nested {
        None
    } else {
        diff.partitioning.as_ref()
    };
    match partitioning {
        Some(PartitioningProperty::Unpartitioned) => {
            sort_if_unmet(plan, ctx, parent, index, &required.local, nested)?;
            let input = plan.input(parent, index)?;
            let order = delivered_of(ctx, plan, input)?.order_columns();
            let merge: PhysicalOperator = if order.is_empty() {
                physical::RandomMergeExchange {}.into()
            } else {
                physical::SortMergeExchange { order }.into()
            };
            insert_enforcer(
                plan,
                ctx,
                parent,
                index,
                Exchange::new(),
                merge,
                ExecutionMode::Unpartitioned,
            )?;
        }
        Some(partitioning) => {
            let exchange = partitioning_exchange(partitioning)?;
            insert_enforcer(
                plan,
                ctx,
                parent,
                index,
                Exchange::new(),
                exchange,
                ExecutionMode::Partitioned,
            )?;
            sort_if_unmet(plan, ctx, parent, index, &required.local, nested)?;
        }
        None => sort_if_unmet(plan, ctx, parent, index, &required.local, nested)?,
    }
    Ok(())
}

fn sort_if_unmet(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    parent: NodeId,
    index: usize,
    local: &[LocalProperty],
    nested: bool,
) -> OptResult<()> {
    if local.is_empty() {
        return Ok(());
    }
    let input = plan.input(parent, index)?;
    let delivered = delivered_of(ctx, plan, input)?;
    let (classes, fds) = equivalence_classes_and_fds(plan, ctx, input)?;
    if match_local_properties(local, &delivered.local, &classes, &fds) {
        return Ok(());
    }

    let order = sort_columns(local);
    let logical = Order::from_columns(&order);
    let sort = choose_sort(plan, ctx, input, order, nested)?;
    insert_enforcer(plan, ctx, parent, index, logical, sort, ExecutionMode::Local)?;
    Ok(())
}

/// Puts `logical` implemented by `physical` on input edge `index` of `parent`, with schema,
/// dependencies and delivered properties derived right away.
fn insert_enforcer<O: Into<LogicalOperator>>(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    parent: NodeId,
    index: usize,
    logical: O,
    physical: PhysicalOperator,
    mode: ExecutionMode,
) -> OptResult<NodeId> {
    let input = plan.input(parent, index)?;
    debug!(
        "Inserting {} below {}",
        physical,
        plan.operator(parent).name()
    );
    let enforcer = plan.add_node(logical, &[input]);
    let node = plan.node_mut(enforcer);
    node.physical = Some(physical.clone());
    node.execution_mode = mode;
    plan.set_input(parent, index, enforcer);
    plan.recompute_schema(enforcer)?;
    plan.recompute_schema(parent)?;

    compute_fds_and_equivalence_classes(plan, ctx, enforcer)?;
    let delivered = physical.delivered_properties(&DerivePropContext {
        plan,
        node: enforcer,
        required: None,
        optimizer: ctx,
    })?;
    ctx.set_delivered_properties(enforcer, delivered);
    ctx.set_rule_applied(EnforceStructuralProperties, enforcer);
    Ok(enforcer)
}

#[cfg(test)]
mod tests {
    use crate::config::OptimizerConfig;
    use crate::error::OptError;
    use crate::expr::FunctionIdentifier::Count;
    use crate::expr::{Expression, LogicalVariable};
    use crate::heuristic::RuleBatch;
    use crate::metadata::DataSourcePartitioning;
    use crate::operator::physical::PhysicalOperator;
    use crate::operator::LogicalOperator;
    use crate::optimizer::OptimizationContext;
    use crate::plan::{Plan, PlanBuilder};
    use crate::properties::{OrderColumn, OrderKind};
    use crate::rules::{
        EnforceStructuralPropertiesRule, SetExecutionModeRule, SetPhysicalOperatorsRule,
    };
    use crate::test_utils::{data_source, metadata_with};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    fn prepare(plan: &mut Plan, ctx: &mut OptimizationContext) {
        RuleBatch::once(
            "data-exchange-insertion",
            true,
            vec![SetExecutionModeRule::new().into()],
        )
        .run(plan, ctx)
        .unwrap();
        RuleBatch::once(
            "physical-operator-assignment",
            true,
            vec![SetPhysicalOperatorsRule::new().into()],
        )
        .run(plan, ctx)
        .unwrap();
    }

    fn enforcement() -> RuleBatch {
        RuleBatch::fixpoint(
            "property-enforcement",
            false,
            vec![EnforceStructuralPropertiesRule::new().into()],
        )
    }

    fn group_by_count(builder: &mut PlanBuilder) -> &mut PlanBuilder {
        builder.group_by(vec![(v(3), v(1).into())], vec![], |nested| {
            nested.aggregate(vec![v(4)], vec![Expression::call(Count, vec![v(2).into()])])
        })
    }

    #[test]
    fn test_partitioned_group_by_gets_exchange_and_sort() {
        let metadata = metadata_with(vec![
            data_source("A", &["k", "x"]).with_partitioning(DataSourcePartitioning::Random)
        ]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let mut builder = PlanBuilder::new();
        builder.scan("A", vec![v(2), v(1)]);
        let mut plan = group_by_count(&mut builder).build().unwrap();
        prepare(&mut plan, &mut ctx);

        assert!(enforcement().run(&mut plan, &mut ctx).unwrap());

        let group_by = plan.root();
        let sort = plan.input(group_by, 0).unwrap();
        let exchange = plan.input(sort, 0).unwrap();
        assert_eq!(
            Some(&PhysicalOperator::StableSort(
                crate::operator::physical::StableSort {
                    order: vec![OrderColumn::asc(v(1))]
                }
            )),
            plan.node(sort).physical.as_ref()
        );
        let hash = plan.node(exchange).physical.as_ref().unwrap();
        assert_eq!(
            vec![v(1)],
            hash.as_hash_partition_exchange().unwrap().columns
        );
        assert!(matches!(
            plan.operator(plan.input(exchange, 0).unwrap()),
            LogicalOperator::DataSourceScan(_)
        ));
        plan.validate(true).unwrap();

        ctx.reset_applied_rules();
        assert!(!enforcement().run(&mut plan, &mut ctx).unwrap());
    }

    #[test]
    fn test_order_on_preclustered_group_key_is_removed() {
        let metadata = metadata_with(vec![data_source("A", &["k", "x"])
            .with_primary_key(vec!["k"])
            .with_partitioning(DataSourcePartitioning::HashOnPrimaryKey)
            .ordered_by_primary_key()]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let mut builder = PlanBuilder::new();
        builder.scan("A", vec![v(1), v(2)]);
        let mut plan = group_by_count(&mut builder)
            .order(vec![(OrderKind::Asc, v(3).into())])
            .build()
            .unwrap();
        prepare(&mut plan, &mut ctx);

        assert!(enforcement().run(&mut plan, &mut ctx).unwrap());

        let merge = plan.root();
        assert_eq!(
            Some(&PhysicalOperator::SortMergeExchange(
                crate::operator::physical::SortMergeExchange {
                    order: vec![OrderColumn::asc(v(3))]
                }
            )),
            plan.node(merge).physical.as_ref()
        );
        let group_by = plan.input(merge, 0).unwrap();
        assert!(matches!(
            plan.operator(group_by),
            LogicalOperator::GroupBy(_)
        ));
        assert!(matches!(
            plan.operator(plan.input(group_by, 0).unwrap()),
            LogicalOperator::DataSourceScan(_)
        ));
        assert!(plan
            .reachable_nodes()
            .iter()
            .all(|node| !matches!(plan.operator(*node), LogicalOperator::Order(_))));
    }

    #[test]
    fn test_top_k_order_is_kept() {
        let metadata = metadata_with(vec![data_source("A", &["k", "x"])
            .with_primary_key(vec!["k"])
            .ordered_by_primary_key()]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .order(vec![(OrderKind::Asc, v(1).into())])
            .build()
            .unwrap();
        let order = plan.root();
        if let LogicalOperator::Order(op) = plan.operator_mut(order) {
            op.top_k = Some(5);
        }
        plan.refresh_schemas().unwrap();
        prepare(&mut plan, &mut ctx);

        enforcement().run(&mut plan, &mut ctx).unwrap();
        assert_eq!(order, plan.root());
        assert!(matches!(
            plan.operator(plan.input(order, 0).unwrap()),
            LogicalOperator::DataSourceScan(_)
        ));
    }

    fn stacked_orders() -> Plan {
        PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .order(vec![(OrderKind::Asc, v(1).into())])
            .order(vec![(OrderKind::Asc, v(1).into())])
            .build()
            .unwrap()
    }

    fn ordered_source() -> crate::metadata::InMemoryMetadataProvider {
        metadata_with(vec![data_source("A", &["k", "x"])
            .with_primary_key(vec!["k"])
            .ordered_by_primary_key()])
    }

    #[test]
    fn test_stacked_redundant_orders_are_removed() {
        let mut ctx = OptimizationContext::new(ordered_source().into_arc());
        let mut plan = stacked_orders();
        prepare(&mut plan, &mut ctx);

        assert!(enforcement().run(&mut plan, &mut ctx).unwrap());

        let scan = plan.root();
        assert!(matches!(
            plan.operator(scan),
            LogicalOperator::DataSourceScan(_)
        ));
        assert_eq!(
            vec![OrderColumn::asc(v(1))],
            ctx.delivered_properties(scan).unwrap().order_columns()
        );
        ctx.reset_applied_rules();
        assert!(!enforcement().run(&mut plan, &mut ctx).unwrap());
    }

    #[test]
    fn test_sort_elimination_cascade_bound() {
        let config = OptimizerConfig {
            max_sort_elimination_cascade: 0,
            ..Default::default()
        };
        let mut ctx = OptimizationContext::with_config(ordered_source().into_arc(), config);
        let mut plan = stacked_orders();
        prepare(&mut plan, &mut ctx);

        let err = enforcement().run(&mut plan, &mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::Internal(_))
        ));
    }
}
