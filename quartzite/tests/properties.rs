use std::collections::BTreeSet;

use maplit::btreeset;
use quartzite::expr::FunctionIdentifier::Count;
use quartzite::expr::{Expression, LogicalVariable};
use quartzite::heuristic::RuleBatch;
use quartzite::metadata::DataSourcePartitioning;
use quartzite::operator::physical::{DerivePropContext, PhysicalOperatorTrait};
use quartzite::operator::Join;
use quartzite::optimizer::OptimizationContext;
use quartzite::plan::{Plan, PlanBuilder};
use quartzite::properties::{
    equivalence_classes_and_fds, OrderKind, PropertiesCoordinator, StructuralPropertiesVector,
};
use quartzite::rules::EnforceStructuralPropertiesRule;

use crate::utils::catalog::{catalog, int_source, join_catalog, json_source, LINEITEM_SCHEMA_JSON};
use crate::utils::{optimize_with_defaults, v};

mod utils;

#[test]
fn test_fds_pass_through_exchange_order_and_limit() {
    let metadata = catalog(vec![json_source("lineitem", LINEITEM_SCHEMA_JSON)
        .with_primary_key(vec!["orderkey"])])
    .into_arc();
    let mut ctx = OptimizationContext::new(metadata);
    let mut plan = PlanBuilder::new()
        .scan("lineitem", vec![v(1), v(2), v(3)])
        .order(vec![(OrderKind::Desc, v(2).into())])
        .limit(10)
        .exchange()
        .build()
        .unwrap();

    let order = plan.input(plan.input(plan.root(), 0).unwrap(), 0).unwrap();
    let scan = plan.input(order, 0).unwrap();
    let (scan_classes, scan_fds) = equivalence_classes_and_fds(&mut plan, &mut ctx, scan).unwrap();
    assert!(!scan_fds.is_empty());

    let root = plan.root();
    let (classes, fds) = equivalence_classes_and_fds(&mut plan, &mut ctx, root).unwrap();
    assert_eq!(scan_fds, fds);
    assert_eq!(scan_classes, classes);
}

#[test]
fn test_equivalence_classes_are_disjoint() {
    let metadata = catalog(vec![int_source("A", &["a", "b", "c", "d", "e"])]).into_arc();
    let mut ctx = OptimizationContext::new(metadata);
    let condition = Expression::and_of(vec![
        Expression::eq(v(1), v(2)),
        Expression::eq(v(4), v(5)),
        Expression::eq(v(2), v(3)),
    ]);
    let mut plan = PlanBuilder::new()
        .scan("A", vec![v(1), v(2), v(3), v(4), v(5)])
        .select(condition)
        .build()
        .unwrap();

    let root = plan.root();
    let (classes, _) = equivalence_classes_and_fds(&mut plan, &mut ctx, root).unwrap();
    let members: Vec<BTreeSet<LogicalVariable>> =
        classes.iter().map(|class| class.members().clone()).collect();
    assert_eq!(2, members.len());
    assert!(members.contains(&btreeset! {v(1), v(2), v(3)}));
    assert!(members.contains(&btreeset! {v(4), v(5)}));

    let mut seen = BTreeSet::new();
    for class in &members {
        for member in class {
            assert!(seen.insert(*member), "{} is in two classes", member);
        }
    }
    assert!(classes.are_equivalent(v(1), v(3)));
    assert!(!classes.are_equivalent(v(1), v(4)));
}

fn grouped_join_plan() -> Plan {
    let mut builder = PlanBuilder::new();
    let b = builder.scan("B", vec![v(3), v(4)]).detach().unwrap();
    builder
        .scan("A", vec![v(1), v(2)])
        .join(Join::inner(Expression::eq(v(1), v(3))), b)
        .group_by(vec![(v(5), v(2).into())], vec![], |nested| {
            nested.aggregate(vec![v(6)], vec![Expression::call(Count, vec![v(4).into()])])
        })
        .order(vec![(OrderKind::Asc, v(5).into())])
        .build()
        .unwrap()
}

/// Every input delivers what its parent requires, once enforcement is done.
fn assert_requirements_met(plan: &mut Plan, ctx: &mut OptimizationContext) {
    for node in plan.reachable_nodes() {
        let physical = plan.node(node).physical.clone().unwrap();
        let requirements = physical
            .required_properties_for_children(&DerivePropContext {
                plan,
                node,
                required: None,
                optimizer: ctx,
            })
            .unwrap();
        let may_expand = requirements.coordinator == PropertiesCoordinator::NoCoordination;
        let (classes, fds) = equivalence_classes_and_fds(plan, ctx, node).unwrap();
        for (index, required) in requirements.required.iter().enumerate() {
            let mut required: StructuralPropertiesVector = match required {
                Some(required) => required.clone(),
                None => continue,
            };
            if index == 1 {
                let first = plan.input(node, 0).unwrap();
                let first_delivered = ctx.delivered_properties(first).unwrap().clone();
                required = requirements
                    .coordinator
                    .coordinate(&required, &first_delivered, &classes, &fds)
                    .unwrap();
            }
            let input = plan.input(node, index).unwrap();
            let delivered = ctx.delivered_properties(input).unwrap().clone();
            let (input_classes, input_fds) = equivalence_classes_and_fds(plan, ctx, input).unwrap();
            assert_eq!(
                None,
                delivered.unsatisfied_relative_to(
                    &required,
                    may_expand,
                    &input_classes,
                    &input_fds
                ),
                "Input {} of {} does not deliver {}",
                index,
                plan.operator(node).name(),
                required
            );
        }
    }
}

#[test]
fn test_enforced_plan_satisfies_all_requirements() {
    let metadata = join_catalog(1_000_000_000, 1_000_000_000).into_arc();
    let mut plan = grouped_join_plan();

    let mut ctx = optimize_with_defaults(&mut plan, metadata);

    assert_requirements_met(&mut plan, &mut ctx);
}

#[test]
fn test_enforcement_is_idempotent() {
    let metadata = join_catalog(1_000_000_000, 1_000_000_000).into_arc();
    let mut plan = grouped_join_plan();
    let mut ctx = optimize_with_defaults(&mut plan, metadata);
    let node_count = plan.node_count();

    ctx.reset_applied_rules();
    let mut enforcement = RuleBatch::fixpoint(
        "property-enforcement",
        false,
        vec![EnforceStructuralPropertiesRule::new().into()],
    );
    assert!(!enforcement.run(&mut plan, &mut ctx).unwrap());
    assert_eq!(node_count, plan.node_count());
}

#[test]
fn test_partitioned_source_keeps_its_partitioning() {
    let metadata = catalog(vec![int_source("A", &["k", "x"])
        .with_primary_key(vec!["k"])
        .with_partitioning(DataSourcePartitioning::HashOnPrimaryKey)])
    .into_arc();
    let mut plan = PlanBuilder::new()
        .scan("A", vec![v(1), v(2)])
        .group_by(vec![(v(3), v(1).into())], vec![], |nested| {
            nested.aggregate(vec![v(4)], vec![Expression::call(Count, vec![v(2).into()])])
        })
        .build()
        .unwrap();

    let mut ctx = optimize_with_defaults(&mut plan, metadata);

    let group_by = plan.root();
    let sort = plan.input(group_by, 0).unwrap();
    assert!(plan.node(sort).physical.as_ref().unwrap().is_sort());
    let scan = plan.input(sort, 0).unwrap();
    assert!(plan.operator(scan).as_data_source_scan().is_some());
    assert_requirements_met(&mut plan, &mut ctx);
}
