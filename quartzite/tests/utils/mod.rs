#![allow(dead_code)]

pub mod catalog;

use std::sync::Arc;

use quartzite::expr::LogicalVariable;
use quartzite::metadata::MetadataProvider;
use quartzite::operator::physical::PhysicalOperator;
use quartzite::operator::LogicalOperator;
use quartzite::optimize;
use quartzite::optimizer::OptimizationContext;
use quartzite::plan::explain::explain_to_string;
use quartzite::plan::{NodeId, Plan};
use quartzite::rules::{default_logical_rewrites, default_physical_rewrites};

pub fn v(id: u32) -> LogicalVariable {
    LogicalVariable(id)
}

/// Runs the default logical and physical batches over `plan`.
pub fn optimize_with_defaults(
    plan: &mut Plan,
    metadata: Arc<dyn MetadataProvider>,
) -> OptimizationContext {
    let mut ctx = OptimizationContext::new(metadata);
    optimize(
        plan,
        &mut default_logical_rewrites(),
        &mut default_physical_rewrites(),
        &mut ctx,
    )
    .unwrap();
    ctx
}

/// Reachable nodes whose logical operator satisfies `predicate`, parents first.
pub fn find_nodes<F>(plan: &Plan, predicate: F) -> Vec<NodeId>
where
    F: Fn(&LogicalOperator) -> bool,
{
    plan.reachable_nodes()
        .into_iter()
        .filter(|node| predicate(plan.operator(*node)))
        .collect()
}

pub fn physical(plan: &Plan, node: NodeId) -> &PhysicalOperator {
    plan.node(node).physical.as_ref().unwrap()
}

pub fn assert_plan_eq(expected: &str, plan: &Plan) {
    let actual = explain_to_string(plan).unwrap();
    assert_eq!(expected, actual, "Optimized plan is different:\n{}", actual);
}
