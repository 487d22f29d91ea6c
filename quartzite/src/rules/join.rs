//! Join strategy selection.
//!
//! An equi-join on variables of opposite inputs becomes a hash join, anything else a nested
//! loop join. A `broadcast` annotation on an equality (or `broadcast-side` on the join
//! operator) names the input to replicate; that input is made the build side. Whichever way the
//! inputs are partitioned, a build side estimated to fit the join memory budget is joined
//! entirely in memory.
use anyhow::bail;
use log::debug;

use crate::error::{OptError, OptResult};
use crate::expr::{Expression, LogicalVariable};
use crate::operator::physical::{
    HybridHashJoin, InMemoryHashJoin, JoinPartitioning, NestedLoopJoin, PhysicalOperator,
};
use crate::operator::{JoinKind, LogicalOperator};
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, Plan};
use crate::stat::estimate_logical_properties;

pub const BROADCAST_ANNOTATION: &str = "broadcast";
pub const BROADCAST_SIDE_ANNOTATION: &str = "broadcast-side";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn parse(value: &str) -> Option<Side> {
        match value {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

struct EquiJoinKeys {
    left: Vec<LogicalVariable>,
    right: Vec<LogicalVariable>,
    broadcast: Option<Side>,
}

/// Splits `condition` into left and right key columns, `None` unless every conjunct is an
/// equality between a left and a right variable.
fn equi_join_keys(
    condition: &Expression,
    left_schema: &[LogicalVariable],
    right_schema: &[LogicalVariable],
) -> Option<EquiJoinKeys> {
    let mut keys = EquiJoinKeys {
        left: vec![],
        right: vec![],
        broadcast: None,
    };
    for conjunct in condition.conjuncts() {
        let (a, b) = conjunct.as_variable_equality()?;
        let (left, right) = if left_schema.contains(&a) && right_schema.contains(&b) {
            (a, b)
        } else if left_schema.contains(&b) && right_schema.contains(&a) {
            (b, a)
        } else {
            return None;
        };
        keys.left.push(left);
        keys.right.push(right);
        if let Some(side) = conjunct.annotation(BROADCAST_ANNOTATION).and_then(Side::parse) {
            keys.broadcast = Some(side);
        }
    }
    if keys.left.is_empty() {
        None
    } else {
        Some(keys)
    }
}

/// Picks the physical join for the join at `node`.
///
/// May swap the inputs of an inner join so that the broadcast input becomes input 1, the build
/// side. Schemas above `node` must be refreshed afterwards.
pub fn choose_join_strategy(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
) -> OptResult<PhysicalOperator> {
    let (kind, condition) = match plan.operator(node) {
        LogicalOperator::Join(join) => (join.kind, join.condition.clone()),
        other => bail!(OptError::internal(format!(
            "Join strategy requested for {}",
            other.name()
        ))),
    };
    let left = plan.input(node, 0)?;
    let right = plan.input(node, 1)?;

    let keys = equi_join_keys(&condition, plan.schema(left)?, plan.schema(right)?);
    let mut keys = match keys {
        Some(keys) => keys,
        None => {
            debug!("Join condition {} is not an equi-join, using nested loops", condition);
            return Ok(NestedLoopJoin { kind }.into());
        }
    };
    if keys.broadcast.is_none() {
        keys.broadcast = plan
            .node(node)
            .annotation(BROADCAST_SIDE_ANNOTATION)
            .and_then(Side::parse);
    }

    let partitioning = match (keys.broadcast, kind) {
        (Some(Side::Right), _) => JoinPartitioning::Broadcast,
        (Some(Side::Left), JoinKind::Inner) => {
            debug!("Swapping join inputs to build on the broadcast input");
            plan.swap_inputs(node, 0, 1)?;
            std::mem::swap(&mut keys.left, &mut keys.right);
            JoinPartitioning::Broadcast
        }
        (Some(Side::Left), JoinKind::LeftOuter) => {
            debug!("Cannot broadcast the outer input of a left outer join");
            JoinPartitioning::Pairwise
        }
        (None, _) => JoinPartitioning::Pairwise,
    };

    let build = plan.input(node, 1)?;
    let build_frames = estimate_logical_properties(plan, ctx, build)?.frames(ctx.physical_config());
    let in_memory = build_frames
        .map(|frames| ctx.physical_config().fits_join_memory(frames))
        .unwrap_or(false);
    debug!(
        "Join build side needs {:?} frames, in memory: {}",
        build_frames, in_memory
    );

    let physical = if in_memory {
        InMemoryHashJoin {
            kind,
            partitioning,
            left_keys: keys.left,
            right_keys: keys.right,
        }
        .into()
    } else {
        HybridHashJoin {
            kind,
            partitioning,
            left_keys: keys.left,
            right_keys: keys.right,
        }
        .into()
    };
    Ok(physical)
}

#[cfg(test)]
mod tests {
    use crate::expr::FunctionIdentifier::Gt;
    use crate::expr::{Expression, LogicalVariable};
    use crate::operator::physical::{JoinPartitioning, PhysicalOperator};
    use crate::operator::Join;
    use crate::optimizer::OptimizationContext;
    use crate::plan::{NodeId, Plan, PlanBuilder};
    use crate::rules::choose_join_strategy;
    use crate::stat::Statistics;
    use crate::test_utils::{data_source, metadata_with};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    fn context(b_rows: u64) -> OptimizationContext {
        let metadata = metadata_with(vec![
            data_source("A", &["x", "a"]).with_statistics(Statistics::new(1_000_000_000, 100)),
            data_source("B", &["y", "b"]).with_statistics(Statistics::new(b_rows, 100)),
        ]);
        OptimizationContext::new(metadata.into_arc())
    }

    fn join_plan(condition: Expression) -> (Plan, NodeId, NodeId) {
        let mut builder = PlanBuilder::new();
        let b = builder.scan("B", vec![v(3), v(4)]).detach().unwrap();
        let plan = builder
            .scan("A", vec![v(1), v(2)])
            .join(Join::inner(condition), b)
            .build()
            .unwrap();
        let a = plan.input(plan.root(), 0).unwrap();
        (plan, a, b)
    }

    #[test]
    fn test_large_inputs_use_pairwise_hybrid_hash_join() {
        let mut ctx = context(1_000_000_000);
        let (mut plan, _, _) = join_plan(Expression::eq(v(1), v(3)));
        let root = plan.root();
        let physical = choose_join_strategy(&mut plan, &mut ctx, root).unwrap();
        let join = physical.as_hybrid_hash_join().unwrap();
        assert_eq!(JoinPartitioning::Pairwise, join.partitioning);
        assert_eq!(vec![v(1)], join.left_keys);
        assert_eq!(vec![v(3)], join.right_keys);
    }

    #[test]
    fn test_small_broadcast_side_joins_in_memory() {
        let mut ctx = context(100);
        let (mut plan, a, b) =
            join_plan(Expression::eq(v(3), v(1)).annotated("broadcast", "right"));
        let root = plan.root();
        let physical = choose_join_strategy(&mut plan, &mut ctx, root).unwrap();
        let join = physical.as_in_memory_hash_join().unwrap();
        assert_eq!(JoinPartitioning::Broadcast, join.partitioning);
        assert_eq!(vec![v(1)], join.left_keys);
        assert_eq!(a, plan.input(root, 0).unwrap());
        assert_eq!(b, plan.input(root, 1).unwrap());
    }

    #[test]
    fn test_broadcast_left_swaps_inputs() {
        let mut ctx = context(100);
        let (mut plan, a, b) = join_plan(Expression::eq(v(1), v(3)));
        let root = plan.root();
        plan.node_mut(root)
            .annotations
            .insert("broadcast-side".to_string(), "left".to_string());
        let physical = choose_join_strategy(&mut plan, &mut ctx, root).unwrap();
        assert!(matches!(physical, PhysicalOperator::HybridHashJoin(_)));
        let join = physical.as_hybrid_hash_join().unwrap();
        assert_eq!(vec![v(3)], join.left_keys);
        assert_eq!(b, plan.input(root, 0).unwrap());
        assert_eq!(a, plan.input(root, 1).unwrap());
    }

    #[test]
    fn test_non_equi_join_uses_nested_loops() {
        let mut ctx = context(100);
        let (mut plan, _, _) =
            join_plan(Expression::call(Gt, vec![v(1).into(), v(3).into()]));
        let root = plan.root();
        let physical = choose_join_strategy(&mut plan, &mut ctx, root).unwrap();
        assert!(matches!(physical, PhysicalOperator::NestedLoopJoin(_)));
    }
}
