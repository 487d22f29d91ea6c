use log::debug;

use crate::error::OptResult;
use crate::expr::{Expression, LogicalVariable};
use crate::operator::{JoinKind, LogicalOperator, Select};
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::rules::RuleId::{PushSelectDown, PushSelectIntoJoin};
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref PUSH_SELECT_DOWN_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Select(_)))
          .leaf(any)
        .finish()
    };
    static ref PUSH_SELECT_INTO_JOIN_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Select(_)))
          .leaf(|op| matches!(op, LogicalOperator::Join(_)))
        .finish()
    };
}

/// Condition of the deterministic select at `node`, with the input it sits on when that input
/// has no other consumer.
fn pushable_select(plan: &Plan, node: NodeId) -> OptResult<Option<(Expression, NodeId)>> {
    let condition = match plan.operator(node) {
        LogicalOperator::Select(select) if select.condition.is_deterministic() => {
            select.condition.clone()
        }
        _ => return Ok(None),
    };
    let child = plan.input(node, 0)?;
    if plan.parents(child).len() > 1 {
        return Ok(None);
    }
    Ok(Some((condition, child)))
}

fn contains_all(schema: &[LogicalVariable], vars: &[LogicalVariable]) -> bool {
    vars.iter().all(|var| schema.contains(var))
}

/// Pushes a select below its unary input: `select(op(x))` becomes `op(select(x))`.
fn swap_with_input(
    plan: &mut Plan,
    slot: OperatorSlot,
    select: NodeId,
    child: NodeId,
) -> OptResult<()> {
    let grand_child = plan.input(child, 0)?;
    plan.set_input(select, 0, grand_child);
    plan.set_input(child, 0, select);
    plan.set_slot(slot, child)
}

/// Evaluates selections as early as possible.
///
/// A select moves below a project, an assign whose variables it does not read, an order that
/// keeps all tuples or an exchange. Over a join, it moves into the input that produces every
/// variable it reads; for a left outer join only into the outer input.
#[derive(Clone, Default)]
pub struct PushSelectDownRule {}

impl PushSelectDownRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushSelectDownRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let node = plan.node_at(slot)?;
        let (condition, child) = match pushable_select(plan, node)? {
            Some(found) => found,
            None => return Ok(false),
        };
        let used = condition.used_variables();

        match plan.operator(child) {
            LogicalOperator::Order(order) if order.top_k.is_some() => return Ok(false),
            LogicalOperator::Project(_)
            | LogicalOperator::Order(_)
            | LogicalOperator::Exchange(_) => {}
            LogicalOperator::Assign(assign) => {
                if used.iter().any(|var| assign.variables.contains(var)) {
                    return Ok(false);
                }
            }
            LogicalOperator::Join(join) => {
                let sides = match join.kind {
                    JoinKind::Inner => 2,
                    JoinKind::LeftOuter => 1,
                };
                for side in 0..sides {
                    let input = plan.input(child, side)?;
                    if contains_all(plan.schema(input)?, &used) {
                        debug!("Pushing {} into join input {}", condition, side);
                        let pushed = plan.add_node(Select::new(condition), &[input]);
                        plan.set_input(child, side, pushed);
                        plan.set_slot(slot, child)?;
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            _ => return Ok(false),
        }

        debug!(
            "Pushing {} below {}",
            condition,
            plan.operator(child).name()
        );
        swap_with_input(plan, slot, node, child)?;
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_SELECT_DOWN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushSelectDown
    }
}

/// Folds a select reading both inputs of an inner join into the join condition.
#[derive(Clone, Default)]
pub struct PushSelectIntoJoinRule {}

impl PushSelectIntoJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushSelectIntoJoinRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let node = plan.node_at(slot)?;
        let (condition, join) = match pushable_select(plan, node)? {
            Some(found) => found,
            None => return Ok(false),
        };
        let join_condition = match plan.operator(join) {
            LogicalOperator::Join(op) if op.kind == JoinKind::Inner => op.condition.clone(),
            _ => return Ok(false),
        };

        let used = condition.used_variables();
        let left = plan.schema(plan.input(join, 0)?)?;
        let right = plan.schema(plan.input(join, 1)?)?;
        if contains_all(left, &used) || contains_all(right, &used) {
            // Left to select push down.
            return Ok(false);
        }

        let conjuncts: Vec<Expression> = join_condition
            .into_conjuncts()
            .into_iter()
            .chain(condition.into_conjuncts())
            .filter(|conjunct| !conjunct.is_true())
            .collect();
        let merged = Expression::and_of(conjuncts);
        debug!("Folding select into join condition {}", merged);
        if let LogicalOperator::Join(op) = plan.operator_mut(join) {
            op.condition = merged;
        }
        plan.set_slot(slot, join)?;
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_SELECT_INTO_JOIN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushSelectIntoJoin
    }
}
