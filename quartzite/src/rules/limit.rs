use std::cmp::min;

use log::debug;

use crate::error::OptResult;
use crate::operator::{Limit, LogicalOperator};
use crate::optimizer::OptimizationContext;
use crate::plan::{OperatorSlot, Plan};
use crate::rules::RuleId::{MergeLimits, PushLimitDown};
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref MERGE_LIMITS_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Limit(_)))
          .pattern(|op| matches!(op, LogicalOperator::Limit(_)))
            .leaf(any)
          .finish()
        .finish()
    };
    static ref PUSH_LIMIT_DOWN_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Limit(_)))
          .leaf(|op| matches!(op, LogicalOperator::Project(_) | LogicalOperator::Assign(_)))
        .finish()
    };
}

/// Merges two adjacent limits into one.
///
/// The outer limit skips `o1` tuples of what the inner one returns, so the merged offset is
/// `o2 + o1` and at most `l2 - o1` tuples remain for the outer limit to take.
#[derive(Clone, Default)]
pub struct MergeLimitsRule {}

impl MergeLimitsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for MergeLimitsRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let outer_node = plan.node_at(slot)?;
        let inner_node = plan.input(outer_node, 0)?;
        let (outer, inner) = match (plan.operator(outer_node), plan.operator(inner_node)) {
            (LogicalOperator::Limit(outer), LogicalOperator::Limit(inner)) => {
                (outer.clone(), inner.clone())
            }
            _ => return Ok(false),
        };

        let outer_offset = outer.offset.unwrap_or(0);
        let inner_offset = inner.offset.unwrap_or(0);
        let limit = min(outer.limit, inner.limit.saturating_sub(outer_offset));
        let merged = match inner_offset.saturating_add(outer_offset) {
            0 => Limit::new(limit),
            offset => Limit::with_offset(limit, offset),
        };
        debug!("Merged limits into {:?}", merged);

        let input = plan.input(inner_node, 0)?;
        let mode = plan.node(outer_node).execution_mode;
        let new_node = plan.add_node(merged, &[input]);
        plan.node_mut(new_node).execution_mode = mode;
        plan.set_slot(slot, new_node)?;
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &MERGE_LIMITS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        MergeLimits
    }
}

/// Moves a limit below a project or an assign, which do not change the number of tuples.
#[derive(Clone, Default)]
pub struct PushLimitDownRule {}

impl PushLimitDownRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushLimitDownRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let limit = plan.node_at(slot)?;
        let child = plan.input(limit, 0)?;
        if plan.parents(child).len() > 1 {
            return Ok(false);
        }

        debug!("Pushing limit below {}", plan.operator(child).name());
        let grand_child = plan.input(child, 0)?;
        plan.set_input(limit, 0, grand_child);
        plan.set_input(child, 0, limit);
        plan.set_slot(slot, child)?;
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_LIMIT_DOWN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushLimitDown
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::LogicalVariable;
    use crate::operator::{Limit, LogicalOperator};
    use crate::optimizer::OptimizationContext;
    use crate::plan::{OperatorSlot, PlanBuilder};
    use crate::rules::{MergeLimitsRule, PushLimitDownRule, Rule};
    use crate::test_utils::empty_metadata;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_merge_limits() {
        let mut ctx = OptimizationContext::new(empty_metadata());
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1)])
            .limit(10)
            .limit(5)
            .build()
            .unwrap();

        let mut rule = MergeLimitsRule::new();
        assert!(rule.pattern().matches(&plan, plan.root()));
        assert!(rule
            .rewrite_pre(OperatorSlot::Root, &mut plan, &mut ctx)
            .unwrap());
        assert_eq!(
            &LogicalOperator::Limit(Limit::new(5)),
            plan.operator(plan.root())
        );
        assert!(matches!(
            plan.operator(plan.input(plan.root(), 0).unwrap()),
            LogicalOperator::DataSourceScan(_)
        ));
    }

    #[test]
    fn test_merge_limits_with_offsets() {
        let mut ctx = OptimizationContext::new(empty_metadata());
        let mut builder = PlanBuilder::new();
        builder.scan("A", vec![v(1)]).limit(10);
        let mut plan = builder.build().unwrap();
        let inner = plan.root();
        if let LogicalOperator::Limit(limit) = plan.operator_mut(inner) {
            limit.offset = Some(2);
        }
        let outer = plan.add_node(Limit::with_offset(20, 4), &[inner]);
        plan.set_root(outer);
        plan.refresh_schemas().unwrap();

        let mut rule = MergeLimitsRule::new();
        assert!(rule
            .rewrite_pre(OperatorSlot::Root, &mut plan, &mut ctx)
            .unwrap());
        assert_eq!(
            &LogicalOperator::Limit(Limit::with_offset(6, 6)),
            plan.operator(plan.root())
        );
    }

    #[test]
    fn test_merge_limits_with_huge_offsets() {
        let mut ctx = OptimizationContext::new(empty_metadata());
        let mut builder = PlanBuilder::new();
        builder.scan("A", vec![v(1)]).limit(10);
        let mut plan = builder.build().unwrap();
        let inner = plan.root();
        if let LogicalOperator::Limit(limit) = plan.operator_mut(inner) {
            limit.offset = Some(usize::MAX - 1);
        }
        let outer = plan.add_node(Limit::with_offset(20, 4), &[inner]);
        plan.set_root(outer);
        plan.refresh_schemas().unwrap();

        let mut rule = MergeLimitsRule::new();
        assert!(rule
            .rewrite_pre(OperatorSlot::Root, &mut plan, &mut ctx)
            .unwrap());
        assert_eq!(
            &LogicalOperator::Limit(Limit::with_offset(6, usize::MAX)),
            plan.operator(plan.root())
        );
    }

    #[test]
    fn test_push_limit_below_project() {
        let mut ctx = OptimizationContext::new(empty_metadata());
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .project(vec![v(1)])
            .limit(3)
            .build()
            .unwrap();
        let limit = plan.root();
        let project = plan.input(limit, 0).unwrap();

        let mut rule = PushLimitDownRule::new();
        assert!(rule.pattern().matches(&plan, limit));
        assert!(rule
            .rewrite_pre(OperatorSlot::Root, &mut plan, &mut ctx)
            .unwrap());
        assert_eq!(project, plan.root());
        assert_eq!(limit, plan.input(project, 0).unwrap());
        assert!(!rule.pattern().matches(&plan, plan.root()));
    }
}
