//! Rewrite rules.
//!
//! A rule is tried on every operator slot of a plan, see [`crate::heuristic`] for how a batch of
//! rules sweeps a plan. Each rule has two hooks: [`Rule::rewrite_pre`] runs before the sweep
//! descends into the operator's children and [`Rule::rewrite_post`] after. A hook is only called
//! when the rule's [`Pattern`] matches the operator held by the slot, and it reports whether it
//! changed the plan.
//!
//! Rules fall into three groups:
//!
//! 1. Logical rewrites. They produce a plan assumed to be better than the original, for example
//! [`PushSelectDownRule`] which evaluates a selection as early as possible.
//! 2. Physical operator assignment. [`SetPhysicalOperatorsRule`] picks an implementation for
//! every operator, joins are handled by [`choose_join_strategy`].
//! 3. Property enforcement. [`EnforceStructuralPropertiesRule`] inserts exchanges and sorts
//! where an input does not deliver what its parent requires, and removes redundant sorts.
//!
//! A rule may keep scratch state between the hooks of a single sweep, e.g. the inlineable
//! variables of [`InlineVariablesRule`], which are collected when the sweep starts at the root.
mod pattern;
pub use pattern::*;
mod types;
pub use types::*;
mod normalize;
pub use normalize::*;
mod pushdown;
pub use pushdown::*;
mod limit;
pub use limit::*;
mod execution_mode;
pub use execution_mode::*;
mod consolidate;
pub use consolidate::*;
mod join;
pub use join::*;
mod physical;
pub use physical::*;
mod enforce;
pub use enforce::*;
mod batches;
pub use batches::*;

use std::fmt::{Debug, Formatter};

use enum_dispatch::enum_dispatch;
use enumset::EnumSetType;
use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::optimizer::OptimizationContext;
use crate::plan::{OperatorSlot, Plan};

#[enum_dispatch(RuleImpl)]
pub trait Rule {
    /// Applied before the children of the operator in `slot` are visited.
    fn rewrite_pre(
        &mut self,
        _slot: OperatorSlot,
        _plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        Ok(false)
    }

    /// Applied after the children of the operator in `slot` are visited.
    fn rewrite_post(
        &mut self,
        _slot: OperatorSlot,
        _plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        Ok(false)
    }

    fn pattern(&self) -> &Pattern;

    /// Use to identify each rule.
    ///
    /// This is used to avoid applying same rule repeatedly to the same operator.
    fn rule_id(&self) -> RuleId;
}

#[enum_dispatch]
#[derive(Clone, AsRefStr)]
pub enum RuleImpl {
    // Logical rewrites
    InferTypesRule,
    BreakSelectIntoConjunctsRule,
    InlineVariablesRule,
    RemoveUnusedAssignsRule,
    PushSelectDownRule,
    PushSelectIntoJoinRule,
    MergeLimitsRule,
    PushLimitDownRule,
    SetExecutionModeRule,
    ConsolidateSelectsRule,
    ConsolidateAssignsRule,
    RemoveRedundantProjectRule,

    // Physical rewrites
    SetPhysicalOperatorsRule,
    EnforceStructuralPropertiesRule,
}

#[derive(EnumSetType, Debug)]
pub enum RuleId {
    // Logical rewrites
    InferTypes,
    BreakSelectIntoConjuncts,
    InlineVariables,
    RemoveUnusedAssigns,
    PushSelectDown,
    PushSelectIntoJoin,
    MergeLimits,
    PushLimitDown,
    SetExecutionMode,
    ConsolidateSelects,
    ConsolidateAssigns,
    RemoveRedundantProject,

    // Physical rewrites
    SetPhysicalOperators,
    EnforceStructuralProperties,
}

impl Debug for RuleImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::{MergeLimitsRule, Rule, RuleId, RuleImpl};

    #[test]
    fn test_rule_debug() {
        let rule = RuleImpl::from(MergeLimitsRule::new());
        assert_eq!("\"MergeLimitsRule\"", format!("{:?}", rule));
        assert_eq!(RuleId::MergeLimits, rule.rule_id());
    }
}
