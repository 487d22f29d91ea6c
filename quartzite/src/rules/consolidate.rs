use log::debug;

use crate::error::OptResult;
use crate::expr::Expression;
use crate::operator::{Assign, LogicalOperator, Select};
use crate::optimizer::OptimizationContext;
use crate::plan::{OperatorSlot, Plan};
use crate::rules::RuleId::{ConsolidateAssigns, ConsolidateSelects, RemoveRedundantProject};
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref CONSOLIDATE_SELECTS_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Select(_)))
          .leaf(|op| matches!(op, LogicalOperator::Select(_)))
        .finish()
    };
    static ref CONSOLIDATE_ASSIGNS_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Assign(_)))
          .leaf(|op| matches!(op, LogicalOperator::Assign(_)))
        .finish()
    };
    static ref REMOVE_REDUNDANT_PROJECT_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Project(_)))
          .leaf(any)
        .finish()
    };
}

/// Merges `select(a)` over `select(b)` into `select(a and b)`.
#[derive(Clone, Default)]
pub struct ConsolidateSelectsRule {}

impl ConsolidateSelectsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for ConsolidateSelectsRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let outer = plan.node_at(slot)?;
        let inner = plan.input(outer, 0)?;
        let condition = match (plan.operator(outer), plan.operator(inner)) {
            (LogicalOperator::Select(outer), LogicalOperator::Select(inner)) => {
                let mut conjuncts = outer.condition.clone().into_conjuncts();
                conjuncts.extend(inner.condition.clone().into_conjuncts());
                Expression::and_of(conjuncts)
            }
            _ => return Ok(false),
        };

        debug!("Consolidated selects into {}", condition);
        let input = plan.input(inner, 0)?;
        *plan.operator_mut(outer) = Select::new(condition).into();
        plan.set_input(outer, 0, input);
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &CONSOLIDATE_SELECTS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        ConsolidateSelects
    }
}

/// Merges two adjacent assigns when the outer one does not read what the inner one assigns.
#[derive(Clone, Default)]
pub struct ConsolidateAssignsRule {}

impl ConsolidateAssignsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for ConsolidateAssignsRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let outer = plan.node_at(slot)?;
        let inner = plan.input(outer, 0)?;
        let merged = match (plan.operator(outer), plan.operator(inner)) {
            (LogicalOperator::Assign(outer), LogicalOperator::Assign(inner)) => {
                let independent = outer
                    .expressions
                    .iter()
                    .flat_map(|expr| expr.used_variables())
                    .all(|var| !inner.variables.contains(&var));
                if !independent {
                    return Ok(false);
                }
                let mut variables = inner.variables.clone();
                variables.extend(outer.variables.iter().copied());
                let mut expressions = inner.expressions.clone();
                expressions.extend(outer.expressions.iter().cloned());
                Assign::new(variables, expressions)
            }
            _ => return Ok(false),
        };

        let input = plan.input(inner, 0)?;
        *plan.operator_mut(outer) = merged.into();
        plan.set_input(outer, 0, input);
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &CONSOLIDATE_ASSIGNS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        ConsolidateAssigns
    }
}

/// Removes a project that keeps its input as is, and the inner one of two adjacent projects.
#[derive(Clone, Default)]
pub struct RemoveRedundantProjectRule {}

impl RemoveRedundantProjectRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for RemoveRedundantProjectRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let project = plan.node_at(slot)?;
        let input = plan.input(project, 0)?;
        let variables = match plan.operator(project) {
            LogicalOperator::Project(op) => &op.variables,
            _ => return Ok(false),
        };

        if plan.schema(input)? == variables.as_slice() {
            debug!("Removing project of {} keeping every variable", plan.operator(input).name());
            plan.set_slot(slot, input)?;
            return Ok(true);
        }
        if let LogicalOperator::Project(_) = plan.operator(input) {
            let grand_child = plan.input(input, 0)?;
            plan.set_input(project, 0, grand_child);
            return Ok(true);
        }
        Ok(false)
    }

    fn pattern(&self) -> &Pattern {
        &REMOVE_REDUNDANT_PROJECT_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RemoveRedundantProject
    }
}
