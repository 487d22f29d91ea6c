use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::OptResult;
use crate::expr::LogicalVariable;
use crate::operator::{LogicalOperator, OperatorTrait, Select};
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::properties::equivalence_classes_and_fds;
use crate::rules::RuleId::{BreakSelectIntoConjuncts, InlineVariables, RemoveUnusedAssigns};
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref BREAK_SELECT_INTO_CONJUNCTS_PATTERN: Pattern = {
        pattern(|op| matches!(op, LogicalOperator::Select(_)))
        .finish()
    };
    static ref INLINE_VARIABLES_PATTERN: Pattern = pattern(any).finish();
    static ref REMOVE_UNUSED_ASSIGNS_PATTERN: Pattern = pattern(any).finish();
}

/// Splits `select(a and b and c)` into `select(a)` over `select(b)` over `select(c)`, so that
/// each conjunct can be pushed down on its own.
#[derive(Clone, Default)]
pub struct BreakSelectIntoConjunctsRule {}

impl BreakSelectIntoConjunctsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for BreakSelectIntoConjunctsRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let node = plan.node_at(slot)?;
        let condition = match plan.operator(node) {
            LogicalOperator::Select(select) if select.condition.conjuncts().len() > 1 => {
                select.condition.clone()
            }
            _ => return Ok(false),
        };

        let mut conjuncts = condition.into_conjuncts();
        let top = conjuncts.remove(0);
        let mode = plan.node(node).execution_mode;
        let mut input = plan.input(node, 0)?;
        for conjunct in conjuncts.into_iter().rev() {
            input = plan.add_node(Select::new(conjunct), &[input]);
            plan.node_mut(input).execution_mode = mode;
        }
        *plan.operator_mut(node) = Select::new(top).into();
        plan.set_input(node, 0, input);
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &BREAK_SELECT_INTO_CONJUNCTS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        BreakSelectIntoConjuncts
    }
}

/// Replaces the uses of a variable assigned from another variable, `v := u`, by an equivalent
/// variable the using operator can see.
///
/// Equivalence is read from the classes derived at the inputs of the using operator, so an
/// equality established below the assign by a select or a join condition also counts. The
/// replacement is the smallest visible member of the class that is not itself assigned from a
/// variable. The assignment is left to [`RemoveUnusedAssignsRule`]. Variables marked as not to
/// be inlined in the context are kept.
#[derive(Clone, Default)]
pub struct InlineVariablesRule {
    inlineable: HashSet<LogicalVariable>,
}

impl InlineVariablesRule {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_inlineable(&mut self, plan: &Plan, ctx: &OptimizationContext) {
        self.inlineable.clear();
        for id in plan.reachable_nodes() {
            if let LogicalOperator::Assign(assign) = plan.operator(id) {
                for (var, expr) in assign.assignments() {
                    match expr.as_variable() {
                        Some(source) if source != var && !ctx.is_not_to_be_inlined(var) => {
                            self.inlineable.insert(var);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Renames of the inlineable variables in `used`, resolved through the equivalence classes
    /// of the input each of them comes from.
    fn renames_at(
        &self,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
        node: NodeId,
        used: &[LogicalVariable],
    ) -> OptResult<HashMap<LogicalVariable, LogicalVariable>> {
        let mut renames = HashMap::new();
        for input in plan.inputs(node) {
            let visible: HashSet<LogicalVariable> = plan.schema(input)?.iter().copied().collect();
            let pending: Vec<LogicalVariable> = used
                .iter()
                .filter(|var| self.inlineable.contains(*var) && visible.contains(*var))
                .filter(|var| !renames.contains_key(*var))
                .copied()
                .collect();
            if pending.is_empty() {
                continue;
            }
            let (classes, _) = equivalence_classes_and_fds(plan, ctx, input)?;
            for var in pending {
                let target = classes.members_of(var).into_iter().find(|member| {
                    *member != var && visible.contains(member) && !self.inlineable.contains(member)
                });
                if let Some(target) = target {
                    renames.insert(var, target);
                }
            }
        }
        Ok(renames)
    }
}

impl Rule for InlineVariablesRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        if slot == OperatorSlot::Root {
            self.collect_inlineable(plan, ctx);
        }
        if self.inlineable.is_empty() {
            return Ok(false);
        }

        let node = plan.node_at(slot)?;
        let used = plan.used_variables(node);
        if !used.iter().any(|var| self.inlineable.contains(var)) {
            return Ok(false);
        }
        let renames = self.renames_at(plan, ctx, node, &used)?;
        if renames.is_empty() {
            return Ok(false);
        }
        let mut operator = plan.operator(node).clone();
        if operator.rename_used_variables(&renames) {
            debug!("Inlined variables of {}", operator.name());
            *plan.operator_mut(node) = operator;
            return Ok(true);
        }
        Ok(false)
    }

    fn pattern(&self) -> &Pattern {
        &INLINE_VARIABLES_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        InlineVariables
    }
}

/// Drops assignments whose variable is never used, and assigns left without any.
#[derive(Clone, Default)]
pub struct RemoveUnusedAssignsRule {
    used: HashSet<LogicalVariable>,
}

impl RemoveUnusedAssignsRule {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_used(&mut self, plan: &Plan) -> OptResult<()> {
        self.used.clear();
        for id in plan.reachable_nodes() {
            self.used.extend(plan.used_variables(id));
        }
        let root = plan.root();
        let is_sink = matches!(
            plan.operator(root),
            LogicalOperator::Write(_) | LogicalOperator::InsertDelete(_) | LogicalOperator::Sink(_)
        );
        if !is_sink {
            self.used.extend(plan.schema(root)?.iter().copied());
        }
        Ok(())
    }
}

impl Rule for RemoveUnusedAssignsRule {
    fn rewrite_pre(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        _ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        if slot == OperatorSlot::Root {
            self.collect_used(plan)?;
        }

        let node = plan.node_at(slot)?;
        let assign = match plan.operator(node) {
            LogicalOperator::Assign(assign) => assign,
            _ => return Ok(false),
        };
        if assign.variables.iter().all(|var| self.used.contains(var)) {
            return Ok(false);
        }

        let (variables, expressions): (Vec<_>, Vec<_>) = assign
            .assignments()
            .filter(|(var, _)| self.used.contains(var))
            .map(|(var, expr)| (var, expr.clone()))
            .unzip();
        debug!(
            "Removing unused assignments of {:?}",
            assign
                .variables
                .iter()
                .filter(|var| !self.used.contains(*var))
                .collect::<Vec<_>>()
        );
        if variables.is_empty() {
            let input = plan.input(node, 0)?;
            plan.set_slot(slot, input)?;
        } else if let LogicalOperator::Assign(assign) = plan.operator_mut(node) {
            assign.variables = variables;
            assign.expressions = expressions;
        }
        Ok(true)
    }

    fn pattern(&self) -> &Pattern {
        &REMOVE_UNUSED_ASSIGNS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RemoveUnusedAssigns
    }
}
