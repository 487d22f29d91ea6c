use std::collections::HashSet;

use anyhow::bail;
use log::{debug, log_enabled, trace, Level};
use strum_macros::AsRefStr;

use crate::error::{OptError, OptResult};
use crate::optimizer::OptimizationContext;
use crate::plan::explain::explain_to_string;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::rules::{Rule, RuleImpl};

/// How often a batch sweeps the plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr)]
pub enum RuleController {
    /// A single sweep.
    Once { full_depth: bool },
    /// Sweeps until no rule reports a change, at most
    /// [`max_fixpoint_iterations`](crate::config::OptimizerConfig::max_fixpoint_iterations) times.
    Fixpoint { full_depth: bool },
}

impl RuleController {
    /// Whether sweeps descend into nested plans.
    pub fn full_depth(&self) -> bool {
        match self {
            RuleController::Once { full_depth } | RuleController::Fixpoint { full_depth } => {
                *full_depth
            }
        }
    }
}

/// Named list of rules applied together under one controller.
pub struct RuleBatch {
    name: String,
    controller: RuleController,
    rules: Vec<RuleImpl>,
}

impl RuleBatch {
    pub fn new<S: Into<String>>(name: S, controller: RuleController, rules: Vec<RuleImpl>) -> Self {
        Self {
            name: name.into(),
            controller,
            rules,
        }
    }

    pub fn once<S: Into<String>>(name: S, full_depth: bool, rules: Vec<RuleImpl>) -> Self {
        Self::new(name, RuleController::Once { full_depth }, rules)
    }

    pub fn fixpoint<S: Into<String>>(name: S, full_depth: bool, rules: Vec<RuleImpl>) -> Self {
        Self::new(name, RuleController::Fixpoint { full_depth }, rules)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> RuleController {
        self.controller
    }

    pub fn rules(&self) -> &[RuleImpl] {
        &self.rules
    }

    /// Applies the batch to `plan`, returns whether the plan changed.
    ///
    /// Nodes the batch made unreachable are removed from the plan and forgotten by `ctx`.
    pub fn run(&mut self, plan: &mut Plan, ctx: &mut OptimizationContext) -> OptResult<bool> {
        debug!(
            "Running rule batch {} ({})",
            self.name,
            self.controller.as_ref()
        );
        let full_depth = self.controller.full_depth();
        let (changed, sweeps) = match self.controller {
            RuleController::Once { .. } => (self.sweep_plan(plan, ctx, full_depth)?, 1),
            RuleController::Fixpoint { .. } => {
                let max_sweeps = ctx.config().max_fixpoint_iterations;
                let mut changed = false;
                let mut sweeps = 0;
                loop {
                    if sweeps == max_sweeps {
                        bail!(OptError::internal(format!(
                            "Rule batch {} did not reach a fixpoint after {} sweeps",
                            self.name, max_sweeps
                        )));
                    }
                    sweeps += 1;
                    if !self.sweep_plan(plan, ctx, full_depth)? {
                        break;
                    }
                    changed = true;
                }
                (changed, sweeps)
            }
        };

        for removed in plan.collect_garbage() {
            ctx.forget_node(removed);
        }
        debug!(
            "Finished rule batch {} after {} sweep(s), changed: {}",
            self.name, sweeps, changed
        );
        if log_enabled!(Level::Trace) {
            trace!("Plan after {}:\n{}", self.name, explain_to_string(plan)?);
        }
        Ok(changed)
    }

    fn sweep_plan(
        &mut self,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
        full_depth: bool,
    ) -> OptResult<bool> {
        let mut visited = HashSet::new();
        self.sweep(OperatorSlot::Root, plan, ctx, full_depth, &mut visited)
    }

    /// Pre hooks of every rule on `slot`, then the children, then the post hooks. A shared node
    /// is descended into only once per sweep.
    fn sweep(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
        full_depth: bool,
        visited: &mut HashSet<NodeId>,
    ) -> OptResult<bool> {
        let mut changed = self.apply(slot, plan, ctx, true)?;

        let node = plan.node_at(slot)?;
        if visited.insert(node) {
            for child in plan.child_slots(node) {
                if !full_depth && matches!(child, OperatorSlot::NestedRoot { .. }) {
                    continue;
                }
                changed |= self.sweep(child, plan, ctx, full_depth, visited)?;
            }
        }

        changed |= self.apply(slot, plan, ctx, false)?;
        Ok(changed)
    }

    fn apply(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
        pre: bool,
    ) -> OptResult<bool> {
        let mut changed = false;
        for rule in self.rules.iter_mut() {
            let node = plan.node_at(slot)?;
            if !rule.pattern().matches(plan, node) {
                continue;
            }
            let fired = if pre {
                rule.rewrite_pre(slot, plan, ctx)?
            } else {
                rule.rewrite_post(slot, plan, ctx)?
            };
            if fired {
                debug!(
                    "Rule {:?} rewrote {}",
                    rule,
                    plan.operator(node).name()
                );
                plan.refresh_schemas()?;
                ctx.invalidate_derived();
                changed = true;
            }
        }
        Ok(changed)
    }
}
