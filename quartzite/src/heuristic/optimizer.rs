use log::debug;

use crate::error::OptResult;
use crate::heuristic::RuleBatch;
use crate::optimizer::OptimizationContext;
use crate::plan::Plan;

/// Optimizes `plan` in place.
///
/// The logical batches run first, in order, then schemas are recomputed and the physical
/// batches run. Each batch completes before the next one starts. The plan is validated at the
/// end; when physical batches were given, every operator must have a physical implementation.
///
/// On error the plan may be partially rewritten and should be discarded.
pub fn optimize(
    plan: &mut Plan,
    logical: &mut [RuleBatch],
    physical: &mut [RuleBatch],
    ctx: &mut OptimizationContext,
) -> OptResult<()> {
    ctx.reserve_variables(plan.max_variable());
    ctx.reset_applied_rules();
    plan.refresh_schemas()?;

    for batch in logical.iter_mut() {
        batch.run(plan, ctx)?;
    }
    plan.refresh_schemas()?;
    for batch in physical.iter_mut() {
        batch.run(plan, ctx)?;
    }

    debug!("Optimized plan has {} operators", plan.node_count());
    plan.validate(!physical.is_empty())
}

#[cfg(test)]
mod tests {
    use crate::expr::FunctionIdentifier::Gt;
    use crate::expr::{Expression, LogicalVariable};
    use crate::heuristic::optimize;
    use crate::operator::physical::PhysicalOperator;
    use crate::operator::LogicalOperator;
    use crate::optimizer::OptimizationContext;
    use crate::plan::PlanBuilder;
    use crate::rules::{default_logical_rewrites, default_physical_rewrites};
    use crate::test_utils::{data_source, metadata_with};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_select_is_pushed_below_project_and_implemented() {
        let metadata = metadata_with(vec![data_source("A", &["a", "b"])]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .project(vec![v(1)])
            .select(Expression::call(Gt, vec![v(1).into(), Expression::constant(2i64)]))
            .build()
            .unwrap();

        optimize(
            &mut plan,
            &mut default_logical_rewrites(),
            &mut default_physical_rewrites(),
            &mut ctx,
        )
        .unwrap();

        let project = plan.root();
        assert!(matches!(plan.operator(project), LogicalOperator::Project(_)));
        let select = plan.input(project, 0).unwrap();
        assert!(matches!(plan.operator(select), LogicalOperator::Select(_)));
        assert!(matches!(
            plan.node(select).physical,
            Some(PhysicalOperator::StreamSelect(_))
        ));
        assert!(ctx.type_environment(project).is_some());
    }
}
