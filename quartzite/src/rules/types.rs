use anyhow::bail;
use arrow_schema::DataType;

use crate::error::{OptError, OptResult};
use crate::expr::{Expression, FunctionKind, LogicalVariable, TypeEnvironment};
use crate::operator::LogicalOperator;
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, OperatorSlot, Plan};
use crate::rules::RuleId::InferTypes;
use crate::rules::{any, pattern, PatterBuilder, Pattern, Rule, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref INFER_TYPES_PATTERN: Pattern = pattern(any).finish();
}

/// Computes the type environment of every operator.
///
/// Never changes the plan. Environments are dropped with the other derived facts whenever a
/// later rewrite changes the plan, so the rule is scheduled again before job generation.
#[derive(Clone, Default)]
pub struct InferTypesRule {}

impl InferTypesRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for InferTypesRule {
    fn rewrite_post(
        &mut self,
        slot: OperatorSlot,
        plan: &mut Plan,
        ctx: &mut OptimizationContext,
    ) -> OptResult<bool> {
        let node = plan.node_at(slot)?;
        infer_types(plan, ctx, node)?;
        Ok(false)
    }

    fn pattern(&self) -> &Pattern {
        &INFER_TYPES_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        InferTypes
    }
}

/// Type environment of `node`, computing the missing environments below it.
pub fn infer_types(
    plan: &Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
) -> OptResult<TypeEnvironment> {
    if let Some(env) = ctx.type_environment(node) {
        return Ok(env.clone());
    }

    let mut env = TypeEnvironment::default();
    match plan.operator(node) {
        LogicalOperator::NestedTupleSource(nts) => {
            let owner_input = plan.input(nts.source(), 0)?;
            env.extend(&infer_types(plan, ctx, owner_input)?);
        }
        _ => {
            for input in plan.inputs(node) {
                env.extend(&infer_types(plan, ctx, input)?);
            }
        }
    }

    let mut nested_env = TypeEnvironment::default();
    for root in plan.nested_roots(node) {
        nested_env.extend(&infer_types(plan, ctx, root)?);
    }

    let produced = produced_types(plan, ctx, node, &env)?;
    env.extend(&nested_env);
    for (var, data_type) in produced {
        env.insert(var, data_type);
    }

    ctx.set_type_environment(node, env.clone());
    Ok(env)
}

fn produced_types(
    plan: &Plan,
    ctx: &OptimizationContext,
    node: NodeId,
    input_env: &TypeEnvironment,
) -> OptResult<Vec<(LogicalVariable, DataType)>> {
    let metadata = ctx.metadata();
    let typed = |vars: &[LogicalVariable], exprs: &[Expression], env: &TypeEnvironment| {
        vars.iter()
            .zip(exprs.iter())
            .map(|(var, expr)| Ok((*var, metadata.expression_type(expr, env)?)))
            .collect::<OptResult<Vec<_>>>()
    };

    let types = match plan.operator(node) {
        LogicalOperator::DataSourceScan(scan) => match metadata.find_data_source(scan.data_source())
        {
            Some(source) => source.column_types(scan.variables())?,
            None => bail!(OptError::malformed(
                "DataSourceScan",
                format!("unknown data source {}", scan.data_source())
            )),
        },
        LogicalOperator::Assign(assign) => {
            typed(&assign.variables, &assign.expressions, input_env)?
        }
        LogicalOperator::Aggregate(aggregate) => {
            typed(&aggregate.variables, &aggregate.expressions, input_env)?
        }
        LogicalOperator::RunningAggregate(aggregate) => {
            typed(&aggregate.variables, &aggregate.expressions, input_env)?
        }
        LogicalOperator::GroupBy(group_by) => group_by
            .group_by
            .iter()
            .chain(group_by.decor.iter())
            .map(|(var, expr)| Ok((*var, metadata.expression_type(expr, input_env)?)))
            .collect::<OptResult<Vec<_>>>()?,
        LogicalOperator::Unnest(unnest) => {
            let collection = metadata.expression_type(&unnest.expression, input_env)?;
            let is_unnest_call = unnest
                .expression
                .function()
                .map(|f| f.kind() == FunctionKind::Unnest)
                .unwrap_or(false);
            let item = match collection {
                item if is_unnest_call => item,
                DataType::List(field) => field.data_type().clone(),
                other => bail!(OptError::unsupported(
                    "Unnest",
                    format!("cannot unnest a value of type {}", other)
                )),
            };
            let mut types = vec![(unnest.variable, item)];
            types.extend(unnest.position.map(|pos| (pos, DataType::Int64)));
            types
        }
        LogicalOperator::UnionAll(union) => union
            .mappings
            .iter()
            .map(|mapping| match input_env.get(mapping.left) {
                Some(data_type) => Ok((mapping.output, data_type.clone())),
                None => bail!(OptError::internal(format!(
                    "Variable {} has no type in scope",
                    mapping.left
                ))),
            })
            .collect::<OptResult<Vec<_>>>()?,
        LogicalOperator::Script(script) => script
            .outputs
            .iter()
            .map(|var| (*var, DataType::Utf8))
            .collect(),
        _ => vec![],
    };
    Ok(types)
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use crate::error::OptError;
    use crate::expr::FunctionIdentifier::{Count, Listify, ScanCollection};
    use crate::expr::{Expression, LogicalVariable};
    use crate::optimizer::OptimizationContext;
    use crate::plan::PlanBuilder;
    use crate::rules::infer_types;
    use crate::test_utils::{data_source, data_source_from_schema, metadata_with};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_infer_group_by_types() {
        let metadata = metadata_with(vec![data_source_from_schema(
            "orders",
            r#"{
                "fields": [
                    {"name": "id", "nullable": false, "data_type": "Int32", "dict_id": 0, "dict_is_ordered": false, "metadata": {}},
                    {"name": "note", "nullable": true, "data_type": "Utf8", "dict_id": 0, "dict_is_ordered": false, "metadata": {}}
                ],
                "metadata": {}
            }"#,
        )]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let plan = PlanBuilder::new()
            .scan("orders", vec![v(1), v(2)])
            .group_by(vec![(v(3), Expression::variable(v(1)))], vec![], |nested| {
                nested.aggregate(
                    vec![v(4), v(5)],
                    vec![
                        Expression::call(Count, vec![v(2).into()]),
                        Expression::call(Listify, vec![v(2).into()]),
                    ],
                )
            })
            .unnest(v(6), Expression::call(ScanCollection, vec![v(5).into()]))
            .build()
            .unwrap();

        let env = infer_types(&plan, &mut ctx, plan.root()).unwrap();
        assert_eq!(Some(&DataType::Int32), env.get(v(3)));
        assert_eq!(Some(&DataType::Int64), env.get(v(4)));
        assert_eq!(Some(&DataType::Utf8), env.get(v(6)));
    }

    #[test]
    fn test_unnest_of_scalar_is_unsupported() {
        let metadata = metadata_with(vec![data_source("A", &["a"])]);
        let mut ctx = OptimizationContext::new(metadata.into_arc());
        let plan = PlanBuilder::new()
            .scan("A", vec![v(1)])
            .unnest(v(2), v(1).into())
            .build()
            .unwrap();

        let err = infer_types(&plan, &mut ctx, plan.root()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::Unsupported { .. })
        ));
    }
}
