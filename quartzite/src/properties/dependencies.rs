//! Derivation of equivalence classes and functional dependencies per operator.
//!
//! Results are memoized in the [`OptimizationContext`] until the next rewrite invalidates them.
//! Deriving a group-by also simplifies it: a key determined by the other keys is moved to the
//! decorations.
use std::collections::{BTreeSet, HashMap};

use anyhow::bail;
use log::debug;

use crate::error::{OptError, OptResult};
use crate::expr::{Expression, LogicalVariable};
use crate::operator::{GroupBy, JoinKind, LogicalOperator};
use crate::optimizer::OptimizationContext;
use crate::plan::{NodeId, Plan};
use crate::properties::{closure, determines, EquivalenceClasses, FunctionalDependency};

/// Derives equivalence classes and dependencies of `node` and everything below it.
pub fn compute_fds_and_equivalence_classes(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
) -> OptResult<()> {
    if ctx.has_fds(node) {
        return Ok(());
    }
    for input in plan.inputs(node) {
        compute_fds_and_equivalence_classes(plan, ctx, input)?;
    }
    if let LogicalOperator::NestedTupleSource(nts) = plan.operator(node) {
        let outer = plan.input(nts.source(), 0)?;
        compute_fds_and_equivalence_classes(plan, ctx, outer)?;
    }
    if let LogicalOperator::GroupBy(group_by) = plan.operator(node) {
        let simplified = simplify_group_by(group_by, plan, ctx, node)?;
        if let Some(simplified) = simplified {
            debug!("Simplified group-by keys to {:?}", simplified.group_by_variables());
            *plan.operator_mut(node) = simplified.into();
            plan.refresh_schemas()?;
        }
    }
    for root in plan.nested_roots(node) {
        compute_fds_and_equivalence_classes(plan, ctx, root)?;
    }

    let (classes, fds) = derive(plan, ctx, node)?;
    ctx.set_equivalence_classes_and_fds(node, classes, fds);
    Ok(())
}

/// Derived classes and dependencies of `node`, computing them if needed.
pub fn equivalence_classes_and_fds(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
) -> OptResult<(EquivalenceClasses, Vec<FunctionalDependency>)> {
    compute_fds_and_equivalence_classes(plan, ctx, node)?;
    derived(ctx, node)
}

/// Whether `vars` determine every variable in the schema of `node`.
pub fn is_key(
    plan: &mut Plan,
    ctx: &mut OptimizationContext,
    node: NodeId,
    vars: &[LogicalVariable],
) -> OptResult<bool> {
    let (classes, fds) = equivalence_classes_and_fds(plan, ctx, node)?;
    Ok(determines(vars, plan.schema(node)?, &fds, &classes))
}

fn derived(
    ctx: &OptimizationContext,
    node: NodeId,
) -> OptResult<(EquivalenceClasses, Vec<FunctionalDependency>)> {
    match (ctx.equivalence_classes(node), ctx.fds(node)) {
        (Some(classes), Some(fds)) => Ok((classes.clone(), fds.to_vec())),
        _ => bail!(OptError::internal(
            "Functional dependencies of an input are not derived"
        )),
    }
}

fn input_derived(
    plan: &Plan,
    ctx: &OptimizationContext,
    node: NodeId,
    index: usize,
) -> OptResult<(EquivalenceClasses, Vec<FunctionalDependency>)> {
    derived(ctx, plan.input(node, index)?)
}

fn derive(
    plan: &Plan,
    ctx: &OptimizationContext,
    node: NodeId,
) -> OptResult<(EquivalenceClasses, Vec<FunctionalDependency>)> {
    let result = match plan.operator(node) {
        LogicalOperator::EmptyTupleSource(_)
        | LogicalOperator::Write(_)
        | LogicalOperator::InsertDelete(_)
        | LogicalOperator::Sink(_)
        | LogicalOperator::UnionAll(_)
        | LogicalOperator::Script(_) => (EquivalenceClasses::default(), vec![]),
        LogicalOperator::NestedTupleSource(nts) => input_derived(plan, ctx, nts.source(), 0)?,
        LogicalOperator::DataSourceScan(scan) => (
            EquivalenceClasses::default(),
            ctx.metadata()
                .data_source_fds(scan.data_source(), scan.variables())?,
        ),
        LogicalOperator::Exchange(_)
        | LogicalOperator::Order(_)
        | LogicalOperator::Limit(_)
        | LogicalOperator::Replicate(_)
        | LogicalOperator::RunningAggregate(_)
        | LogicalOperator::Unnest(_) => input_derived(plan, ctx, node, 0)?,
        LogicalOperator::Select(select) => {
            let (mut classes, mut fds) = input_derived(plan, ctx, node, 0)?;
            select
                .condition
                .constraints_and_equiv_classes(&mut classes, &mut fds);
            (classes, fds)
        }
        LogicalOperator::Join(join) => {
            let (mut classes, mut fds) = input_derived(plan, ctx, node, 0)?;
            let (right_classes, right_fds) = input_derived(plan, ctx, node, 1)?;
            fds.extend(right_fds);
            match join.kind {
                JoinKind::Inner => {
                    classes.union(&right_classes);
                    join.condition
                        .constraints_and_equiv_classes(&mut classes, &mut fds);
                }
                JoinKind::LeftOuter => {
                    let left = plan.schema(plan.input(node, 0)?)?;
                    let right = plan.schema(plan.input(node, 1)?)?;
                    fds.extend(outer_join_fds(&join.condition, left, right));
                }
            }
            (classes, fds)
        }
        LogicalOperator::Assign(assign) => {
            let (mut classes, mut fds) = input_derived(plan, ctx, node, 0)?;
            for (var, expr) in assign.assignments() {
                fold_assignment(var, expr, &mut classes, &mut fds);
            }
            (classes, fds)
        }
        LogicalOperator::Project(project) => {
            let (classes, fds) = input_derived(plan, ctx, node, 0)?;
            restrict(&classes, &fds, &project.variables)
        }
        LogicalOperator::Distinct(distinct) => {
            let (classes, fds) = input_derived(plan, ctx, node, 0)?;
            restrict(&classes, &fds, &distinct.variables)
        }
        LogicalOperator::GroupBy(group_by) => {
            let (classes, fds) = input_derived(plan, ctx, node, 0)?;
            let mut renames: HashMap<LogicalVariable, Vec<LogicalVariable>> = HashMap::new();
            for (output, input) in group_by.variable_mapping() {
                renames.entry(input).or_default().push(output);
            }
            let classes = classes.rename(&renames);
            let mut fds: Vec<FunctionalDependency> =
                fds.iter().filter_map(|fd| fd.rename(&renames)).collect();
            let keys = group_by.group_by_variables();
            let dependents: Vec<LogicalVariable> = plan
                .schema(node)?
                .iter()
                .filter(|var| !keys.contains(var))
                .copied()
                .collect();
            if !dependents.is_empty() {
                fds.push(FunctionalDependency::new(keys, dependents));
            }
            (classes, fds)
        }
        LogicalOperator::Aggregate(aggregate) => (
            EquivalenceClasses::default(),
            vec![FunctionalDependency::new(
                vec![],
                aggregate.variables.iter().copied(),
            )],
        ),
        LogicalOperator::Subplan(_) => {
            let (classes, mut fds) = input_derived(plan, ctx, node, 0)?;
            let live = plan.schema(plan.input(node, 0)?)?;
            let nested: Vec<LogicalVariable> = plan
                .schema(node)?
                .iter()
                .filter(|var| !live.contains(var))
                .copied()
                .collect();
            if !nested.is_empty() {
                fds.push(FunctionalDependency::new(live.iter().copied(), nested));
            }
            (classes, fds)
        }
    };
    Ok(result)
}

/// Folds `var := expr` into the classes and dependencies of the input.
fn fold_assignment(
    var: LogicalVariable,
    expr: &Expression,
    classes: &mut EquivalenceClasses,
    fds: &mut Vec<FunctionalDependency>,
) {
    match expr {
        Expression::Variable(input) => classes.merge(*input, var),
        Expression::Constant(value) => {
            classes.add_constant(var, value.clone());
            fds.push(FunctionalDependency::new(vec![], vec![var]));
            return;
        }
        Expression::FunctionCall(_) => {}
    }

    let used = expr.used_variables();
    if used.is_empty() || !expr.is_deterministic() {
        return;
    }
    for fd in fds.iter_mut() {
        if used.iter().all(|u| fd.tail().contains(u)) {
            fd.extend_tail([var]);
        }
    }
    fds.push(FunctionalDependency::new(used, vec![var]));
}

/// Dependencies from the outer side to the inner side of a left outer join. An inner variable
/// equal to an outer one is determined by it, and null when there is no match.
fn outer_join_fds(
    condition: &Expression,
    left: &[LogicalVariable],
    right: &[LogicalVariable],
) -> Vec<FunctionalDependency> {
    let mut scratch = EquivalenceClasses::default();
    condition.constraints_and_equiv_classes(&mut scratch, &mut vec![]);
    scratch
        .iter()
        .filter_map(|class| {
            let outer: Vec<LogicalVariable> = class
                .members()
                .iter()
                .filter(|v| left.contains(v))
                .copied()
                .collect();
            let inner: Vec<LogicalVariable> = class
                .members()
                .iter()
                .filter(|v| right.contains(v))
                .copied()
                .collect();
            if outer.is_empty() || inner.is_empty() {
                None
            } else {
                Some(FunctionalDependency::new(outer, inner))
            }
        })
        .collect()
}

/// Keeps what can still be stated over `vars`.
fn restrict(
    classes: &EquivalenceClasses,
    fds: &[FunctionalDependency],
    vars: &[LogicalVariable],
) -> (EquivalenceClasses, Vec<FunctionalDependency>) {
    let classes = classes.restrict(|var| vars.contains(&var));
    let fds = fds
        .iter()
        .filter(|fd| fd.head().iter().all(|var| vars.contains(var)))
        .filter_map(|fd| {
            let tail: BTreeSet<LogicalVariable> = fd
                .tail()
                .iter()
                .filter(|var| vars.contains(var))
                .copied()
                .collect();
            if tail.is_empty() {
                None
            } else {
                Some(FunctionalDependency::new(fd.head().iter().copied(), tail))
            }
        })
        .collect();
    (classes, fds)
}

/// Moves keys determined by the remaining keys to the decorations, keeping at least one key.
/// Returns the simplified operator if anything moved.
fn simplify_group_by(
    group_by: &GroupBy,
    plan: &Plan,
    ctx: &OptimizationContext,
    node: NodeId,
) -> OptResult<Option<GroupBy>> {
    let (classes, fds) = input_derived(plan, ctx, node, 0)?;
    let mut keys = group_by.group_by.clone();
    let mut decor = group_by.decor.clone();
    let mut idx = 0;
    while idx < keys.len() && keys.len() > 1 {
        let candidate = match keys[idx].1.as_variable() {
            Some(var) => var,
            None => {
                idx += 1;
                continue;
            }
        };
        let others: Vec<LogicalVariable> = keys
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != idx)
            .filter_map(|(_, (_, expr))| expr.as_variable())
            .collect();
        if closure(&others, &fds, &classes).contains(&candidate) {
            decor.push(keys.remove(idx));
        } else {
            idx += 1;
        }
    }
    if keys.len() == group_by.group_by.len() {
        return Ok(None);
    }
    let mut simplified = group_by.clone();
    simplified.group_by = keys;
    simplified.decor = decor;
    Ok(Some(simplified))
}

#[cfg(test)]
mod tests {
    use datafusion_common::ScalarValue;

    use crate::expr::{Expression, FunctionIdentifier, LogicalVariable};
    use crate::metadata::DataSourcePartitioning;
    use crate::operator::{Join, JoinKind, LogicalOperator};
    use crate::optimizer::OptimizationContext;
    use crate::plan::PlanBuilder;
    use crate::properties::{
        compute_fds_and_equivalence_classes, equivalence_classes_and_fds, is_key,
        FunctionalDependency,
    };
    use crate::test_utils::{data_source, metadata_with};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    fn context() -> OptimizationContext {
        let metadata = metadata_with(vec![
            data_source("A", &["k", "v"])
                .with_primary_key(["k"])
                .with_partitioning(DataSourcePartitioning::HashOnPrimaryKey),
            data_source("B", &["x", "y"]),
        ]);
        OptimizationContext::new(metadata.into_arc())
    }

    #[test]
    fn test_select_folds_equalities() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("B", vec![v(1), v(2)])
            .select(Expression::and_of(vec![
                Expression::eq(v(1), v(2)),
                Expression::eq(v(2), Expression::constant(5i64)),
            ]))
            .build()
            .unwrap();
        let root = plan.root();
        let (classes, fds) = equivalence_classes_and_fds(&mut plan, &mut ctx, root).unwrap();
        assert!(classes.are_equivalent(v(1), v(2)));
        assert!(classes.is_constant(v(1)));
        assert_eq!(
            Some(&ScalarValue::Int64(Some(5))),
            classes.class_of(v(1)).and_then(|c| c.constant())
        );
        assert!(fds.contains(&FunctionalDependency::new(vec![], vec![v(2)])));
    }

    #[test]
    fn test_pass_through_keeps_dependencies() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .exchange()
            .limit(5)
            .build()
            .unwrap();
        let root = plan.root();
        let (_, fds) = equivalence_classes_and_fds(&mut plan, &mut ctx, root).unwrap();
        assert_eq!(vec![FunctionalDependency::new([v(1)], [v(2)])], fds);
        assert!(is_key(&mut plan, &mut ctx, root, &[v(1)]).unwrap());
        assert!(!is_key(&mut plan, &mut ctx, root, &[v(2)]).unwrap());
    }

    #[test]
    fn test_assign_extends_dependencies() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .assign(
                vec![v(3), v(4)],
                vec![
                    Expression::call(FunctionIdentifier::Plus, vec![v(2).into(), v(2).into()]),
                    Expression::variable(v(1)),
                ],
            )
            .build()
            .unwrap();
        let root = plan.root();
        let (classes, fds) = equivalence_classes_and_fds(&mut plan, &mut ctx, root).unwrap();
        assert!(classes.are_equivalent(v(1), v(4)));
        assert!(fds.contains(&FunctionalDependency::new([v(1)], [v(2), v(3)])));
        assert!(fds.contains(&FunctionalDependency::new([v(2)], [v(3)])));
    }

    #[test]
    fn test_outer_join_dependencies() {
        let mut ctx = context();
        let mut builder = PlanBuilder::new();
        let right = builder.scan("B", vec![v(3), v(4)]).detach().unwrap();
        let mut plan = builder
            .scan("A", vec![v(1), v(2)])
            .join(
                Join::new(JoinKind::LeftOuter, Expression::eq(v(2), v(3))),
                right,
            )
            .build()
            .unwrap();
        let root = plan.root();
        let (classes, fds) = equivalence_classes_and_fds(&mut plan, &mut ctx, root).unwrap();
        assert!(!classes.are_equivalent(v(2), v(3)));
        assert!(fds.contains(&FunctionalDependency::new([v(2)], [v(3)])));
    }

    #[test]
    fn test_group_by_moves_determined_keys_to_decor() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .group_by(
                vec![
                    (v(3), Expression::variable(v(1))),
                    (v(4), Expression::variable(v(2))),
                ],
                vec![],
                |nested| {
                    nested.aggregate(
                        vec![v(5)],
                        vec![Expression::call(FunctionIdentifier::Count, vec![v(2).into()])],
                    )
                },
            )
            .build()
            .unwrap();
        let root = plan.root();
        compute_fds_and_equivalence_classes(&mut plan, &mut ctx, root).unwrap();

        let group_by = plan.operator(root).as_group_by().unwrap();
        assert_eq!(vec![v(3)], group_by.group_by_variables());
        assert_eq!(vec![v(4)], group_by.decor_variables());
        assert_eq!(vec![v(5), v(3), v(4)], plan.schema(root).unwrap());
        assert!(ctx
            .fds(root)
            .unwrap()
            .contains(&FunctionalDependency::new([v(3)], [v(4), v(5)])));
        assert!(matches!(plan.operator(root), LogicalOperator::GroupBy(_)));
    }

    #[test]
    fn test_group_by_keeps_one_key() {
        let mut ctx = context();
        let mut plan = PlanBuilder::new()
            .scan("B", vec![v(1), v(2)])
            .select(Expression::eq(v(1), Expression::constant(1i64)))
            .group_by(vec![(v(3), Expression::variable(v(1)))], vec![], |nested| {
                nested.aggregate(
                    vec![v(4)],
                    vec![Expression::call(FunctionIdentifier::Count, vec![v(2).into()])],
                )
            })
            .build()
            .unwrap();
        let root = plan.root();
        compute_fds_and_equivalence_classes(&mut plan, &mut ctx, root).unwrap();
        let group_by = plan.operator(root).as_group_by().unwrap();
        assert_eq!(vec![v(3)], group_by.group_by_variables());
    }
}
