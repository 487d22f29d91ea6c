use std::mem;

use anyhow::anyhow;
use petgraph::stable_graph::StableGraph;

use crate::error::{OptError, OptResult};
use crate::expr::{Expression, LogicalVariable};
use crate::operator::{
    Aggregate, Assign, DataSourceScan, Distinct, EmptyTupleSource, Exchange, GroupBy, Join,
    Limit, LogicalOperator, NestedPlan, NestedTupleSource, Order, OperatorTrait, Project,
    Replicate, RunningAggregate, Script, Select, Sink, Subplan, UnionAll, UnionMapping, Unnest,
    Write,
};
use crate::plan::{NodeId, OperatorNode, Plan};
use crate::properties::OrderKind;

/// Builds a plan bottom up, each call puts a new operator on top of the current root.
///
/// Several branches share one arena: [`PlanBuilder::detach`] hands out the current root so
/// that a binary operator can take it as its right input.
pub struct PlanBuilder {
    graph: StableGraph<OperatorNode, usize>,
    root: Option<NodeId>,
    error: Option<anyhow::Error>,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            graph: StableGraph::default(),
            root: None,
            error: None,
        }
    }

    fn add<O: Into<LogicalOperator>>(&mut self, operator: O, inputs: &[NodeId]) -> NodeId {
        let id = self.graph.add_node(OperatorNode::new(operator.into()));
        for (idx, input) in inputs.iter().enumerate() {
            self.graph.add_edge(id, *input, idx);
        }
        id
    }

    fn reset_root(&mut self, new_root: NodeId) -> &mut Self {
        self.root = Some(new_root);
        self
    }

    /// Puts a unary operator on top of the current root.
    fn push<O: Into<LogicalOperator>>(&mut self, operator: O) -> &mut Self {
        let operator = operator.into();
        match self.root {
            Some(input) => {
                let id = self.add(operator, &[input]);
                self.reset_root(id)
            }
            None => {
                self.fail(operator.name());
                self
            }
        }
    }

    fn fail(&mut self, operator: &str) {
        if self.error.is_none() {
            self.error = Some(
                OptError::malformed(operator, "operator has no input to build upon").into(),
            );
        }
    }

    pub fn empty_tuple_source(&mut self) -> &mut Self {
        let id = self.add(EmptyTupleSource::new(), &[]);
        self.reset_root(id)
    }

    pub fn scan<S: Into<String>>(
        &mut self,
        data_source: S,
        variables: Vec<LogicalVariable>,
    ) -> &mut Self {
        let ets = self.add(EmptyTupleSource::new(), &[]);
        let scan = self.add(DataSourceScan::new(data_source, variables), &[ets]);
        self.reset_root(scan)
    }

    pub fn select(&mut self, condition: Expression) -> &mut Self {
        self.push(Select::new(condition))
    }

    pub fn assign(
        &mut self,
        variables: Vec<LogicalVariable>,
        expressions: Vec<Expression>,
    ) -> &mut Self {
        self.push(Assign::new(variables, expressions))
    }

    pub fn project(&mut self, variables: Vec<LogicalVariable>) -> &mut Self {
        self.push(Project::new(variables))
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.push(Limit::new(limit))
    }

    pub fn order(&mut self, order: Vec<(OrderKind, Expression)>) -> &mut Self {
        self.push(Order::new(order))
    }

    pub fn distinct(&mut self, variables: Vec<LogicalVariable>) -> &mut Self {
        self.push(Distinct::new(variables))
    }

    pub fn aggregate(
        &mut self,
        variables: Vec<LogicalVariable>,
        expressions: Vec<Expression>,
    ) -> &mut Self {
        self.push(Aggregate::new(variables, expressions))
    }

    pub fn running_aggregate(
        &mut self,
        variables: Vec<LogicalVariable>,
        expressions: Vec<Expression>,
    ) -> &mut Self {
        self.push(RunningAggregate::new(variables, expressions))
    }

    pub fn unnest(&mut self, variable: LogicalVariable, expression: Expression) -> &mut Self {
        self.push(Unnest::new(variable, expression))
    }

    pub fn exchange(&mut self) -> &mut Self {
        self.push(Exchange::new())
    }

    pub fn replicate(&mut self) -> &mut Self {
        self.push(Replicate::new())
    }

    pub fn script<S: Into<String>>(
        &mut self,
        command: S,
        inputs: Vec<LogicalVariable>,
        outputs: Vec<LogicalVariable>,
    ) -> &mut Self {
        self.push(Script::new(command, inputs, outputs))
    }

    pub fn write<S: Into<String>>(&mut self, sink: S, expressions: Vec<Expression>) -> &mut Self {
        self.push(Write::new(sink, expressions))
    }

    pub fn sink(&mut self) -> &mut Self {
        self.push(Sink::new())
    }

    /// Joins the current root (left) with `right`.
    pub fn join(&mut self, join: Join, right: NodeId) -> &mut Self {
        match self.root {
            Some(left) => {
                let id = self.add(join, &[left, right]);
                self.reset_root(id)
            }
            None => {
                self.fail("Join");
                self
            }
        }
    }

    pub fn union_all(&mut self, mappings: Vec<UnionMapping>, right: NodeId) -> &mut Self {
        match self.root {
            Some(left) => {
                let id = self.add(UnionAll::new(mappings), &[left, right]);
                self.reset_root(id)
            }
            None => {
                self.fail("UnionAll");
                self
            }
        }
    }

    /// Groups the current root. `nested` builds the per-group plan on top of a nested tuple
    /// source.
    pub fn group_by<F>(
        &mut self,
        group_by: Vec<(LogicalVariable, Expression)>,
        decor: Vec<(LogicalVariable, Expression)>,
        nested: F,
    ) -> &mut Self
    where
        F: FnOnce(&mut Self) -> &mut Self,
    {
        self.with_nested_plan(GroupBy::new(group_by, decor, vec![]), nested)
    }

    pub fn subplan<F>(&mut self, nested: F) -> &mut Self
    where
        F: FnOnce(&mut Self) -> &mut Self,
    {
        self.with_nested_plan(Subplan::new(vec![]), nested)
    }

    fn with_nested_plan<O, F>(&mut self, operator: O, nested: F) -> &mut Self
    where
        O: Into<LogicalOperator>,
        F: FnOnce(&mut Self) -> &mut Self,
    {
        let operator = operator.into();
        let input = match self.root {
            Some(input) => input,
            None => {
                self.fail(operator.name());
                return self;
            }
        };
        let owner = self.add(operator, &[input]);
        let nts = self.add(NestedTupleSource::new(owner), &[]);
        self.root = Some(nts);
        nested(self);
        let nested_root = self.root.take().unwrap_or(nts);
        if let Some(plans) = self.graph[owner].operator.nested_plans_mut() {
            plans.push(NestedPlan::new(vec![nested_root]));
        }
        self.reset_root(owner)
    }

    /// Annotates the current root.
    pub fn annotate<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        if let Some(root) = self.root {
            self.graph[root].annotations.insert(key.into(), value.into());
        }
        self
    }

    /// Hands out the current root, leaving the builder without one.
    pub fn detach(&mut self) -> OptResult<NodeId> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.root
            .take()
            .ok_or_else(|| anyhow!(OptError::internal("Plan builder has no root to detach")))
    }

    /// Consumes the current plan and computes its schemas. The builder can be reused.
    pub fn build(&mut self) -> OptResult<Plan> {
        let root = self.detach()?;
        let mut plan = Plan {
            graph: mem::take(&mut self.graph),
            root,
        };
        plan.refresh_schemas()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OptError;
    use crate::expr::{Expression, FunctionIdentifier, LogicalVariable};
    use crate::operator::{Join, LogicalOperator};
    use crate::plan::PlanBuilder;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_build_join() {
        let mut builder = PlanBuilder::new();
        let right = builder.scan("B", vec![v(3), v(4)]).detach().unwrap();
        let plan = builder
            .scan("A", vec![v(1), v(2)])
            .join(Join::inner(Expression::eq(v(1), v(3))), right)
            .build()
            .unwrap();

        assert_eq!(
            vec![v(1), v(2), v(3), v(4)],
            plan.schema(plan.root()).unwrap()
        );
        assert_eq!(right, plan.input(plan.root(), 1).unwrap());
    }

    #[test]
    fn test_build_group_by() {
        let plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .group_by(vec![(v(3), Expression::variable(v(1)))], vec![], |nested| {
                nested.aggregate(
                    vec![v(4)],
                    vec![Expression::call(
                        FunctionIdentifier::Count,
                        vec![Expression::variable(v(2))],
                    )],
                )
            })
            .build()
            .unwrap();

        let root = plan.root();
        assert!(matches!(plan.operator(root), LogicalOperator::GroupBy(_)));
        assert_eq!(vec![v(4), v(3)], plan.schema(root).unwrap());
        let aggregate = plan.nested_roots(root)[0];
        let nts = plan.input(aggregate, 0).unwrap();
        assert_eq!(vec![v(1), v(2)], plan.schema(nts).unwrap());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let err = PlanBuilder::new().limit(1).build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::MalformedPlan { .. })
        ));
    }
}
