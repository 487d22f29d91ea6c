use crate::operator::physical::PhysicalOperator;
use crate::operator::{LogicalOperator, OperatorTrait};
use crate::plan::{NodeId, Plan};

impl Plan {
    /// Whether both plans have the same shape and operators, regardless of node ids.
    pub fn is_isomorphic(&self, other: &Plan) -> bool {
        self.node_isomorphic(self.root, other, other.root)
    }

    fn node_isomorphic(&self, id: NodeId, other: &Plan, other_id: NodeId) -> bool {
        let (node, other_node) = (self.node(id), other.node(other_id));
        if node.execution_mode != other_node.execution_mode
            || !same_operator(&node.operator, &other_node.operator)
            || !same_physical(node.physical.as_ref(), other_node.physical.as_ref())
        {
            return false;
        }

        let (inputs, other_inputs) = (self.inputs(id), other.inputs(other_id));
        let (nested, other_nested) = (
            node.operator.nested_plans(),
            other_node.operator.nested_plans(),
        );
        inputs.len() == other_inputs.len()
            && nested.len() == other_nested.len()
            && inputs
                .iter()
                .zip(other_inputs.iter())
                .all(|(input, other_input)| self.node_isomorphic(*input, other, *other_input))
            && nested.iter().zip(other_nested.iter()).all(|(plan, other_plan)| {
                plan.roots.len() == other_plan.roots.len()
                    && plan
                        .roots
                        .iter()
                        .zip(other_plan.roots.iter())
                        .all(|(root, other_root)| self.node_isomorphic(*root, other, *other_root))
            })
    }
}

/// Operator equality ignoring node ids held by nested tuple sources and nested plans.
fn same_operator(left: &LogicalOperator, right: &LogicalOperator) -> bool {
    match (left, right) {
        (LogicalOperator::NestedTupleSource(_), LogicalOperator::NestedTupleSource(_)) => true,
        (LogicalOperator::GroupBy(left), LogicalOperator::GroupBy(right)) => {
            left.group_by == right.group_by && left.decor == right.decor
        }
        (LogicalOperator::Subplan(_), LogicalOperator::Subplan(_)) => true,
        _ => left == right,
    }
}

fn same_physical(left: Option<&PhysicalOperator>, right: Option<&PhysicalOperator>) -> bool {
    match (left, right) {
        (
            Some(PhysicalOperator::NestedTupleSource(_)),
            Some(PhysicalOperator::NestedTupleSource(_)),
        ) => true,
        _ => left == right,
    }
}
