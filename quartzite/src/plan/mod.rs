//! Operator graph.
//!
//! Operators live in an arena ([`StableGraph`]) and are addressed by [`NodeId`], which stays
//! valid while other nodes are added or removed. An edge goes from an operator to one of its
//! inputs and is weighted with the input position. Nested plans are lists of root ids stored
//! in their owner's operator; the nested tuple source at their leaves refers back to the owner
//! by id, and that reference is never an edge.
use std::collections::{BTreeMap, HashSet};

use anyhow::bail;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use smallvec::SmallVec;

use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::operator::physical::PhysicalOperator;
use crate::operator::{ExecutionMode, LogicalOperator, OperatorTrait};

mod builder;
pub use builder::*;
pub mod explain;
mod isomorphism;
mod validate;

pub type NodeId = NodeIndex<u32>;

pub type Inputs = SmallVec<[NodeId; 2]>;

#[derive(Clone, Debug)]
pub struct OperatorNode {
    pub operator: LogicalOperator,
    pub execution_mode: ExecutionMode,
    pub physical: Option<PhysicalOperator>,
    /// Optimizer hints, e.g. `hash-group-by`.
    pub annotations: BTreeMap<String, String>,
    schema: Option<Vec<LogicalVariable>>,
}

impl OperatorNode {
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            operator,
            execution_mode: ExecutionMode::default(),
            physical: None,
            annotations: BTreeMap::new(),
            schema: None,
        }
    }

    pub fn schema(&self) -> Option<&[LogicalVariable]> {
        self.schema.as_deref()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(|value| value.as_str())
    }
}

/// A place holding an operator, the unit of rewriting.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum OperatorSlot {
    Root,
    Input {
        parent: NodeId,
        index: usize,
    },
    NestedRoot {
        owner: NodeId,
        plan: usize,
        index: usize,
    },
}

#[derive(Clone, Debug)]
pub struct Plan {
    graph: StableGraph<OperatorNode, usize>,
    root: NodeId,
}

impl Plan {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn node(&self, id: NodeId) -> &OperatorNode {
        &self.graph[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut OperatorNode {
        &mut self.graph[id]
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id)
    }

    pub fn operator(&self, id: NodeId) -> &LogicalOperator {
        &self.graph[id].operator
    }

    pub fn operator_mut(&mut self, id: NodeId) -> &mut LogicalOperator {
        self.graph[id].schema = None;
        &mut self.graph[id].operator
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn add_node<O: Into<LogicalOperator>>(&mut self, operator: O, inputs: &[NodeId]) -> NodeId {
        let id = self.graph.add_node(OperatorNode::new(operator.into()));
        for (idx, input) in inputs.iter().enumerate() {
            self.graph.add_edge(id, *input, idx);
        }
        id
    }

    /// Inputs ordered by position.
    pub fn inputs(&self, id: NodeId) -> Inputs {
        let mut edges: SmallVec<[(usize, NodeId); 2]> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| (*edge.weight(), edge.target()))
            .collect();
        edges.sort_by_key(|(idx, _)| *idx);
        edges.into_iter().map(|(_, input)| input).collect()
    }

    pub fn input(&self, id: NodeId, index: usize) -> OptResult<NodeId> {
        match self.inputs(id).get(index) {
            Some(input) => Ok(*input),
            None => bail!(OptError::internal(format!(
                "{} has no input {}",
                self.operator(id).name(),
                index
            ))),
        }
    }

    pub fn set_input(&mut self, parent: NodeId, index: usize, input: NodeId) {
        let existing = self
            .graph
            .edges_directed(parent, Direction::Outgoing)
            .find(|edge| *edge.weight() == index)
            .map(|edge| edge.id());
        if let Some(edge) = existing {
            self.graph.remove_edge(edge);
        }
        self.graph.add_edge(parent, input, index);
        self.graph[parent].schema = None;
    }

    pub fn swap_inputs(&mut self, parent: NodeId, left: usize, right: usize) -> OptResult<()> {
        let left_input = self.input(parent, left)?;
        let right_input = self.input(parent, right)?;
        self.set_input(parent, left, right_input);
        self.set_input(parent, right, left_input);
        Ok(())
    }

    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        let mut parents: Vec<NodeId> = self
            .graph
            .neighbors_directed(id, Direction::Incoming)
            .collect();
        parents.sort();
        parents.dedup();
        parents
    }

    /// Roots of every nested plan of `id`.
    pub fn nested_roots(&self, id: NodeId) -> Vec<NodeId> {
        self.operator(id)
            .nested_plans()
            .iter()
            .flat_map(|plan| plan.roots.iter().copied())
            .collect()
    }

    /// Slots of the inputs and then of the nested plan roots of `id`.
    pub fn child_slots(&self, id: NodeId) -> Vec<OperatorSlot> {
        let mut slots: Vec<OperatorSlot> = (0..self.inputs(id).len())
            .map(|index| OperatorSlot::Input { parent: id, index })
            .collect();
        for (plan, nested) in self.operator(id).nested_plans().iter().enumerate() {
            for index in 0..nested.roots.len() {
                slots.push(OperatorSlot::NestedRoot {
                    owner: id,
                    plan,
                    index,
                });
            }
        }
        slots
    }

    pub fn node_at(&self, slot: OperatorSlot) -> OptResult<NodeId> {
        match slot {
            OperatorSlot::Root => Ok(self.root),
            OperatorSlot::Input { parent, index } => self.input(parent, index),
            OperatorSlot::NestedRoot { owner, plan, index } => self
                .operator(owner)
                .nested_plans()
                .get(plan)
                .and_then(|nested| nested.roots.get(index))
                .copied()
                .ok_or_else(|| {
                    OptError::internal(format!(
                        "{} has no nested root {}.{}",
                        self.operator(owner).name(),
                        plan,
                        index
                    ))
                    .into()
                }),
        }
    }

    /// Puts `id` into `slot`, replacing what it held.
    pub fn set_slot(&mut self, slot: OperatorSlot, id: NodeId) -> OptResult<()> {
        match slot {
            OperatorSlot::Root => self.root = id,
            OperatorSlot::Input { parent, index } => self.set_input(parent, index, id),
            OperatorSlot::NestedRoot { owner, plan, index } => {
                let name = self.operator(owner).name().to_string();
                let root = self
                    .graph[owner]
                    .operator
                    .nested_plans_mut()
                    .and_then(|plans| plans.get_mut(plan))
                    .and_then(|nested| nested.roots.get_mut(index));
                match root {
                    Some(root) => *root = id,
                    None => bail!(OptError::internal(format!(
                        "{} has no nested root {}.{}",
                        name, plan, index
                    ))),
                }
                self.graph[owner].schema = None;
            }
        }
        Ok(())
    }

    pub fn schema(&self, id: NodeId) -> OptResult<&[LogicalVariable]> {
        match self.graph[id].schema.as_deref() {
            Some(schema) => Ok(schema),
            None => bail!(OptError::internal(format!(
                "Schema of {} is not computed",
                self.operator(id).name()
            ))),
        }
    }

    /// Recomputes the schema of `id` from the already computed schemas of its inputs.
    pub fn recompute_schema(&mut self, id: NodeId) -> OptResult<()> {
        let schema = match self.operator(id) {
            LogicalOperator::NestedTupleSource(nts) => {
                let source_input = self.input(nts.source(), 0)?;
                self.schema(source_input)?.to_vec()
            }
            operator => {
                let inputs = self.inputs(id);
                let input_schemas = inputs
                    .iter()
                    .map(|input| self.schema(*input))
                    .collect::<OptResult<Vec<_>>>()?;
                let nested_schemas = self
                    .nested_roots(id)
                    .iter()
                    .map(|root| self.schema(*root))
                    .collect::<OptResult<Vec<_>>>()?;
                operator.compute_schema(&input_schemas, &nested_schemas)
            }
        };
        self.graph[id].schema = Some(schema);
        Ok(())
    }

    /// Recomputes schemas bottom up: inputs, then nested plans, then the operator itself.
    pub fn compute_schema_recursively(&mut self, id: NodeId) -> OptResult<()> {
        let mut visited = HashSet::new();
        self.compute_schema_visit(id, &mut visited)
    }

    fn compute_schema_visit(&mut self, id: NodeId, visited: &mut HashSet<NodeId>) -> OptResult<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        for input in self.inputs(id) {
            self.compute_schema_visit(input, visited)?;
        }
        for root in self.nested_roots(id) {
            self.compute_schema_visit(root, visited)?;
        }
        self.recompute_schema(id)
    }

    pub fn refresh_schemas(&mut self) -> OptResult<()> {
        self.compute_schema_recursively(self.root)
    }

    pub fn produced_variables(&self, id: NodeId) -> Vec<LogicalVariable> {
        self.operator(id).produced_variables()
    }

    pub fn used_variables(&self, id: NodeId) -> Vec<LogicalVariable> {
        self.operator(id).used_variables()
    }

    /// Variables visible above `id`.
    pub fn live_variables(&self, id: NodeId) -> OptResult<Vec<LogicalVariable>> {
        self.schema(id).map(|schema| schema.to_vec())
    }

    /// The operator at or below `from` that assigns `var`.
    pub fn find_producer(&self, from: NodeId, var: LogicalVariable) -> Option<NodeId> {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if self.produced_variables(id).contains(&var) {
                return Some(id);
            }
            stack.extend(self.inputs(id));
            stack.extend(self.nested_roots(id));
        }
        None
    }

    /// Every node reachable from the root through inputs and nested plans, parents first.
    pub fn reachable_nodes(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            let mut children: Vec<NodeId> = self.inputs(id).into_iter().collect();
            children.extend(self.nested_roots(id));
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Removes nodes that are no longer reachable and returns their ids.
    pub fn collect_garbage(&mut self) -> Vec<NodeId> {
        let reachable: HashSet<NodeId> = self.reachable_nodes().into_iter().collect();
        let garbage: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|id| !reachable.contains(id))
            .collect();
        for id in &garbage {
            self.graph.remove_node(*id);
        }
        garbage
    }

    pub fn max_variable(&self) -> Option<LogicalVariable> {
        self.graph
            .node_indices()
            .flat_map(|id| {
                let mut vars = self.produced_variables(id);
                vars.extend(self.used_variables(id));
                vars
            })
            .max()
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{Expression, LogicalVariable};
    use crate::operator::LogicalOperator;
    use crate::plan::{OperatorSlot, PlanBuilder};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_slots_and_garbage() {
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .limit(10)
            .project(vec![v(1)])
            .build()
            .unwrap();

        let project = plan.root();
        let limit = plan.input(project, 0).unwrap();
        let scan = plan.input(limit, 0).unwrap();
        assert_eq!(vec![v(1), v(2)], plan.schema(limit).unwrap());
        assert_eq!(vec![v(1)], plan.schema(project).unwrap());

        // Remove the limit by pointing the project at the scan.
        let slot = OperatorSlot::Input {
            parent: project,
            index: 0,
        };
        assert_eq!(limit, plan.node_at(slot).unwrap());
        plan.set_slot(slot, scan).unwrap();
        assert_eq!(vec![limit], plan.collect_garbage());
        assert!(!plan.contains(limit));
        assert_eq!(vec![project], plan.parents(scan));
        plan.refresh_schemas().unwrap();
        assert_eq!(vec![v(1)], plan.schema(project).unwrap());
        assert!(matches!(plan.operator(project), LogicalOperator::Project(_)));
    }

    #[test]
    fn test_schema_recompute_is_idempotent() {
        let mut plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .assign(vec![v(3)], vec![Expression::variable(v(1))])
            .build()
            .unwrap();
        let root = plan.root();
        let before = plan.schema(root).unwrap().to_vec();
        plan.recompute_schema(root).unwrap();
        assert_eq!(before, plan.schema(root).unwrap());
        assert_eq!(vec![v(1), v(2), v(3)], before);
    }

    #[test]
    fn test_find_producer() {
        let plan = PlanBuilder::new()
            .scan("A", vec![v(1), v(2)])
            .assign(vec![v(3)], vec![Expression::variable(v(1))])
            .limit(1)
            .build()
            .unwrap();
        let root = plan.root();
        let assign = plan.input(root, 0).unwrap();
        let scan = plan.input(assign, 0).unwrap();
        assert_eq!(Some(assign), plan.find_producer(root, v(3)));
        assert_eq!(Some(scan), plan.find_producer(root, v(2)));
        assert_eq!(None, plan.find_producer(root, v(9)));
        assert_eq!(Some(v(3)), plan.max_variable());
    }
}
