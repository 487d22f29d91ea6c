use std::collections::HashSet;

use anyhow::bail;

use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::operator::physical::PhysicalOperatorTrait;
use crate::operator::LogicalOperator;
use crate::plan::{NodeId, Plan};

impl Plan {
    /// Checks that every used variable is produced below its user. With `physical`, also checks
    /// that every operator carries a physical operator and nested plans only hold pipelined
    /// ones.
    pub fn validate(&self, physical: bool) -> OptResult<()> {
        let nested = self.nested_nodes();
        for id in self.reachable_nodes() {
            self.validate_scope(id)?;
            if physical {
                self.validate_physical(id, nested.contains(&id))?;
            }
        }
        Ok(())
    }

    fn validate_scope(&self, id: NodeId) -> OptResult<()> {
        let mut in_scope: Vec<LogicalVariable> = Vec::new();
        for input in self.inputs(id) {
            in_scope.extend_from_slice(self.schema(input)?);
        }
        if let LogicalOperator::Subplan(_) = self.operator(id) {
            return Ok(());
        }
        for var in self.used_variables(id) {
            if !in_scope.contains(&var) {
                bail!(OptError::internal(format!(
                    "{} uses {} which is not produced by its inputs",
                    self.operator(id),
                    var
                )));
            }
        }
        Ok(())
    }

    fn validate_physical(&self, id: NodeId, nested: bool) -> OptResult<()> {
        match &self.node(id).physical {
            None => bail!(OptError::internal(format!(
                "{} has no physical operator",
                self.operator(id)
            ))),
            Some(physical) if nested && !physical.is_micro_operator() => {
                bail!(OptError::internal(format!(
                    "{} cannot run inside a nested plan",
                    physical
                )))
            }
            Some(_) => Ok(()),
        }
    }

    /// Nodes of nested plans, at any depth.
    pub fn nested_nodes(&self) -> HashSet<NodeId> {
        let mut result = HashSet::new();
        let mut stack: Vec<NodeId> = self
            .reachable_nodes()
            .into_iter()
            .flat_map(|id| self.nested_roots(id))
            .collect();
        while let Some(id) = stack.pop() {
            if result.insert(id) {
                stack.extend(self.inputs(id));
                stack.extend(self.nested_roots(id));
            }
        }
        result
    }
}
