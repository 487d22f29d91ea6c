use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use enumset::EnumSet;

use crate::config::{OptimizerConfig, PhysicalOptimizationConfig};
use crate::expr::{LogicalVariable, TypeEnvironment};
use crate::metadata::MetadataProvider;
use crate::plan::NodeId;
use crate::properties::{EquivalenceClasses, FunctionalDependency, StructuralPropertiesVector};
use crate::rules::RuleId;
use crate::stat::LogicalProperties;

/// Context for optimization: metadata access, configuration, a fresh variable source and the
/// per-operator memo tables.
///
/// Memo tables are keyed by node id. Derived facts are dropped whenever a rewrite changes the
/// plan, and entries of removed nodes are forgotten.
pub struct OptimizationContext {
    metadata: Arc<dyn MetadataProvider>,
    config: OptimizerConfig,
    next_variable: u32,
    equivalence_classes: HashMap<NodeId, EquivalenceClasses>,
    fds: HashMap<NodeId, Vec<FunctionalDependency>>,
    type_environments: HashMap<NodeId, TypeEnvironment>,
    delivered: HashMap<NodeId, StructuralPropertiesVector>,
    logical_properties: HashMap<NodeId, LogicalProperties>,
    applied_rules: HashMap<NodeId, EnumSet<RuleId>>,
    not_to_be_inlined: HashSet<LogicalVariable>,
}

impl OptimizationContext {
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self::with_config(metadata, OptimizerConfig::default())
    }

    pub fn with_config(metadata: Arc<dyn MetadataProvider>, config: OptimizerConfig) -> Self {
        Self {
            metadata,
            config,
            next_variable: 0,
            equivalence_classes: HashMap::new(),
            fds: HashMap::new(),
            type_environments: HashMap::new(),
            delivered: HashMap::new(),
            logical_properties: HashMap::new(),
            applied_rules: HashMap::new(),
            not_to_be_inlined: HashSet::new(),
        }
    }

    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn physical_config(&self) -> &PhysicalOptimizationConfig {
        &self.config.physical
    }

    /// A variable never used before in this context.
    pub fn new_variable(&mut self) -> LogicalVariable {
        self.next_variable += 1;
        LogicalVariable(self.next_variable)
    }

    /// Makes sure fresh variables come after `max`.
    pub fn reserve_variables(&mut self, max: Option<LogicalVariable>) {
        if let Some(max) = max {
            self.next_variable = self.next_variable.max(max.id());
        }
    }

    pub fn equivalence_classes(&self, id: NodeId) -> Option<&EquivalenceClasses> {
        self.equivalence_classes.get(&id)
    }

    pub fn fds(&self, id: NodeId) -> Option<&[FunctionalDependency]> {
        self.fds.get(&id).map(|fds| fds.as_slice())
    }

    pub fn has_fds(&self, id: NodeId) -> bool {
        self.fds.contains_key(&id)
    }

    pub fn set_equivalence_classes_and_fds(
        &mut self,
        id: NodeId,
        classes: EquivalenceClasses,
        fds: Vec<FunctionalDependency>,
    ) {
        self.equivalence_classes.insert(id, classes);
        self.fds.insert(id, fds);
    }

    pub fn type_environment(&self, id: NodeId) -> Option<&TypeEnvironment> {
        self.type_environments.get(&id)
    }

    pub fn set_type_environment(&mut self, id: NodeId, env: TypeEnvironment) {
        self.type_environments.insert(id, env);
    }

    pub fn delivered_properties(&self, id: NodeId) -> Option<&StructuralPropertiesVector> {
        self.delivered.get(&id)
    }

    pub fn set_delivered_properties(&mut self, id: NodeId, props: StructuralPropertiesVector) {
        self.delivered.insert(id, props);
    }

    pub fn logical_properties(&self, id: NodeId) -> Option<&LogicalProperties> {
        self.logical_properties.get(&id)
    }

    pub fn set_logical_properties(&mut self, id: NodeId, props: LogicalProperties) {
        self.logical_properties.insert(id, props);
    }

    pub fn is_rule_applied(&self, rule: RuleId, id: NodeId) -> bool {
        self.applied_rules
            .get(&id)
            .map(|rules| rules.contains(rule))
            .unwrap_or(false)
    }

    /// Marks `rule` as not to be applied on `id` again.
    pub fn set_rule_applied(&mut self, rule: RuleId, id: NodeId) {
        self.applied_rules.entry(id).or_default().insert(rule);
    }

    pub fn clear_rule_applied(&mut self, rule: RuleId, id: NodeId) {
        if let Some(rules) = self.applied_rules.get_mut(&id) {
            rules.remove(rule);
        }
    }

    pub fn reset_applied_rules(&mut self) {
        self.applied_rules.clear();
    }

    pub fn add_not_to_be_inlined(&mut self, var: LogicalVariable) {
        self.not_to_be_inlined.insert(var);
    }

    pub fn is_not_to_be_inlined(&self, var: LogicalVariable) -> bool {
        self.not_to_be_inlined.contains(&var)
    }

    /// Drops derived facts that a rewrite may have made stale. Delivered properties and applied
    /// rule marks survive, they are maintained by the rules that set them.
    pub fn invalidate_derived(&mut self) {
        self.equivalence_classes.clear();
        self.fds.clear();
        self.type_environments.clear();
        self.logical_properties.clear();
    }

    /// Forgets everything known about a removed node.
    pub fn forget_node(&mut self, id: NodeId) {
        self.equivalence_classes.remove(&id);
        self.fds.remove(&id);
        self.type_environments.remove(&id);
        self.delivered.remove(&id);
        self.logical_properties.remove(&id);
        self.applied_rules.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::LogicalVariable;
    use crate::optimizer::OptimizationContext;
    use crate::plan::NodeId;
    use crate::rules::RuleId;
    use crate::test_utils::empty_metadata;

    #[test]
    fn test_fresh_variables_follow_reserved() {
        let mut ctx = OptimizationContext::new(empty_metadata());
        ctx.reserve_variables(Some(LogicalVariable(7)));
        assert_eq!(LogicalVariable(8), ctx.new_variable());
        ctx.reserve_variables(Some(LogicalVariable(3)));
        assert_eq!(LogicalVariable(9), ctx.new_variable());
    }

    #[test]
    fn test_applied_rules() {
        let mut ctx = OptimizationContext::new(empty_metadata());
        let node = NodeId::new(3);
        assert!(!ctx.is_rule_applied(RuleId::EnforceStructuralProperties, node));
        ctx.set_rule_applied(RuleId::EnforceStructuralProperties, node);
        assert!(ctx.is_rule_applied(RuleId::EnforceStructuralProperties, node));
        assert!(!ctx.is_rule_applied(RuleId::InferTypes, node));
        ctx.forget_node(node);
        assert!(!ctx.is_rule_applied(RuleId::EnforceStructuralProperties, node));
    }
}
