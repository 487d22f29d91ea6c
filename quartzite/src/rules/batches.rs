//! The default rule batches, in the order they run.
use crate::heuristic::RuleBatch;
use crate::rules::{
    BreakSelectIntoConjunctsRule, ConsolidateAssignsRule, ConsolidateSelectsRule,
    EnforceStructuralPropertiesRule, InferTypesRule, InlineVariablesRule, MergeLimitsRule,
    PushLimitDownRule, PushSelectDownRule, PushSelectIntoJoinRule, RemoveRedundantProjectRule,
    RemoveUnusedAssignsRule, SetExecutionModeRule, SetPhysicalOperatorsRule,
};

pub fn default_logical_rewrites() -> Vec<RuleBatch> {
    vec![
        RuleBatch::once("type-inference", true, vec![InferTypesRule::new().into()]),
        RuleBatch::fixpoint(
            "normalization",
            true,
            vec![
                BreakSelectIntoConjunctsRule::new().into(),
                InlineVariablesRule::new().into(),
                RemoveUnusedAssignsRule::new().into(),
            ],
        ),
        RuleBatch::fixpoint(
            "predicate-pushdown",
            false,
            vec![PushSelectDownRule::new().into()],
        ),
        RuleBatch::fixpoint(
            "join-order-inference",
            false,
            vec![PushSelectIntoJoinRule::new().into()],
        ),
        RuleBatch::fixpoint(
            "operator-pushdown",
            false,
            vec![MergeLimitsRule::new().into(), PushLimitDownRule::new().into()],
        ),
        RuleBatch::once(
            "data-exchange-insertion",
            true,
            vec![SetExecutionModeRule::new().into()],
        ),
        RuleBatch::fixpoint(
            "consolidation",
            true,
            vec![
                ConsolidateSelectsRule::new().into(),
                ConsolidateAssignsRule::new().into(),
                RemoveRedundantProjectRule::new().into(),
            ],
        ),
    ]
}

pub fn default_physical_rewrites() -> Vec<RuleBatch> {
    vec![
        RuleBatch::once(
            "physical-operator-assignment",
            true,
            vec![SetPhysicalOperatorsRule::new().into()],
        ),
        RuleBatch::fixpoint(
            "property-enforcement",
            false,
            vec![EnforceStructuralPropertiesRule::new().into()],
        ),
        RuleBatch::fixpoint(
            "job-gen-preparation",
            true,
            vec![RemoveRedundantProjectRule::new().into()],
        ),
        RuleBatch::once("type-inference", true, vec![InferTypesRule::new().into()]),
    ]
}

#[cfg(test)]
mod tests {
    use crate::rules::{default_logical_rewrites, default_physical_rewrites};

    #[test]
    fn test_batch_order() {
        let names: Vec<String> = default_logical_rewrites()
            .iter()
            .chain(default_physical_rewrites().iter())
            .map(|batch| batch.name().to_string())
            .collect();
        assert_eq!(
            vec![
                "type-inference",
                "normalization",
                "predicate-pushdown",
                "join-order-inference",
                "operator-pushdown",
                "data-exchange-insertion",
                "consolidation",
                "physical-operator-assignment",
                "property-enforcement",
                "job-gen-preparation",
                "type-inference",
            ],
            names
        );
    }
}
