use crate::operator::LogicalOperator;
use crate::plan::{NodeId, Plan};

pub type OperatorMatcher = fn(&LogicalOperator) -> bool;

/// A pattern defines which sub plans a rule is tried on.
///
/// To match a `Select` whose input is a `Project`:
/// ```
/// use quartzite::operator::LogicalOperator::{Project, Select};
/// use quartzite::rules::{any, pattern, PatterBuilder};
///
/// pattern(|op| matches!(op, Select(_)))
///   .pattern(|op| matches!(op, Project(_)))
///     .leaf(any)
///   .finish()
/// .finish();
/// ```
///
/// A node without children patterns matches whatever its inputs are.
pub struct Pattern {
    /// Matches against an operator.
    pub predicate: OperatorMatcher,
    /// `None` for leaf node.
    pub children: Option<Vec<Pattern>>,
}

impl Pattern {
    pub fn new_leaf(matcher: OperatorMatcher) -> Pattern {
        Pattern {
            predicate: matcher,
            children: None,
        }
    }

    pub fn new<I: IntoIterator<Item = Pattern>>(matcher: OperatorMatcher, children: I) -> Pattern {
        let children = children.into_iter().collect::<Vec<Pattern>>();
        let children_pattern = if !children.is_empty() {
            Some(children)
        } else {
            None
        };

        Pattern {
            predicate: matcher,
            children: children_pattern,
        }
    }

    /// Whether the sub plan rooted at `node` matches.
    pub fn matches(&self, plan: &Plan, node: NodeId) -> bool {
        if !(self.predicate)(plan.operator(node)) {
            return false;
        }
        match &self.children {
            None => true,
            Some(children) => {
                let inputs = plan.inputs(node);
                inputs.len() == children.len()
                    && children
                        .iter()
                        .zip(inputs.iter())
                        .all(|(child, input)| child.matches(plan, *input))
            }
        }
    }
}

pub fn any(_: &LogicalOperator) -> bool {
    true
}

pub fn pattern(matcher: OperatorMatcher) -> RootPatternBuilder {
    RootPatternBuilder {
        matcher,
        inputs: vec![],
    }
}

pub trait PatterBuilder {
    type Child;
    type Output;
    fn pattern(self, matcher: OperatorMatcher) -> Self::Child;
    fn leaf(self, matcher: OperatorMatcher) -> Self;
    fn finish(self) -> Self::Output;
}

pub struct RootPatternBuilder {
    matcher: OperatorMatcher,
    inputs: Vec<Pattern>,
}

trait AddChild {
    fn add_child(&mut self, pattern: Pattern);
}

pub struct NonRootPatternBuilder<P> {
    parent_builder: P,
    matcher: OperatorMatcher,
    inputs: Vec<Pattern>,
}

impl<P: PatterBuilder + AddChild> PatterBuilder for NonRootPatternBuilder<P> {
    type Child = NonRootPatternBuilder<Self>;
    type Output = P;

    fn pattern(self, matcher: OperatorMatcher) -> NonRootPatternBuilder<Self> {
        NonRootPatternBuilder {
            parent_builder: self,
            matcher,
            inputs: vec![],
        }
    }

    fn leaf(mut self, matcher: OperatorMatcher) -> Self {
        self.inputs.push(Pattern::new_leaf(matcher));
        self
    }

    fn finish(mut self) -> Self::Output {
        let pattern = Pattern::new(self.matcher, self.inputs);
        self.parent_builder.add_child(pattern);
        self.parent_builder
    }
}

impl<P> AddChild for NonRootPatternBuilder<P> {
    fn add_child(&mut self, pattern: Pattern) {
        self.inputs.push(pattern)
    }
}

impl PatterBuilder for RootPatternBuilder {
    type Child = NonRootPatternBuilder<Self>;
    type Output = Pattern;

    fn pattern(self, matcher: OperatorMatcher) -> Self::Child {
        NonRootPatternBuilder {
            parent_builder: self,
            matcher,
            inputs: vec![],
        }
    }

    fn leaf(mut self, matcher: OperatorMatcher) -> Self {
        self.inputs.push(Pattern::new_leaf(matcher));
        self
    }

    fn finish(self) -> Self::Output {
        Pattern::new(self.matcher, self.inputs)
    }
}

impl AddChild for RootPatternBuilder {
    fn add_child(&mut self, pattern: Pattern) {
        self.inputs.push(pattern)
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::LogicalVariable;
    use crate::operator::LogicalOperator::{DataSourceScan, Limit, Project};
    use crate::plan::PlanBuilder;
    use crate::rules::{any, pattern, PatterBuilder};

    #[test]
    fn test_match_nested_pattern() {
        let plan = PlanBuilder::new()
            .scan("A", vec![LogicalVariable(1)])
            .project(vec![LogicalVariable(1)])
            .limit(1)
            .build()
            .unwrap();

        let limit_over_project = pattern(|op| matches!(op, Limit(_)))
            .pattern(|op| matches!(op, Project(_)))
            .leaf(any)
            .finish()
            .finish();
        assert!(limit_over_project.matches(&plan, plan.root()));

        let limit_over_scan = pattern(|op| matches!(op, Limit(_)))
            .leaf(|op| matches!(op, DataSourceScan(_)))
            .finish();
        assert!(!limit_over_scan.matches(&plan, plan.root()));
    }
}
