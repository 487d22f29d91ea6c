use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

use datafusion_common::ScalarValue;
use itertools::Itertools;

use crate::expr::{Expression, LogicalVariable};

/// Variables known to hold the same value at one point of a plan, optionally bound to a constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivalenceClass {
    members: BTreeSet<LogicalVariable>,
    constant: Option<ScalarValue>,
}

impl EquivalenceClass {
    pub fn members(&self) -> &BTreeSet<LogicalVariable> {
        &self.members
    }

    pub fn constant(&self) -> Option<&ScalarValue> {
        self.constant.as_ref()
    }

    pub fn contains(&self, var: LogicalVariable) -> bool {
        self.members.contains(&var)
    }

    /// The constant if bound, otherwise the smallest member.
    pub fn representative(&self) -> Option<Expression> {
        match &self.constant {
            Some(value) => Some(Expression::Constant(value.clone())),
            None => self.members.iter().next().map(|var| Expression::Variable(*var)),
        }
    }

    fn is_trivial(&self) -> bool {
        self.constant.is_none() && self.members.len() < 2
    }
}

/// Disjoint equivalence classes of one operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EquivalenceClasses {
    classes: Vec<EquivalenceClass>,
}

impl EquivalenceClasses {
    pub fn iter(&self) -> impl Iterator<Item = &EquivalenceClass> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn position(&self, var: LogicalVariable) -> Option<usize> {
        self.classes.iter().position(|class| class.contains(var))
    }

    pub fn class_of(&self, var: LogicalVariable) -> Option<&EquivalenceClass> {
        self.position(var).map(|idx| &self.classes[idx])
    }

    pub fn merge(&mut self, left: LogicalVariable, right: LogicalVariable) {
        match (self.position(left), self.position(right)) {
            (None, None) => self.classes.push(EquivalenceClass {
                members: [left, right].into_iter().collect(),
                constant: None,
            }),
            (Some(idx), None) => {
                self.classes[idx].members.insert(right);
            }
            (None, Some(idx)) => {
                self.classes[idx].members.insert(left);
            }
            (Some(l), Some(r)) if l != r => {
                let removed = self.classes.remove(l.max(r));
                let kept = &mut self.classes[l.min(r)];
                kept.members.extend(removed.members);
                if kept.constant.is_none() {
                    kept.constant = removed.constant;
                }
            }
            _ => {}
        }
    }

    /// Binds `var` to `value`. A class that already has a constant keeps its own.
    pub fn add_constant(&mut self, var: LogicalVariable, value: ScalarValue) {
        match self.position(var) {
            Some(idx) => {
                let class = &mut self.classes[idx];
                if class.constant.is_none() {
                    class.constant = Some(value);
                }
            }
            None => self.classes.push(EquivalenceClass {
                members: [var].into_iter().collect(),
                constant: Some(value),
            }),
        }
    }

    pub fn are_equivalent(&self, left: LogicalVariable, right: LogicalVariable) -> bool {
        left == right
            || matches!(
                (self.position(left), self.position(right)),
                (Some(l), Some(r)) if l == r
            )
    }

    pub fn is_constant(&self, var: LogicalVariable) -> bool {
        self.class_of(var)
            .map(|class| class.constant.is_some())
            .unwrap_or(false)
    }

    /// Canonical expression for `var`.
    pub fn representative_of(&self, var: LogicalVariable) -> Expression {
        self.class_of(var)
            .and_then(|class| class.representative())
            .unwrap_or(Expression::Variable(var))
    }

    /// Smallest variable equivalent to `var`, ignoring constants.
    pub fn representative_variable(&self, var: LogicalVariable) -> LogicalVariable {
        self.class_of(var)
            .and_then(|class| class.members.iter().next().copied())
            .unwrap_or(var)
    }

    /// `var` and every variable equivalent to it.
    pub fn members_of(&self, var: LogicalVariable) -> BTreeSet<LogicalVariable> {
        match self.class_of(var) {
            Some(class) => class.members.clone(),
            None => [var].into_iter().collect(),
        }
    }

    /// Keeps only the variables accepted by `keep`.
    pub fn restrict<F: Fn(LogicalVariable) -> bool>(&self, keep: F) -> Self {
        let classes = self
            .classes
            .iter()
            .map(|class| EquivalenceClass {
                members: class.members.iter().copied().filter(|v| keep(*v)).collect(),
                constant: class.constant.clone(),
            })
            .filter(|class| !class.members.is_empty() && !class.is_trivial())
            .collect();
        Self { classes }
    }

    /// Maps members through `renames`, members without a mapping are dropped.
    pub fn rename(&self, renames: &HashMap<LogicalVariable, Vec<LogicalVariable>>) -> Self {
        let mut result = Self::default();
        for class in &self.classes {
            let members: Vec<LogicalVariable> = class
                .members
                .iter()
                .flat_map(|var| renames.get(var).cloned().unwrap_or_default())
                .collect();
            if let Some(first) = members.first() {
                for other in &members[1..] {
                    result.merge(*first, *other);
                }
                if let Some(value) = &class.constant {
                    result.add_constant(*first, value.clone());
                }
            }
        }
        result
    }

    /// Adds every equivalence of `other`.
    pub fn union(&mut self, other: &EquivalenceClasses) {
        for class in &other.classes {
            let mut members = class.members.iter();
            if let Some(first) = members.next() {
                for var in members {
                    self.merge(*first, *var);
                }
                if let Some(value) = &class.constant {
                    self.add_constant(*first, value.clone());
                }
            }
        }
    }
}

impl Display for EquivalenceClasses {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let classes = self.classes.iter().map(|class| match &class.constant {
            Some(value) => format!("{{{}}} = {}", class.members.iter().join(", "), value),
            None => format!("{{{}}}", class.members.iter().join(", ")),
        });
        write!(f, "[{}]", classes.format(", "))
    }
}

/// `head -> tail`: the values of `tail` are determined by the values of `head`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionalDependency {
    head: BTreeSet<LogicalVariable>,
    tail: BTreeSet<LogicalVariable>,
}

impl FunctionalDependency {
    pub fn new<H, T>(head: H, tail: T) -> Self
    where
        H: IntoIterator<Item = LogicalVariable>,
        T: IntoIterator<Item = LogicalVariable>,
    {
        Self {
            head: head.into_iter().collect(),
            tail: tail.into_iter().collect(),
        }
    }

    pub fn head(&self) -> &BTreeSet<LogicalVariable> {
        &self.head
    }

    pub fn tail(&self) -> &BTreeSet<LogicalVariable> {
        &self.tail
    }

    pub fn extend_tail<I: IntoIterator<Item = LogicalVariable>>(&mut self, vars: I) {
        self.tail.extend(vars)
    }

    /// Rewrites the dependency over `renames`. Fails if a head variable has no mapping.
    pub fn rename(&self, renames: &HashMap<LogicalVariable, Vec<LogicalVariable>>) -> Option<Self> {
        let mut head = BTreeSet::new();
        for var in &self.head {
            head.insert(*renames.get(var)?.first()?);
        }
        let tail: BTreeSet<LogicalVariable> = self
            .tail
            .iter()
            .flat_map(|var| renames.get(var).cloned().unwrap_or_default())
            .collect();
        if tail.is_empty() {
            None
        } else {
            Some(Self { head, tail })
        }
    }
}

impl Display for FunctionalDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}} -> {{{}}}",
            self.head.iter().join(", "),
            self.tail.iter().join(", ")
        )
    }
}

/// Every variable determined by `vars` under `fds` and `classes`.
pub fn closure<'a, I>(
    vars: I,
    fds: &[FunctionalDependency],
    classes: &EquivalenceClasses,
) -> BTreeSet<LogicalVariable>
where
    I: IntoIterator<Item = &'a LogicalVariable>,
{
    let mut result: BTreeSet<LogicalVariable> = BTreeSet::new();
    for var in vars {
        result.extend(classes.members_of(*var));
    }
    for class in classes.iter().filter(|class| class.constant().is_some()) {
        result.extend(class.members().iter().copied());
    }

    loop {
        let mut changed = false;
        for fd in fds {
            if fd.head.iter().all(|var| result.contains(var))
                && !fd.tail.iter().all(|var| result.contains(var))
            {
                for var in &fd.tail {
                    result.extend(classes.members_of(*var));
                }
                changed = true;
            }
        }
        if !changed {
            return result;
        }
    }
}

/// Whether `head` determines every variable of `target`.
pub fn determines<'a, 'b, H, T>(
    head: H,
    target: T,
    fds: &[FunctionalDependency],
    classes: &EquivalenceClasses,
) -> bool
where
    H: IntoIterator<Item = &'a LogicalVariable>,
    T: IntoIterator<Item = &'b LogicalVariable>,
{
    let closure = closure(head, fds, classes);
    target.into_iter().all(|var| closure.contains(var))
}

#[cfg(test)]
mod tests {
    use crate::expr::{Expression, LogicalVariable};
    use crate::properties::{closure, determines, EquivalenceClasses, FunctionalDependency};
    use datafusion_common::ScalarValue;
    use maplit::{btreeset, hashmap};

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    fn assert_disjoint(classes: &EquivalenceClasses) {
        let mut seen = btreeset! {};
        for class in classes.iter() {
            for member in class.members() {
                assert!(seen.insert(*member), "{} in two classes", member);
            }
        }
    }

    #[test]
    fn test_merge_keeps_classes_disjoint() {
        let mut classes = EquivalenceClasses::default();
        classes.merge(v(1), v(2));
        classes.merge(v(3), v(4));
        classes.add_constant(v(4), ScalarValue::from(5i64));
        classes.merge(v(2), v(3));
        classes.merge(v(1), v(4));

        assert_eq!(1, classes.len());
        assert_disjoint(&classes);
        assert!(classes.are_equivalent(v(1), v(4)));
        assert!(classes.is_constant(v(2)));
        assert_eq!(Expression::constant(5i64), classes.representative_of(v(3)));
        assert_eq!(v(1), classes.representative_variable(v(3)));
        assert_eq!(Expression::Variable(v(9)), classes.representative_of(v(9)));
    }

    #[test]
    fn test_restrict_and_rename() {
        let mut classes = EquivalenceClasses::default();
        classes.merge(v(1), v(2));
        classes.merge(v(3), v(4));

        let restricted = classes.restrict(|var| var != v(2));
        assert_eq!(1, restricted.len());
        assert!(restricted.are_equivalent(v(3), v(4)));

        let renamed = classes.rename(&hashmap! {
            v(1) => vec![v(10)],
            v(2) => vec![v(11)],
            v(3) => vec![v(12)],
        });
        assert_disjoint(&renamed);
        assert!(renamed.are_equivalent(v(10), v(11)));
        assert!(renamed.class_of(v(12)).is_none());
    }

    #[test]
    fn test_union() {
        let mut left = EquivalenceClasses::default();
        left.merge(v(1), v(2));
        let mut right = EquivalenceClasses::default();
        right.merge(v(2), v(3));
        right.merge(v(5), v(6));
        left.union(&right);

        assert_disjoint(&left);
        assert_eq!(2, left.len());
        assert!(left.are_equivalent(v(1), v(3)));
    }

    #[test]
    fn test_closure_uses_fds_and_classes() {
        let mut classes = EquivalenceClasses::default();
        classes.merge(v(2), v(3));
        classes.add_constant(v(9), ScalarValue::from(1i64));
        let fds = vec![
            FunctionalDependency::new(vec![v(1)], vec![v(2)]),
            FunctionalDependency::new(vec![v(3)], vec![v(4)]),
        ];

        assert_eq!(
            btreeset! {v(1), v(2), v(3), v(4), v(9)},
            closure(&[v(1)], &fds, &classes)
        );
        assert!(determines(&[v(1)], &[v(4)], &fds, &classes));
        assert!(!determines(&[v(4)], &[v(1)], &fds, &classes));
    }

    #[test]
    fn test_fd_rename() {
        let fd = FunctionalDependency::new(vec![v(1)], vec![v(2), v(3)]);
        let renamed = fd.rename(&hashmap! { v(1) => vec![v(7)], v(2) => vec![v(8)] });
        assert_eq!(
            Some(FunctionalDependency::new(vec![v(7)], vec![v(8)])),
            renamed
        );
        assert_eq!(None, fd.rename(&hashmap! { v(2) => vec![v(8)] }));
        assert_eq!("{$1} -> {$2, $3}", fd.to_string());
    }
}
