use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::AsRefStr;

use crate::expr::LogicalVariable;
use crate::properties::{EquivalenceClasses, FunctionalDependency, OrderColumn};

/// The set of execution locations a partitioned data set spans.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub enum NodeDomain {
    /// All locations of the cluster.
    #[default]
    Default,
    Locations(BTreeSet<String>),
}

impl Display for NodeDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeDomain::Default => write!(f, "default"),
            NodeDomain::Locations(locations) => write!(f, "[{}]", locations.iter().join(", ")),
        }
    }
}

/// How a data set is spread over partitions.
///
/// A `None` domain is filled in by property enforcement from the operator's inputs.
#[derive(Clone, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum PartitioningProperty {
    /// A single partition.
    Unpartitioned,
    /// Several partitions following no rule.
    Random { domain: Option<NodeDomain> },
    /// Every partition holds the whole data set.
    Broadcast { domain: Option<NodeDomain> },
    HashPartitioned {
        columns: Vec<LogicalVariable>,
        domain: Option<NodeDomain>,
    },
    RangePartitioned {
        columns: Vec<OrderColumn>,
        domain: Option<NodeDomain>,
    },
}

impl PartitioningProperty {
    pub fn random() -> Self {
        PartitioningProperty::Random { domain: None }
    }

    pub fn broadcast() -> Self {
        PartitioningProperty::Broadcast { domain: None }
    }

    pub fn hashed(columns: Vec<LogicalVariable>) -> Self {
        PartitioningProperty::HashPartitioned {
            columns,
            domain: None,
        }
    }

    pub fn ranged(columns: Vec<OrderColumn>) -> Self {
        PartitioningProperty::RangePartitioned {
            columns,
            domain: None,
        }
    }

    pub fn domain(&self) -> Option<&NodeDomain> {
        match self {
            PartitioningProperty::Unpartitioned => None,
            PartitioningProperty::Random { domain }
            | PartitioningProperty::Broadcast { domain }
            | PartitioningProperty::HashPartitioned { domain, .. }
            | PartitioningProperty::RangePartitioned { domain, .. } => domain.as_ref(),
        }
    }

    fn domain_mut(&mut self) -> Option<&mut Option<NodeDomain>> {
        match self {
            PartitioningProperty::Unpartitioned => None,
            PartitioningProperty::Random { domain }
            | PartitioningProperty::Broadcast { domain }
            | PartitioningProperty::HashPartitioned { domain, .. }
            | PartitioningProperty::RangePartitioned { domain, .. } => Some(domain),
        }
    }

    /// Sets the domain, replacing an existing one.
    pub fn with_domain(mut self, new_domain: NodeDomain) -> Self {
        if let Some(domain) = self.domain_mut() {
            *domain = Some(new_domain);
        }
        self
    }

    /// Sets the domain only if none is set yet.
    pub fn fill_domain(mut self, new_domain: &NodeDomain) -> Self {
        if let Some(domain) = self.domain_mut() {
            if domain.is_none() {
                *domain = Some(new_domain.clone());
            }
        }
        self
    }

    pub fn is_partitioned(&self) -> bool {
        !matches!(
            self,
            PartitioningProperty::Unpartitioned | PartitioningProperty::Broadcast { .. }
        )
    }

    pub fn columns(&self) -> Vec<LogicalVariable> {
        match self {
            PartitioningProperty::HashPartitioned { columns, .. } => columns.clone(),
            PartitioningProperty::RangePartitioned { columns, .. } => {
                columns.iter().map(|c| c.column).collect()
            }
            _ => vec![],
        }
    }

    /// Maps columns through `map`, `None` if some column cannot be mapped.
    pub fn map_columns<F>(&self, map: F) -> Option<Self>
    where
        F: Fn(LogicalVariable) -> Option<LogicalVariable>,
    {
        let mapped = match self {
            PartitioningProperty::HashPartitioned { columns, domain } => {
                PartitioningProperty::HashPartitioned {
                    columns: columns.iter().map(|c| map(*c)).collect::<Option<_>>()?,
                    domain: domain.clone(),
                }
            }
            PartitioningProperty::RangePartitioned { columns, domain } => {
                PartitioningProperty::RangePartitioned {
                    columns: columns
                        .iter()
                        .map(|c| {
                            map(c.column).map(|column| OrderColumn {
                                column,
                                kind: c.kind,
                            })
                        })
                        .collect::<Option<_>>()?,
                    domain: domain.clone(),
                }
            }
            other => other.clone(),
        };
        Some(mapped)
    }

    /// Replaces columns by their class representative and drops constant columns.
    pub fn normalize(&self, classes: &EquivalenceClasses, _fds: &[FunctionalDependency]) -> Self {
        match self {
            PartitioningProperty::HashPartitioned { columns, domain } => {
                PartitioningProperty::HashPartitioned {
                    columns: columns
                        .iter()
                        .filter(|c| !classes.is_constant(**c))
                        .map(|c| classes.representative_variable(*c))
                        .unique()
                        .collect(),
                    domain: domain.clone(),
                }
            }
            PartitioningProperty::RangePartitioned { columns, domain } => {
                PartitioningProperty::RangePartitioned {
                    columns: columns
                        .iter()
                        .filter(|c| !classes.is_constant(c.column))
                        .map(|c| OrderColumn {
                            column: classes.representative_variable(c.column),
                            kind: c.kind,
                        })
                        .unique_by(|c| c.column)
                        .collect(),
                    domain: domain.clone(),
                }
            }
            other => other.clone(),
        }
    }

    /// Whether `delivered` satisfies this requirement.
    ///
    /// With `may_expand`, a hash requirement is met by a partitioning on a subset of its columns
    /// and a range requirement by one on a prefix: tuples that agree on the required columns
    /// still land in the same partition.
    pub fn satisfied_by(
        &self,
        delivered: &PartitioningProperty,
        may_expand: bool,
        classes: &EquivalenceClasses,
        fds: &[FunctionalDependency],
    ) -> bool {
        if let (Some(required_domain), Some(delivered_domain)) =
            (self.domain(), delivered.domain())
        {
            if required_domain != delivered_domain {
                return false;
            }
        }

        let required = self.normalize(classes, fds);
        let delivered = delivered.normalize(classes, fds);
        match (&required, &delivered) {
            (PartitioningProperty::Random { .. }, _) => true,
            (PartitioningProperty::Unpartitioned, PartitioningProperty::Unpartitioned) => true,
            (PartitioningProperty::Broadcast { .. }, PartitioningProperty::Broadcast { .. }) => {
                true
            }
            (
                PartitioningProperty::HashPartitioned { columns, .. },
                PartitioningProperty::HashPartitioned { .. }
                | PartitioningProperty::RangePartitioned { .. },
            ) => {
                let required: BTreeSet<_> = columns.iter().copied().collect();
                let delivered: BTreeSet<_> = delivered.columns().into_iter().collect();
                if may_expand {
                    !delivered.is_empty() && delivered.is_subset(&required)
                } else {
                    delivered == required
                }
            }
            (
                PartitioningProperty::RangePartitioned { columns, .. },
                PartitioningProperty::RangePartitioned {
                    columns: delivered_columns,
                    ..
                },
            ) => {
                if may_expand {
                    !delivered_columns.is_empty() && columns.starts_with(delivered_columns)
                } else {
                    columns == delivered_columns
                }
            }
            _ => false,
        }
    }
}

impl Display for PartitioningProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitioningProperty::Unpartitioned => write!(f, "UNPARTITIONED"),
            PartitioningProperty::Random { .. } => write!(f, "RANDOM"),
            PartitioningProperty::Broadcast { .. } => write!(f, "BROADCAST"),
            PartitioningProperty::HashPartitioned { columns, .. } => {
                write!(f, "HASH({})", columns.iter().join(", "))
            }
            PartitioningProperty::RangePartitioned { columns, .. } => {
                write!(f, "RANGE({})", columns.iter().join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::LogicalVariable;
    use crate::properties::{
        EquivalenceClasses, NodeDomain, OrderColumn, PartitioningProperty,
    };
    use maplit::btreeset;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_hash_subset_with_expansion() {
        let classes = EquivalenceClasses::default();
        let required = PartitioningProperty::hashed(vec![v(1), v(2)]);
        let delivered = PartitioningProperty::hashed(vec![v(2)]);
        assert!(required.satisfied_by(&delivered, true, &classes, &[]));
        assert!(!required.satisfied_by(&delivered, false, &classes, &[]));
        assert!(!delivered.satisfied_by(&required, true, &classes, &[]));
    }

    #[test]
    fn test_hash_through_equivalent_columns() {
        let mut classes = EquivalenceClasses::default();
        classes.merge(v(1), v(4));
        let required = PartitioningProperty::hashed(vec![v(4)]);
        let delivered = PartitioningProperty::hashed(vec![v(1)]);
        assert!(required.satisfied_by(&delivered, false, &classes, &[]));
    }

    #[test]
    fn test_range_prefix() {
        let classes = EquivalenceClasses::default();
        let required =
            PartitioningProperty::ranged(vec![OrderColumn::asc(v(1)), OrderColumn::asc(v(2))]);
        let delivered = PartitioningProperty::ranged(vec![OrderColumn::asc(v(1))]);
        assert!(required.satisfied_by(&delivered, true, &classes, &[]));
        assert!(!required.satisfied_by(&delivered, false, &classes, &[]));
        assert!(PartitioningProperty::hashed(vec![v(1)]).satisfied_by(
            &delivered,
            false,
            &classes,
            &[]
        ));
    }

    #[test]
    fn test_random_and_domains() {
        let classes = EquivalenceClasses::default();
        let random = PartitioningProperty::random();
        assert!(random.satisfied_by(&PartitioningProperty::Unpartitioned, true, &classes, &[]));
        assert!(!PartitioningProperty::Unpartitioned.satisfied_by(&random, true, &classes, &[]));

        let somewhere = NodeDomain::Locations(btreeset! {"nc1".to_string()});
        let required = PartitioningProperty::random().with_domain(NodeDomain::Default);
        let delivered = PartitioningProperty::random().with_domain(somewhere.clone());
        assert!(!required.satisfied_by(&delivered, true, &classes, &[]));
        assert_eq!(
            Some(&somewhere),
            PartitioningProperty::broadcast().fill_domain(&somewhere).domain()
        );
    }
}
