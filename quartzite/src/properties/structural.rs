use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::properties::{
    match_local_properties, EquivalenceClasses, FunctionalDependency, LocalProperty, OrderColumn,
    PartitioningProperty,
};

/// Partitioning plus the local properties of each partition.
///
/// Used both for what an operator delivers and for what it requires from an input. A required
/// vector with no partitioning accepts any partitioning.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct StructuralPropertiesVector {
    pub partitioning: Option<PartitioningProperty>,
    pub local: Vec<LocalProperty>,
}

impl StructuralPropertiesVector {
    pub fn new(partitioning: Option<PartitioningProperty>, local: Vec<LocalProperty>) -> Self {
        Self {
            partitioning,
            local,
        }
    }

    /// Random partitioning, nothing known inside a partition.
    pub fn random() -> Self {
        Self::new(Some(PartitioningProperty::random()), vec![])
    }

    pub fn unpartitioned(local: Vec<LocalProperty>) -> Self {
        Self::new(Some(PartitioningProperty::Unpartitioned), local)
    }

    /// The leading run of order properties.
    pub fn order_columns(&self) -> Vec<OrderColumn> {
        self.local
            .iter()
            .map_while(|prop| match prop {
                LocalProperty::Order(order) => Some(order.clone()),
                LocalProperty::Grouping(_) => None,
            })
            .collect()
    }

    /// The part of `required` that these delivered properties do not satisfy, `None` if all of
    /// it is satisfied.
    pub fn unsatisfied_relative_to(
        &self,
        required: &StructuralPropertiesVector,
        may_expand: bool,
        classes: &EquivalenceClasses,
        fds: &[FunctionalDependency],
    ) -> Option<StructuralPropertiesVector> {
        let partitioning = match (&required.partitioning, &self.partitioning) {
            (None, _) => None,
            (Some(PartitioningProperty::Random { domain: None }), None) => None,
            (Some(required), Some(delivered))
                if required.satisfied_by(delivered, may_expand, classes, fds) =>
            {
                None
            }
            (Some(required), _) => Some(required.clone()),
        };

        let local = if match_local_properties(&required.local, &self.local, classes, fds) {
            vec![]
        } else {
            required.local.clone()
        };

        if partitioning.is_none() && local.is_empty() {
            None
        } else {
            Some(Self::new(partitioning, local))
        }
    }
}

impl Display for StructuralPropertiesVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.partitioning {
            Some(partitioning) => write!(f, "[{}", partitioning)?,
            None => write!(f, "[ANY")?,
        }
        write!(f, " | {}]", self.local.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::LogicalVariable;
    use crate::properties::{
        EquivalenceClasses, LocalProperty, OrderColumn, PartitioningProperty,
        StructuralPropertiesVector,
    };

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_satisfied_vector_has_no_diff() {
        let classes = EquivalenceClasses::default();
        let delivered = StructuralPropertiesVector::new(
            Some(PartitioningProperty::hashed(vec![v(1)])),
            vec![LocalProperty::Order(OrderColumn::asc(v(1)))],
        );
        let required = StructuralPropertiesVector::new(
            Some(PartitioningProperty::hashed(vec![v(1), v(2)])),
            vec![LocalProperty::Order(OrderColumn::asc(v(1)))],
        );
        assert_eq!(
            None,
            delivered.unsatisfied_relative_to(&required, true, &classes, &[])
        );
        assert_eq!(
            None,
            delivered.unsatisfied_relative_to(
                &StructuralPropertiesVector::random(),
                true,
                &classes,
                &[]
            )
        );
    }

    #[test]
    fn test_diff_keeps_unsatisfied_parts() {
        let classes = EquivalenceClasses::default();
        let delivered = StructuralPropertiesVector::new(
            Some(PartitioningProperty::hashed(vec![v(1)])),
            vec![],
        );
        let required =
            StructuralPropertiesVector::unpartitioned(vec![LocalProperty::Order(OrderColumn::asc(
                v(1),
            ))]);
        let diff = delivered
            .unsatisfied_relative_to(&required, true, &classes, &[])
            .unwrap();
        assert_eq!(required, diff);
        assert_eq!("[UNPARTITIONED | $1 ASC]", diff.to_string());

        let local_only = StructuralPropertiesVector::new(
            None,
            vec![LocalProperty::Order(OrderColumn::asc(v(1)))],
        );
        assert_eq!(
            Some(local_only.clone()),
            delivered.unsatisfied_relative_to(&local_only, true, &classes, &[])
        );
    }
}
