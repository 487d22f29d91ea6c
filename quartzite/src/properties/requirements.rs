use anyhow::bail;

use crate::error::{OptError, OptResult};
use crate::expr::LogicalVariable;
use crate::properties::{
    determines, EquivalenceClasses, FunctionalDependency, PartitioningProperty,
    StructuralPropertiesVector,
};

/// Couples the requirement of a second input to what the first input delivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertiesCoordinator {
    NoCoordination,
    /// Both inputs must be hash partitioned on corresponding keys. Once the first input's
    /// partitioning is known, the second must be partitioned on exactly the matching keys.
    EqualityCoordination {
        left_keys: Vec<LogicalVariable>,
        right_keys: Vec<LogicalVariable>,
    },
}

/// What an operator requires from each of its inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalRequirements {
    /// One entry per input, `None` when the input may deliver anything.
    pub required: Vec<Option<StructuralPropertiesVector>>,
    pub coordinator: PropertiesCoordinator,
}

impl PhysicalRequirements {
    pub fn new(required: Vec<Option<StructuralPropertiesVector>>) -> Self {
        Self {
            required,
            coordinator: PropertiesCoordinator::NoCoordination,
        }
    }

    pub fn none(inputs: usize) -> Self {
        Self::new(vec![None; inputs])
    }

    pub fn with_coordinator(mut self, coordinator: PropertiesCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }
}

impl PropertiesCoordinator {
    /// Adjusts the requirement of the second input given the first input's delivery.
    pub fn coordinate(
        &self,
        required: &StructuralPropertiesVector,
        first_delivered: &StructuralPropertiesVector,
        classes: &EquivalenceClasses,
        fds: &[FunctionalDependency],
    ) -> OptResult<StructuralPropertiesVector> {
        let (left_keys, right_keys) = match self {
            PropertiesCoordinator::NoCoordination => return Ok(required.clone()),
            PropertiesCoordinator::EqualityCoordination {
                left_keys,
                right_keys,
            } => (left_keys, right_keys),
        };

        let (columns, domain) = match &first_delivered.partitioning {
            Some(PartitioningProperty::HashPartitioned { columns, domain }) => (columns, domain),
            _ => return Ok(required.clone()),
        };

        let mut coordinated = Vec::with_capacity(columns.len());
        for column in columns {
            let position = left_keys.iter().position(|key| {
                *key == *column
                    || classes.are_equivalent(*key, *column)
                    || (determines([key], [column], fds, classes)
                        && determines([column], [key], fds, classes))
            });
            match position {
                Some(idx) => coordinated.push(right_keys[idx]),
                None => bail!(OptError::internal(format!(
                    "Could not coordinate partitioning column {} with keys {:?}",
                    column, left_keys
                ))),
            }
        }

        let partitioning = PartitioningProperty::HashPartitioned {
            columns: coordinated,
            domain: domain.clone(),
        };
        Ok(StructuralPropertiesVector::new(
            Some(partitioning),
            required.local.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OptError;
    use crate::expr::LogicalVariable;
    use crate::properties::{
        EquivalenceClasses, PartitioningProperty, PropertiesCoordinator,
        StructuralPropertiesVector,
    };

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_equality_coordination() {
        let coordinator = PropertiesCoordinator::EqualityCoordination {
            left_keys: vec![v(1), v(2)],
            right_keys: vec![v(11), v(12)],
        };
        let required = StructuralPropertiesVector::new(
            Some(PartitioningProperty::hashed(vec![v(11), v(12)])),
            vec![],
        );
        let first =
            StructuralPropertiesVector::new(Some(PartitioningProperty::hashed(vec![v(2)])), vec![]);
        let coordinated = coordinator
            .coordinate(&required, &first, &EquivalenceClasses::default(), &[])
            .unwrap();
        assert_eq!(
            Some(PartitioningProperty::hashed(vec![v(12)])),
            coordinated.partitioning
        );
    }

    #[test]
    fn test_unmappable_column_is_internal_error() {
        let coordinator = PropertiesCoordinator::EqualityCoordination {
            left_keys: vec![v(1)],
            right_keys: vec![v(11)],
        };
        let first =
            StructuralPropertiesVector::new(Some(PartitioningProperty::hashed(vec![v(3)])), vec![]);
        let err = coordinator
            .coordinate(
                &StructuralPropertiesVector::random(),
                &first,
                &EquivalenceClasses::default(),
                &[],
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::Internal(_))
        ));
    }
}
