use crate::types::{Batch, ExecutionParameterDescriptor};

use super::{Constraint, ConstraintViolation};

/// Every non-optional parameter descriptor must have a value in the batch.
#[derive(Debug, Clone)]
pub struct RequiredParameters {
    names: Vec<String>,
}

impl RequiredParameters {
    /// Collects the mandatory parameter names from a process's descriptors.
    #[must_use]
    pub fn from_descriptors(descriptors: &[ExecutionParameterDescriptor]) -> Self {
        Self {
            names: descriptors
                .iter()
                .filter(|d| !d.optional)
                .map(|d| d.name.clone())
                .collect(),
        }
    }
}

impl Constraint<Batch> for RequiredParameters {
    fn check(&self, actual: &Batch) -> Vec<ConstraintViolation> {
        self.names
            .iter()
            .filter(|name| actual.parameter(name).is_none())
            .map(|name| ConstraintViolation {
                constraint: format!("required_parameters contains {name}"),
                message: format!("the parameter '{name}' is required but was not supplied"),
            })
            .collect()
    }
}
