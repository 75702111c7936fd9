use std::collections::BTreeSet;

use processing_core::QuotaLimits;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Grants one process definition to a tenant.
///
/// Bindings are managed outside this crate and only read here. An empty
/// `datasets` set places no dataset restriction on batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsBinding {
    pub process_business_id: Uuid,
    pub tenant: String,
    /// Minimum role a user needs to see and run the process.
    pub role: String,
    #[serde(default)]
    pub datasets: BTreeSet<String>,
    #[serde(default)]
    pub quotas: QuotaLimits,
}

impl RightsBinding {
    #[must_use]
    pub fn new(
        process_business_id: Uuid,
        tenant: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            process_business_id,
            tenant: tenant.into(),
            role: role.into(),
            datasets: BTreeSet::new(),
            quotas: QuotaLimits::default(),
        }
    }

    /// Restricts the binding to the given datasets.
    #[must_use]
    pub fn with_datasets<I, S>(mut self, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datasets = datasets.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_quotas(mut self, quotas: QuotaLimits) -> Self {
        self.quotas = quotas;
        self
    }
}
