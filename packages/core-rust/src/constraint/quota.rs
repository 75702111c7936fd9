use serde::{Deserialize, Serialize};

use super::{project, BoundConstraint, BoundType, ConstraintChecker};

/// Usage figures a submission would reach if accepted.
///
/// Built from the current counters plus the submission itself, so a MAX
/// quota of `B` admits the submission iff the projected value is `<= B`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub parallel_executions_for_user: u64,
    pub bytes_in_cache: u64,
}

/// Quota limits configured for a process. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_parallel_executions_for_user: Option<u64>,
    pub max_bytes_in_cache: Option<u64>,
}

impl QuotaLimits {
    /// Quota constraints over a projected [`QuotaUsage`].
    #[must_use]
    pub fn checker(&self) -> ConstraintChecker<QuotaUsage> {
        ConstraintChecker::no_violation()
            .with(project(
                max_parallel_executions_for_user(self.max_parallel_executions_for_user),
                |u: &QuotaUsage| u.parallel_executions_for_user,
            ))
            .with(project(
                max_bytes_in_cache(self.max_bytes_in_cache),
                |u: &QuotaUsage| u.bytes_in_cache,
            ))
    }
}

/// Maximum number of executions one user may have pending or running.
#[must_use]
pub fn max_parallel_executions_for_user(limit: Option<u64>) -> BoundConstraint<u64> {
    const NAME: &str = "max_parallel_executions_for_user";
    match limit {
        None => BoundConstraint::never_violated(NAME),
        Some(limit) => BoundConstraint::new(NAME, BoundType::Max, limit, |actual, bound| {
            format!(
                "{actual} parallel executions for this user would exceed the maximum of {bound}"
            )
        }),
    }
}

/// Maximum number of output bytes a process may keep in cache.
#[must_use]
pub fn max_bytes_in_cache(limit: Option<u64>) -> BoundConstraint<u64> {
    const NAME: &str = "max_bytes_in_cache";
    match limit {
        None => BoundConstraint::never_violated(NAME),
        Some(limit) => BoundConstraint::new(NAME, BoundType::Max, limit, |actual, bound| {
            format!("{actual} bytes in cache would exceed the maximum of {bound} bytes")
        }),
    }
}
