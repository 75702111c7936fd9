//! Constraint engine: rights and quota checks that report violations
//! instead of failing.
//!
//! Two constraint families share the [`Constraint`] contract:
//!
//! - **Bound constraints** ([`BoundConstraint`]): quotas compared with a MIN
//!   or MAX bound using the value's natural ordering
//! - **Membership constraints** ([`MembershipConstraint`]): rights checked
//!   with IN / NOT IN against a set of values
//!
//! A [`ConstraintChecker`] evaluates a dynamic list of constraints and
//! concatenates every violation. [`project`] and [`for_each`] adapt a
//! constraint on a value into a constraint on the structure holding it.

pub mod bound;
pub mod membership;
pub mod parameters;
pub mod quota;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use bound::{BoundConstraint, BoundType};
pub use membership::{
    allowed_datasets, allowed_tenants, allowed_user_roles, Containment, MembershipConstraint,
};
pub use parameters::RequiredParameters;
pub use quota::{max_bytes_in_cache, max_parallel_executions_for_user, QuotaLimits, QuotaUsage};

// ---------------------------------------------------------------------------
// ConstraintViolation
// ---------------------------------------------------------------------------

/// Outcome of a failed constraint check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    /// Description of the violated constraint, e.g. `max_parallel_executions_for_user <= 2`.
    pub constraint: String,
    /// Human-readable message naming the offending value.
    pub message: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.constraint)
    }
}

// ---------------------------------------------------------------------------
// Constraint trait
// ---------------------------------------------------------------------------

/// A check of an actual value against a declared constraint.
///
/// An empty result means the value is acceptable.
pub trait Constraint<T: ?Sized>: Send + Sync {
    fn check(&self, actual: &T) -> Vec<ConstraintViolation>;
}

// ---------------------------------------------------------------------------
// ConstraintChecker
// ---------------------------------------------------------------------------

/// Composite of constraints evaluated together.
///
/// Every constraint runs on every call; violations are concatenated in
/// registration order and never truncated.
pub struct ConstraintChecker<T: ?Sized> {
    constraints: Vec<Arc<dyn Constraint<T>>>,
}

impl<T: ?Sized> ConstraintChecker<T> {
    /// A checker with no constraints, which never reports a violation.
    #[must_use]
    pub fn no_violation() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Adds a constraint, builder style.
    #[must_use]
    pub fn with(mut self, constraint: impl Constraint<T> + 'static) -> Self {
        self.push(constraint);
        self
    }

    /// Adds a constraint.
    pub fn push(&mut self, constraint: impl Constraint<T> + 'static) {
        self.constraints.push(Arc::new(constraint));
    }

    /// Appends every constraint of `other`.
    #[must_use]
    pub fn and(mut self, other: ConstraintChecker<T>) -> Self {
        self.constraints.extend(other.constraints);
        self
    }

    /// Runs every constraint and returns all violations.
    #[must_use]
    pub fn check(&self, actual: &T) -> Vec<ConstraintViolation> {
        self.constraints
            .iter()
            .flat_map(|c| c.check(actual))
            .collect()
    }

    /// Number of constraints in the checker.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl<T: ?Sized> Clone for ConstraintChecker<T> {
    fn clone(&self) -> Self {
        Self {
            constraints: self.constraints.clone(),
        }
    }
}

impl<T: ?Sized> Default for ConstraintChecker<T> {
    fn default() -> Self {
        Self::no_violation()
    }
}

impl<T: ?Sized> fmt::Debug for ConstraintChecker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintChecker")
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl<T: ?Sized> Constraint<T> for ConstraintChecker<T> {
    fn check(&self, actual: &T) -> Vec<ConstraintViolation> {
        ConstraintChecker::check(self, actual)
    }
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Constraint on `T` obtained by checking one value extracted from it.
pub struct Project<C, F, V> {
    inner: C,
    extract: F,
    _value: PhantomData<fn() -> V>,
}

/// Checks `constraint` against the value `extract` pulls out of the subject.
pub fn project<T, V, C, F>(constraint: C, extract: F) -> Project<C, F, V>
where
    T: ?Sized,
    C: Constraint<V>,
    F: Fn(&T) -> V + Send + Sync,
{
    Project {
        inner: constraint,
        extract,
        _value: PhantomData,
    }
}

impl<T, V, C, F> Constraint<T> for Project<C, F, V>
where
    T: ?Sized,
    C: Constraint<V>,
    F: Fn(&T) -> V + Send + Sync,
{
    fn check(&self, actual: &T) -> Vec<ConstraintViolation> {
        self.inner.check(&(self.extract)(actual))
    }
}

/// Constraint on `T` obtained by checking every element of a collection
/// extracted from it.
pub struct ForEach<C, F, V> {
    inner: C,
    extract: F,
    _value: PhantomData<fn() -> V>,
}

/// Checks `constraint` against each value `extract` pulls out of the subject.
pub fn for_each<T, V, C, F>(constraint: C, extract: F) -> ForEach<C, F, V>
where
    T: ?Sized,
    C: Constraint<V>,
    F: Fn(&T) -> Vec<V> + Send + Sync,
{
    ForEach {
        inner: constraint,
        extract,
        _value: PhantomData,
    }
}

impl<T, V, C, F> Constraint<T> for ForEach<C, F, V>
where
    T: ?Sized,
    C: Constraint<V>,
    F: Fn(&T) -> Vec<V> + Send + Sync,
{
    fn check(&self, actual: &T) -> Vec<ConstraintViolation> {
        (self.extract)(actual)
            .iter()
            .flat_map(|v| self.inner.check(v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    struct Subject {
        tenant: String,
        datasets: Vec<String>,
        running: u64,
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn no_violation_checker_accepts_anything() {
        let checker: ConstraintChecker<u64> = ConstraintChecker::no_violation();
        assert!(checker.is_empty());
        assert!(checker.check(&u64::MAX).is_empty());
    }

    #[test]
    fn composite_reports_every_violation() {
        let checker = ConstraintChecker::<Subject>::no_violation()
            .with(project(allowed_tenants(set(&["t1"])), |s: &Subject| {
                s.tenant.clone()
            }))
            .with(for_each(allowed_datasets(set(&["D1"])), |s: &Subject| {
                s.datasets.clone()
            }))
            .with(project(
                max_parallel_executions_for_user(Some(1)),
                |s: &Subject| s.running,
            ));
        assert_eq!(checker.len(), 3);

        let subject = Subject {
            tenant: "t2".to_string(),
            datasets: vec!["D1".to_string(), "D2".to_string(), "D3".to_string()],
            running: 2,
        };
        let violations = checker.check(&subject);
        assert_eq!(violations.len(), 4);
        assert!(violations[0].message.contains("t2"));
        assert!(violations[1].message.contains("D2"));
        assert!(violations[2].message.contains("D3"));
        assert!(violations[3].message.contains('2'));
    }

    #[test]
    fn and_concatenates_checkers() {
        let a = ConstraintChecker::<u64>::no_violation().with(BoundConstraint::new(
            "a",
            BoundType::Max,
            1,
            |actual, bound| format!("{actual} > {bound}"),
        ));
        let b = ConstraintChecker::<u64>::no_violation().with(BoundConstraint::new(
            "b",
            BoundType::Max,
            2,
            |actual, bound| format!("{actual} > {bound}"),
        ));
        let both = a.and(b);
        assert_eq!(both.len(), 2);
        assert_eq!(both.check(&3).len(), 2);
        assert_eq!(both.check(&2).len(), 1);
    }

    #[test]
    fn violation_display_includes_constraint() {
        let v = ConstraintViolation {
            constraint: "max_bytes_in_cache <= 10".to_string(),
            message: "too many bytes".to_string(),
        };
        assert_eq!(v.to_string(), "too many bytes (max_bytes_in_cache <= 10)");
    }
}
