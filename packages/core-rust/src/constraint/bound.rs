use std::fmt;

use super::{Constraint, ConstraintViolation};

/// Direction of a bound constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundType {
    /// The actual value must be at least the bound.
    Min,
    /// The actual value must be at most the bound.
    Max,
}

/// Quota-style constraint comparing a value with a MIN or MAX bound.
///
/// A constraint built with [`BoundConstraint::never_violated`] carries no
/// bound and accepts every value; unset quotas use it instead of scattering
/// `Option` checks through call sites.
pub struct BoundConstraint<V> {
    name: &'static str,
    bound: Option<(BoundType, V)>,
    message: fn(&V, &V) -> String,
}

impl<V> BoundConstraint<V>
where
    V: Ord + fmt::Display,
{
    /// Creates a bound constraint. `message` receives `(actual, bound)`.
    pub fn new(
        name: &'static str,
        bound_type: BoundType,
        bound: V,
        message: fn(&V, &V) -> String,
    ) -> Self {
        Self {
            name,
            bound: Some((bound_type, bound)),
            message,
        }
    }

    /// A constraint that accepts every value.
    #[must_use]
    pub fn never_violated(name: &'static str) -> Self {
        Self {
            name,
            bound: None,
            message: |_, _| String::new(),
        }
    }

    /// Returns `true` when `actual` is within the bound.
    pub fn simple_check(&self, actual: &V) -> bool {
        match &self.bound {
            None => true,
            Some((BoundType::Min, bound)) => actual >= bound,
            Some((BoundType::Max, bound)) => actual <= bound,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bound type and value, or `None` for a never-violated constraint.
    #[must_use]
    pub fn bound(&self) -> Option<(BoundType, &V)> {
        self.bound.as_ref().map(|(t, v)| (*t, v))
    }
}

impl<V> fmt::Display for BoundConstraint<V>
where
    V: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bound {
            None => write!(f, "{} unbounded", self.name),
            Some((BoundType::Min, bound)) => write!(f, "{} >= {bound}", self.name),
            Some((BoundType::Max, bound)) => write!(f, "{} <= {bound}", self.name),
        }
    }
}

impl<V> Constraint<V> for BoundConstraint<V>
where
    V: Ord + fmt::Display + Send + Sync,
{
    fn check(&self, actual: &V) -> Vec<ConstraintViolation> {
        match &self.bound {
            Some((_, bound)) if !self.simple_check(actual) => vec![ConstraintViolation {
                constraint: self.to_string(),
                message: (self.message)(actual, bound),
            }],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn max(bound: u64) -> BoundConstraint<u64> {
        BoundConstraint::new("max_value", BoundType::Max, bound, |actual, bound| {
            format!("{actual} is above {bound}")
        })
    }

    fn min(bound: u64) -> BoundConstraint<u64> {
        BoundConstraint::new("min_value", BoundType::Min, bound, |actual, bound| {
            format!("{actual} is below {bound}")
        })
    }

    #[test]
    fn max_rejects_above_bound() {
        let c = max(10);
        assert!(c.check(&10).is_empty());
        let violations = c.check(&11);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "11 is above 10");
        assert_eq!(violations[0].constraint, "max_value <= 10");
    }

    #[test]
    fn min_rejects_below_bound() {
        let c = min(3);
        assert!(c.check(&3).is_empty());
        assert_eq!(c.check(&2)[0].message, "2 is below 3");
    }

    #[test]
    fn never_violated_accepts_everything() {
        let c = BoundConstraint::<u64>::never_violated("quota");
        assert!(c.bound().is_none());
        assert!(c.check(&u64::MAX).is_empty());
        assert_eq!(c.to_string(), "quota unbounded");
    }

    proptest! {
        /// A MAX bound B accepts v iff v <= B.
        #[test]
        fn max_bound_is_monotonic(bound in any::<u64>(), value in any::<u64>()) {
            prop_assert_eq!(max(bound).check(&value).is_empty(), value <= bound);
        }

        /// A MIN bound B accepts v iff v >= B.
        #[test]
        fn min_bound_is_monotonic(bound in any::<u64>(), value in any::<u64>()) {
            prop_assert_eq!(min(bound).check(&value).is_empty(), value >= bound);
        }
    }
}
