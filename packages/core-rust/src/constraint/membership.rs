use std::collections::BTreeSet;
use std::fmt;

use super::{Constraint, ConstraintViolation};

/// Containment mode of a membership constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// The value must belong to the set. An empty set accepts every value.
    In,
    /// The value must not belong to the set.
    NotIn,
}

/// Rights-style constraint checking a value against a set.
///
/// An empty set satisfies [`Containment::In`]: "no values configured" means
/// "unrestricted", matching how rights bindings treat an empty dataset list.
/// This is easy to misread as "nothing allowed"; callers that need a
/// deny-all rule must express it with [`Containment::NotIn`] or by not
/// creating the binding at all.
pub struct MembershipConstraint<V> {
    name: &'static str,
    mode: Containment,
    values: BTreeSet<V>,
    message: fn(&V, &BTreeSet<V>) -> String,
}

impl<V> MembershipConstraint<V>
where
    V: Ord + fmt::Display,
{
    /// Creates a membership constraint. `message` receives `(actual, values)`.
    pub fn new(
        name: &'static str,
        mode: Containment,
        values: BTreeSet<V>,
        message: fn(&V, &BTreeSet<V>) -> String,
    ) -> Self {
        Self {
            name,
            mode,
            values,
            message,
        }
    }

    /// Returns `true` when `actual` satisfies the containment mode.
    pub fn simple_check(&self, actual: &V) -> bool {
        match self.mode {
            Containment::In => self.values.is_empty() || self.values.contains(actual),
            Containment::NotIn => !self.values.contains(actual),
        }
    }

    #[must_use]
    pub fn mode(&self) -> Containment {
        self.mode
    }

    #[must_use]
    pub fn values(&self) -> &BTreeSet<V> {
        &self.values
    }
}

impl<V> fmt::Display for MembershipConstraint<V>
where
    V: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.mode {
            Containment::In => "in",
            Containment::NotIn => "not in",
        };
        write!(f, "{} {op} {}", self.name, join(&self.values))
    }
}

impl<V> Constraint<V> for MembershipConstraint<V>
where
    V: Ord + fmt::Display + Send + Sync,
{
    fn check(&self, actual: &V) -> Vec<ConstraintViolation> {
        if self.simple_check(actual) {
            Vec::new()
        } else {
            vec![ConstraintViolation {
                constraint: self.to_string(),
                message: (self.message)(actual, &self.values),
            }]
        }
    }
}

fn join<V: fmt::Display>(values: &BTreeSet<V>) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

/// Tenants allowed to use a process. Empty means any tenant.
#[must_use]
pub fn allowed_tenants(tenants: BTreeSet<String>) -> MembershipConstraint<String> {
    MembershipConstraint::new("allowed_tenants", Containment::In, tenants, |actual, values| {
        format!(
            "the tenant '{actual}' is absent from the configured allowed tenants {}",
            join(values)
        )
    })
}

/// Datasets a process may take input from. Empty means any dataset.
#[must_use]
pub fn allowed_datasets(datasets: BTreeSet<String>) -> MembershipConstraint<String> {
    MembershipConstraint::new(
        "allowed_datasets",
        Containment::In,
        datasets,
        |actual, values| {
            format!(
                "the dataset '{actual}' is absent from the configured allowed datasets {}",
                join(values)
            )
        },
    )
}

/// Roles allowed to submit to a process. Empty means any role.
#[must_use]
pub fn allowed_user_roles(roles: BTreeSet<String>) -> MembershipConstraint<String> {
    MembershipConstraint::new(
        "allowed_user_roles",
        Containment::In,
        roles,
        |actual, values| {
            format!(
                "the user role '{actual}' is absent from the configured allowed roles {}",
                join(values)
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn in_accepts_members_only() {
        let c = allowed_datasets(set(&["D1", "D2"]));
        assert!(c.check(&"D1".to_string()).is_empty());
        let violations = c.check(&"D3".to_string());
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].message,
            "the dataset 'D3' is absent from the configured allowed datasets [D1, D2]"
        );
        assert_eq!(violations[0].constraint, "allowed_datasets in [D1, D2]");
    }

    #[test]
    fn not_in_rejects_members() {
        let c = MembershipConstraint::new(
            "forbidden_roles",
            Containment::NotIn,
            set(&["PUBLIC"]),
            |actual, _| format!("role {actual} is forbidden"),
        );
        assert!(c.check(&"ADMIN".to_string()).is_empty());
        assert_eq!(c.check(&"PUBLIC".to_string())[0].message, "role PUBLIC is forbidden");
    }

    #[test]
    fn empty_not_in_accepts_everything() {
        let c = MembershipConstraint::new(
            "forbidden",
            Containment::NotIn,
            BTreeSet::<String>::new(),
            |_, _| String::new(),
        );
        assert!(c.check(&"anything".to_string()).is_empty());
    }

    #[test]
    fn messages_name_the_offending_value() {
        let tenants = allowed_tenants(set(&["p1"]));
        assert!(tenants.check(&"p2".to_string())[0].message.contains("'p2'"));
        let roles = allowed_user_roles(set(&["ADMIN"]));
        assert!(roles.check(&"PUBLIC".to_string())[0]
            .message
            .contains("'PUBLIC'"));
    }

    proptest! {
        /// An empty allowed set is unrestricted for IN checks.
        #[test]
        fn empty_set_is_unrestricted(value in ".*") {
            prop_assert!(allowed_datasets(BTreeSet::new()).check(&value).is_empty());
            prop_assert!(allowed_tenants(BTreeSet::new()).check(&value).is_empty());
            prop_assert!(allowed_user_roles(BTreeSet::new()).check(&value).is_empty());
        }
    }
}
