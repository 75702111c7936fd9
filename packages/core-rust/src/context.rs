use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque bearer credential forwarded to the remote authorization collaborator.
///
/// Threaded explicitly through every call that may reach a remote service
/// instead of living in a thread-local tenant context. `Debug` never prints
/// the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a raw bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for use in an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}
