//! Role authorizers: a client for the remote role service and a static
//! hierarchy for single-node runs and tests.

use async_trait::async_trait;
use processing_core::AuthToken;

use crate::traits::RoleAuthorizer;

// ---------------------------------------------------------------------------
// HttpRoleAuthorizer
// ---------------------------------------------------------------------------

/// Asks the remote role service whether one role includes another.
///
/// Issues `GET {base_url}/roles/include/{required}?role={candidate}` with the
/// caller's bearer token and expects a JSON boolean.
pub struct HttpRoleAuthorizer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRoleAuthorizer {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

#[async_trait]
impl RoleAuthorizer for HttpRoleAuthorizer {
    async fn is_role_under(
        &self,
        candidate: &str,
        required: &str,
        token: &AuthToken,
    ) -> anyhow::Result<bool> {
        let allowed = self
            .client
            .get(format!("{}/roles/include/{required}", self.base_url))
            .query(&[("role", candidate)])
            .bearer_auth(token.expose())
            .send()
            .await?
            .error_for_status()?
            .json::<bool>()
            .await?;
        Ok(allowed)
    }
}

// ---------------------------------------------------------------------------
// StaticRoleHierarchy
// ---------------------------------------------------------------------------

/// Role hierarchy fixed at construction, lowest role first.
///
/// A candidate is under-or-equal to a required role when it sits at the same
/// level or above. Unknown roles are never allowed.
#[derive(Debug, Clone)]
pub struct StaticRoleHierarchy {
    roles: Vec<String>,
}

impl StaticRoleHierarchy {
    /// The built-in ladder:
    /// `PUBLIC < REGISTERED_USER < EXPLOIT < ADMIN < PROJECT_ADMIN < INSTANCE_ADMIN`.
    pub const DEFAULT_ROLES: [&'static str; 6] = [
        "PUBLIC",
        "REGISTERED_USER",
        "EXPLOIT",
        "ADMIN",
        "PROJECT_ADMIN",
        "INSTANCE_ADMIN",
    ];

    #[must_use]
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    fn level(&self, role: &str) -> Option<usize> {
        self.roles.iter().position(|r| r == role)
    }

    /// Synchronous form of [`RoleAuthorizer::is_role_under`].
    #[must_use]
    pub fn includes(&self, candidate: &str, required: &str) -> bool {
        match (self.level(candidate), self.level(required)) {
            (Some(c), Some(r)) => c >= r,
            _ => false,
        }
    }
}

impl Default for StaticRoleHierarchy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROLES)
    }
}

#[async_trait]
impl RoleAuthorizer for StaticRoleHierarchy {
    async fn is_role_under(
        &self,
        candidate: &str,
        required: &str,
        _token: &AuthToken,
    ) -> anyhow::Result<bool> {
        Ok(self.includes(candidate, required))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn static_hierarchy_orders_roles() {
        let roles = StaticRoleHierarchy::default();
        assert!(roles.includes("ADMIN", "EXPLOIT"));
        assert!(roles.includes("EXPLOIT", "EXPLOIT"));
        assert!(!roles.includes("REGISTERED_USER", "EXPLOIT"));
        assert!(!roles.includes("SUPERUSER", "PUBLIC"));
        assert!(!roles.includes("ADMIN", "UNKNOWN"));
    }

    /// Serves one HTTP request with `body` and returns the raw request head.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base_url, handle)
    }

    #[tokio::test]
    async fn http_authorizer_sends_role_query_with_bearer_token() {
        let (base_url, server) = serve_once("200 OK", "true").await;
        let authorizer = HttpRoleAuthorizer::new(format!("{base_url}/"));

        let allowed = authorizer
            .is_role_under("ADMIN", "EXPLOIT", &AuthToken::new("secret"))
            .await
            .unwrap();
        assert!(allowed);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /roles/include/EXPLOIT?role=ADMIN HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn http_authorizer_surfaces_error_status() {
        let (base_url, server) = serve_once("503 Service Unavailable", "false").await;
        let authorizer = HttpRoleAuthorizer::new(base_url);

        let result = authorizer
            .is_role_under("ADMIN", "EXPLOIT", &AuthToken::new("t"))
            .await;
        assert!(result.is_err());
        server.await.unwrap();
    }
}
