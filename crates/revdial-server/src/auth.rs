//! Upgrade-time authorization

use async_trait::async_trait;
use revdial_transport::upgrade::UpgradeRequest;
use thiserror::Error;

/// Header carrying the client key under the default scheme.
pub const TUNNEL_ID_HEADER: &str = "tunnel-id";

/// Authorizer failure. The message becomes the body of the 400 answer.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AuthError(pub String);

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Attach the session under this client key.
    Allow { client_key: String },
    /// Answer 401 and create no session.
    Deny,
}

/// Decides whether an upgrade request may become a session, and under
/// which client key.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, request: &UpgradeRequest) -> Result<AuthDecision, AuthError>;
}

/// Default scheme: accept iff a single header names a non-empty client key.
#[derive(Debug)]
pub struct HeaderAuthorizer {
    header: String,
}

impl HeaderAuthorizer {
    pub fn new() -> Self {
        Self {
            header: TUNNEL_ID_HEADER.to_string(),
        }
    }

    pub fn with_header(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for HeaderAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authorizer for HeaderAuthorizer {
    async fn authorize(&self, request: &UpgradeRequest) -> Result<AuthDecision, AuthError> {
        match request.header(&self.header) {
            Some(id) if !id.is_empty() => Ok(AuthDecision::Allow {
                client_key: id.to_string(),
            }),
            _ => Ok(AuthDecision::Deny),
        }
    }
}
