//! Access-control decision interface.
//!
//! The decision function is an external collaborator: given the resolved
//! principal and a required capability it answers allow, deny or redirect.
//! [`CapabilityPolicy`] is the default, a plain capability-set lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Session key the authenticated principal is stored under.
pub const PRINCIPAL_KEY: &str = "user";

/// The authenticated user of a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Principal {
    pub id: String,

    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// True if any held capability grants `required`.
    ///
    /// `*` grants everything; `admin.*` grants `admin` and every
    /// capability below it.
    pub fn has(&self, required: &str) -> bool {
        self.capabilities.iter().any(|held| grants(held, required))
    }
}

fn grants(held: &str, required: &str) -> bool {
    if held == "*" || held == required {
        return true;
    }
    match held.strip_suffix(".*") {
        Some(scope) => {
            required == scope
                || required
                    .strip_prefix(scope)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
        None => false,
    }
}

/// Outcome of an access-control check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclDecision {
    Allow,
    Deny,
    /// Send the client elsewhere (e.g. the login page).
    Redirect(String),
}

/// Access-control lookup failure.
#[derive(Debug, thiserror::Error)]
#[error("access control check failed: {0}")]
pub struct AclError(pub String);

#[async_trait]
pub trait AccessControl: Send + Sync + 'static {
    async fn check(
        &self,
        principal: Option<&Principal>,
        required: &str,
    ) -> Result<AclDecision, AclError>;
}

/// Allow when the principal holds the capability, deny otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityPolicy;

#[async_trait]
impl AccessControl for CapabilityPolicy {
    async fn check(
        &self,
        principal: Option<&Principal>,
        required: &str,
    ) -> Result<AclDecision, AclError> {
        Ok(match principal {
            Some(principal) if principal.has(required) => AclDecision::Allow,
            _ => AclDecision::Deny,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_matching() {
        let admin = Principal::new("1").with_capability("admin.*");
        assert!(admin.has("admin"));
        assert!(admin.has("admin.users.view"));
        assert!(!admin.has("administrator"));
        assert!(!admin.has("billing.view"));

        let root = Principal::new("0").with_capability("*");
        assert!(root.has("anything.at.all"));

        let viewer = Principal::new("2").with_capability("admin.users.view");
        assert!(viewer.has("admin.users.view"));
        assert!(!viewer.has("admin.users.update"));
    }

    #[tokio::test]
    async fn test_capability_policy() {
        let viewer = Principal::new("2").with_capability("admin.users.view");

        let allowed = CapabilityPolicy.check(Some(&viewer), "admin.users.view").await.unwrap();
        assert_eq!(allowed, AclDecision::Allow);

        let anonymous = CapabilityPolicy.check(None, "admin.users.view").await.unwrap();
        assert_eq!(anonymous, AclDecision::Deny);
    }
}
