//! Authorization gate.
//!
//! # State machine (one step per request)
//! ```text
//! no capability required ─────────────────────────▶ Allow
//! policy allows ──────────────────────────────────▶ Allow
//! policy redirects, or denies with a fail target ─▶ Redirected(response)
//! policy denies ──────────────────────────────────▶ DenySilent
//! policy errors ──────────────────────────────────▶ Err (caller denies)
//! ```
//!
//! `DenySilent` never writes a response: the request falls through to the
//! not-found page so protected routes are not revealed. The numeric codes
//! `0 = deny-silent`, `1 = allow`, `2 = handled` are kept for hooks that
//! speak them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use crate::http::session::Session;
use crate::routing::RouteDescriptor;
use crate::security::access_control::{
    AccessControl, AclDecision, AclError, CapabilityPolicy, Principal, PRINCIPAL_KEY,
};

/// Outcome of evaluating a request against a route's requirement.
#[derive(Debug)]
pub enum Verdict {
    /// Continue to the controller action.
    Allow,
    /// Fall through without writing anything.
    DenySilent,
    /// The gate produced the response; stop dispatch.
    Redirected(Response),
}

impl Verdict {
    pub const DENY_SILENT: u8 = 0;
    pub const ALLOW: u8 = 1;
    pub const REDIRECTED: u8 = 2;

    pub fn code(&self) -> u8 {
        match self {
            Verdict::DenySilent => Self::DENY_SILENT,
            Verdict::Allow => Self::ALLOW,
            Verdict::Redirected(_) => Self::REDIRECTED,
        }
    }

    /// Decode a numeric verdict.
    ///
    /// `2` needs the response the hook already produced.
    pub fn from_code(code: u8, response: Option<Response>) -> Result<Self, GateError> {
        match (code, response) {
            (Self::DENY_SILENT, _) => Ok(Verdict::DenySilent),
            (Self::ALLOW, _) => Ok(Verdict::Allow),
            (Self::REDIRECTED, Some(response)) => Ok(Verdict::Redirected(response)),
            (Self::REDIRECTED, None) => Err(GateError::MissingResponse),
            (other, _) => Err(GateError::UnrecognizedVerdict(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Policy(#[from] AclError),

    #[error("unrecognized authorization verdict {0}")]
    UnrecognizedVerdict(u8),

    #[error("authorization hook reported a handled request without a response")]
    MissingResponse,
}

impl GateError {
    /// Configuration errors are distinct from ordinary policy failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, GateError::UnrecognizedVerdict(_) | GateError::MissingResponse)
    }
}

/// Decides whether a request may reach its controller action.
#[async_trait]
pub trait Gate: Send + Sync + 'static {
    async fn evaluate(&self, parts: &Parts, route: &RouteDescriptor) -> Result<Verdict, GateError>;
}

/// Gate backed by an [`AccessControl`] policy and the session principal.
#[derive(Clone)]
pub struct AuthorizationGate {
    policy: Arc<dyn AccessControl>,
}

impl AuthorizationGate {
    pub fn new(policy: Arc<dyn AccessControl>) -> Self {
        Self { policy }
    }
}

impl Default for AuthorizationGate {
    fn default() -> Self {
        Self::new(Arc::new(CapabilityPolicy))
    }
}

#[async_trait]
impl Gate for AuthorizationGate {
    async fn evaluate(&self, parts: &Parts, route: &RouteDescriptor) -> Result<Verdict, GateError> {
        let Some(required) = route.capability.as_deref() else {
            return Ok(Verdict::Allow);
        };

        let principal = parts
            .extensions
            .get::<Session>()
            .and_then(|session| session.get::<Principal>(PRINCIPAL_KEY));

        let decision = self.policy.check(principal.as_ref(), required).await?;

        Ok(match decision {
            AclDecision::Allow => Verdict::Allow,
            AclDecision::Redirect(location) => redirect(&location),
            AclDecision::Deny => match route.fail.as_deref() {
                Some(location) => redirect(location),
                None => Verdict::DenySilent,
            },
        })
    }
}

fn redirect(location: &str) -> Verdict {
    Verdict::Redirected(Redirect::to(location).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Verb;
    use axum::{body::Body, http::{header, Request, StatusCode}};

    fn parts_with(principal: Option<Principal>) -> Parts {
        let (mut parts, _) = Request::builder().uri("/admin").body(Body::empty()).unwrap().into_parts();
        let session = Session::new("test-session");
        if let Some(principal) = principal {
            session.insert(PRINCIPAL_KEY, &principal).unwrap();
        }
        parts.extensions.insert(session);
        parts
    }

    fn protected() -> RouteDescriptor {
        let mut route = RouteDescriptor::new(Verb::Get, "/admin", "admin", "index");
        route.capability("admin.view");
        route
    }

    #[tokio::test]
    async fn test_public_route_allows() {
        let route = RouteDescriptor::new(Verb::Get, "/", "home", "index");
        let verdict = AuthorizationGate::default().evaluate(&parts_with(None), &route).await.unwrap();
        assert_eq!(verdict.code(), Verdict::ALLOW);
    }

    #[tokio::test]
    async fn test_holder_allowed() {
        let principal = Principal::new("1").with_capability("admin.view");
        let verdict = AuthorizationGate::default()
            .evaluate(&parts_with(Some(principal)), &protected())
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Allow));
    }

    #[tokio::test]
    async fn test_denied_without_fail_is_silent() {
        let verdict = AuthorizationGate::default()
            .evaluate(&parts_with(None), &protected())
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::DenySilent));
    }

    #[tokio::test]
    async fn test_denied_with_fail_redirects() {
        let mut route = protected();
        route.fail("/login");

        let verdict = AuthorizationGate::default().evaluate(&parts_with(None), &route).await.unwrap();
        match verdict {
            Verdict::Redirected(response) => {
                assert_eq!(response.status(), StatusCode::SEE_OTHER);
                assert_eq!(response.headers()[header::LOCATION], "/login");
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_codes() {
        assert!(matches!(Verdict::from_code(0, None), Ok(Verdict::DenySilent)));
        assert!(matches!(Verdict::from_code(1, None), Ok(Verdict::Allow)));
        assert!(matches!(Verdict::from_code(2, None), Err(GateError::MissingResponse)));
        assert!(matches!(
            Verdict::from_code(2, Some(Redirect::to("/").into_response())),
            Ok(Verdict::Redirected(_))
        ));
        match Verdict::from_code(7, None) {
            Err(e) => assert!(e.is_configuration()),
            Ok(v) => panic!("unexpected verdict {v:?}"),
        }
    }
}
