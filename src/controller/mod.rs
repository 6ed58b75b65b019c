//! Controllers and the controller registry.
//!
//! # Data Flow
//! ```text
//! ControllerRegistry (id, priority, factory) entries
//!     → classes hook (may add/remove/reorder entries)
//!     → sort by priority (stable)
//!     → factory() → Controller::declare(RouteSet) → route descriptors
//!     → Controllers (id → hot-swappable instance)
//!
//! Dispatch (per request):
//!     Controllers::get(id) → Controller::invoke(action, req, render)
//!     → ActionFuture → Outcome
//! ```
//!
//! # Design Decisions
//! - Controllers are looked up by id at dispatch time, never held by a
//!   compiled route, so `Controllers::replace` needs no recompilation
//! - Actions are named; a controller lists the names it can dispatch and
//!   the route table refuses to build if a route names an unknown one

pub mod registry;

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;

use crate::http::render::{Render, RenderError};
use crate::http::session::SessionError;
use crate::routing::RouteSet;

pub use registry::{BoxError, ControllerEntry, ControllerRegistry, Controllers};

/// Running action.
pub type ActionFuture = BoxFuture<'static, Result<Outcome, ActionError>>;

/// What an action did with the request.
#[derive(Debug)]
pub enum Outcome {
    /// The action answered.
    Respond(Response),
    /// The action passed; the request ends at the not-found page.
    Next,
}

impl Outcome {
    pub fn respond(response: impl IntoResponse) -> Self {
        Outcome::Respond(response.into_response())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Failed(String),

    #[error("action panicked: {0}")]
    Panicked(String),

    #[error("controller `{0}` is not registered")]
    UnknownController(String),

    #[error("controller `{controller}` has no action `{action}`")]
    UnknownAction { controller: String, action: String },
}

impl ActionError {
    pub fn msg(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }
}

/// A set of named actions plus the routes that reach them.
pub trait Controller: Send + Sync + 'static {
    /// Declare this controller's routes and their defaults.
    fn declare(&self, routes: &mut RouteSet);

    /// Names of the actions [`Controller::invoke`] can dispatch.
    fn actions(&self) -> &'static [&'static str];

    /// Start `action`, or `None` if this controller has no such action.
    fn invoke(
        self: Arc<Self>,
        action: &str,
        req: Request<Body>,
        render: Render,
    ) -> Option<ActionFuture>;

    fn has_action(&self, action: &str) -> bool {
        self.actions().contains(&action)
    }
}

/// Box an action body for [`Controller::invoke`].
pub fn action<F>(future: F) -> Option<ActionFuture>
where
    F: Future<Output = Result<Outcome, ActionError>> + Send + 'static,
{
    Some(Box::pin(future))
}
