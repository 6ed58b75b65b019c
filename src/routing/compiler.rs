//! Route compilation.
//!
//! # Responsibilities
//! - Turn one [`RouteDescriptor`] into a [`CompiledRoute`]
//! - Assemble the fixed segment order: hook extras, timing marker, upload
//!   (POST with a policy only), dispatch
//! - Contain controller failures at the dispatch boundary
//!
//! # Dispatch segment
//! ```text
//! publish path + descriptor (+ title) on the request context
//!     → Gate::evaluate
//!         DenySilent      → Next (nothing written)
//!         Redirected(r)   → Respond(r), controller never runs
//!         Err             → report, Next
//!         Allow           ↓
//!     → Controllers::get(id) (lazy, hot-swappable)
//!     → invoke action with a per-request Render
//!         Ok(Respond)     → Respond
//!         Ok(Next)        → NotFound
//!         Err / panic     → report once, NotFound
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
};
use futures_util::FutureExt;

use crate::controller::{ActionError, Controllers, Outcome};
use crate::http::context::RequestContext;
use crate::http::render::{Render, ViewEngine};
use crate::http::upload::UploadResolver;
use crate::observability::ErrorReporter;
use crate::routing::descriptor::RouteDescriptor;
use crate::routing::matcher::{RouteMatcher, RouteParams};
use crate::routing::segment::{Flow, Segment};
use crate::security::gate::{Gate, Verdict};

/// Per-route hook: extra segments run before the timing marker.
pub type RouteHook = Arc<dyn Fn(&RouteDescriptor) -> Vec<Arc<dyn Segment>> + Send + Sync>;

/// A descriptor bound to its segment chain.
///
/// Immutable once built.
pub struct CompiledRoute {
    descriptor: Arc<RouteDescriptor>,
    path: String,
    matcher: RouteMatcher,
    segments: Vec<Arc<dyn Segment>>,
}

impl CompiledRoute {
    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    /// Registered path (`mount + path`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names of the chain segments, in order.
    pub fn segment_names(&self) -> Vec<&'static str> {
        self.segments.iter().map(|s| s.name()).collect()
    }

    pub fn matches(&self, method: &Method, path: &str) -> Option<RouteParams> {
        self.matcher.matches(method, path)
    }

    /// Run the chain until a segment leaves it.
    pub async fn run(&self, mut req: Request<Body>) -> Flow {
        for segment in &self.segments {
            match segment.call(req).await {
                Flow::Continue(next) => req = next,
                other => return other,
            }
        }
        Flow::Next(req)
    }
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("verb", &self.descriptor.verb)
            .field("path", &self.path)
            .field("segments", &self.segment_names())
            .finish()
    }
}

/// Records when the request reached its route.
pub struct TimingSegment;

#[async_trait]
impl Segment for TimingSegment {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn call(&self, mut req: Request<Body>) -> Flow {
        RequestContext::update(&mut req, |ctx| ctx.timer.route = Some(Instant::now()));
        Flow::Continue(req)
    }
}

/// Gate check plus controller invocation.
pub struct DispatchSegment {
    route: Arc<RouteDescriptor>,
    path: String,
    gate: Arc<dyn Gate>,
    controllers: Arc<Controllers>,
    engine: Arc<dyn ViewEngine>,
    reporter: Arc<dyn ErrorReporter>,
}

impl DispatchSegment {
    fn fall_through(&self, error: ActionError, req: Request<Body>) -> Flow {
        self.reporter.report(&error);
        Flow::Next(req)
    }
}

#[async_trait]
impl Segment for DispatchSegment {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn call(&self, mut req: Request<Body>) -> Flow {
        let ctx = RequestContext::update(&mut req, |ctx| {
            ctx.path = Some(self.path.clone());
            ctx.route = Some(Arc::clone(&self.route));
            if let Some(title) = &self.route.title {
                ctx.title = Some(title.clone());
            }
            ctx.clone()
        });

        let (parts, body) = req.into_parts();
        let verdict = self.gate.evaluate(&parts, &self.route).await;
        let req = Request::from_parts(parts, body);

        match verdict {
            Ok(Verdict::Allow) => {}
            Ok(Verdict::DenySilent) => {
                tracing::debug!(path = %self.path, "Access denied, falling through");
                return Flow::Next(req);
            }
            Ok(Verdict::Redirected(response)) => return Flow::Respond(response),
            Err(e) => {
                self.reporter.report(&e);
                return Flow::Next(req);
            }
        }

        let Some(controller) = self.controllers.get(&self.route.controller) else {
            return self.fall_through(ActionError::UnknownController(self.route.controller.clone()), req);
        };
        if !controller.has_action(&self.route.action) {
            return self.fall_through(
                ActionError::UnknownAction {
                    controller: self.route.controller.clone(),
                    action: self.route.action.clone(),
                },
                req,
            );
        }

        let render = Render::new(Arc::clone(&self.engine), &ctx)
            .with_default_view(self.route.view.clone())
            .with_layout(self.route.layout.clone());

        let action = self.route.action.as_str();
        let started = std::panic::catch_unwind(AssertUnwindSafe(|| controller.invoke(action, req, render)));

        let result = match started {
            Ok(Some(future)) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ActionError::Panicked(panic_message(&*panic)))),
            Ok(None) => Err(ActionError::UnknownAction {
                controller: self.route.controller.clone(),
                action: self.route.action.clone(),
            }),
            Err(panic) => Err(ActionError::Panicked(panic_message(&*panic))),
        };

        match result {
            Ok(Outcome::Respond(response)) => Flow::Respond(response),
            Ok(Outcome::Next) => Flow::NotFound(ctx),
            Err(e) => {
                self.reporter.report(&e);
                Flow::NotFound(ctx)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builds compiled routes that share one gate, view engine and reporter.
pub struct RouteCompiler {
    pub(crate) gate: Arc<dyn Gate>,
    pub(crate) controllers: Arc<Controllers>,
    pub(crate) engine: Arc<dyn ViewEngine>,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    pub(crate) uploads: UploadResolver,
    pub(crate) hook: Option<RouteHook>,
}

impl RouteCompiler {
    pub fn compile(&self, descriptor: RouteDescriptor) -> CompiledRoute {
        let descriptor = Arc::new(descriptor);
        let path = descriptor.full_path();

        let mut segments: Vec<Arc<dyn Segment>> = match &self.hook {
            Some(hook) => hook(&descriptor),
            None => Vec::new(),
        };
        segments.push(Arc::new(TimingSegment));
        if let Some(upload) = self.uploads.resolve(&descriptor) {
            segments.push(Arc::new(upload));
        }
        segments.push(Arc::new(DispatchSegment {
            route: Arc::clone(&descriptor),
            path: path.clone(),
            gate: Arc::clone(&self.gate),
            controllers: Arc::clone(&self.controllers),
            engine: Arc::clone(&self.engine),
            reporter: Arc::clone(&self.reporter),
        }));

        CompiledRoute {
            matcher: RouteMatcher::new(descriptor.verb, &path),
            descriptor,
            path,
            segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[tokio::test]
    async fn test_timing_marks_route_reached() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let Flow::Continue(req) = TimingSegment.call(req).await else {
            panic!("timing must continue");
        };
        let ctx = req.extensions().get::<RequestContext>().unwrap();
        assert!(ctx.timer.route.is_some());
        assert!(ctx.timer.route.unwrap() >= ctx.timer.start);
    }
}
