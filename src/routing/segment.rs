//! Chain segments.
//!
//! A compiled route is an ordered list of segments. Each segment takes the
//! request and says how the chain continues through a [`Flow`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;

use crate::http::context::RequestContext;

/// How a chain continues after one segment.
#[derive(Debug)]
pub enum Flow {
    /// Run the next segment of the same chain.
    Continue(Request<Body>),

    /// Leave this chain; try the next matching route.
    Next(Request<Body>),

    /// Write this response and stop.
    Respond(Response),

    /// Leave this chain after the request was consumed; only the not-found
    /// handler remains.
    NotFound(RequestContext),
}

/// One step of a compiled route.
#[async_trait]
pub trait Segment: Send + Sync + 'static {
    /// Short name used in logs and chain inspection.
    fn name(&self) -> &'static str;

    async fn call(&self, req: Request<Body>) -> Flow;
}

type SegmentFn = dyn Fn(Request<Body>) -> BoxFuture<'static, Flow> + Send + Sync;

/// Segment backed by a closure.
#[derive(Clone)]
pub struct FnSegment {
    name: &'static str,
    f: Arc<SegmentFn>,
}

impl FnSegment {
    pub fn new<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Flow> + Send + 'static,
    {
        Self {
            name,
            f: Arc::new(move |req| Box::pin(f(req))),
        }
    }
}

#[async_trait]
impl Segment for FnSegment {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn call(&self, req: Request<Body>) -> Flow {
        (self.f)(req).await
    }
}
