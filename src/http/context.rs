//! Per-request context and content negotiation.
//!
//! The negotiation middleware runs first for every request. It decides
//! whether the client prefers JSON, starts the request timer and stores a
//! fresh [`RequestContext`] in the request extensions. Route segments then
//! add the route-reached marker, the resolved path and the matched
//! descriptor. The context lives exactly as long as the request.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, Uri},
    middleware::Next,
    response::Response,
};

use crate::config::AssetConfig;
use crate::routing::RouteDescriptor;

/// Per-request timing markers.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    /// Request reached the server.
    pub start: Instant,

    /// Request reached its compiled route.
    pub route: Option<Instant>,
}

/// State owned by one request for its whole lifetime.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The client prefers `application/json`.
    pub is_json: bool,

    /// Original request URL (path and query).
    pub url: String,

    pub timer: Timer,

    /// Registered path of the matched route.
    pub path: Option<String>,

    /// Descriptor of the matched route.
    pub route: Option<Arc<RouteDescriptor>>,

    /// Page title applied before rendering.
    pub title: Option<String>,
}

impl RequestContext {
    pub fn detect(headers: &HeaderMap, uri: &Uri) -> Self {
        Self {
            is_json: prefers_json(headers),
            url: uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string()),
            timer: Timer {
                start: Instant::now(),
                route: None,
            },
            path: None,
            route: None,
            title: None,
        }
    }

    /// The context stored on `req`, or a freshly detected one.
    pub fn of(req: &Request<Body>) -> Self {
        req.extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| Self::detect(req.headers(), req.uri()))
    }

    /// Mutate the context stored on `req`, creating it if missing.
    pub fn update<R>(req: &mut Request<Body>, f: impl FnOnce(&mut RequestContext) -> R) -> R {
        let mut ctx = req
            .extensions_mut()
            .remove::<RequestContext>()
            .unwrap_or_else(|| Self::detect(req.headers(), req.uri()));
        let result = f(&mut ctx);
        req.extensions_mut().insert(ctx);
        result
    }
}

/// True when the `Accept` header asks for JSON.
pub fn prefers_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

/// Content negotiation middleware.
///
/// JSON clients get `Content-Type: application/json` on every response that
/// did not set one; everyone else gets a `Link` header preloading the
/// bundled assets.
pub async fn negotiate(
    State(assets): State<Arc<AssetConfig>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = RequestContext::detect(req.headers(), req.uri());
    let is_json = ctx.is_json;
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(header::HeaderName::from_static("x-powered-by"), HeaderValue::from_static("EdenFrame"));

    if is_json {
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
    } else if let Ok(link) = HeaderValue::from_str(&assets.preload_link()) {
        headers.insert(header::LINK, link);
    }

    response
}
