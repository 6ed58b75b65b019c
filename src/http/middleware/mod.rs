//! Process-wide middleware that is not tied to a subsystem.

pub mod body;

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

pub use body::{parse_body, BodyParser, ParsedBody};

pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Adds `X-Response-Time: <ms>ms` to every response.
pub async fn response_time(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms:.3}ms")) {
        response.headers_mut().insert(X_RESPONSE_TIME, value);
    }
    response
}

/// Open CORS for everything under `/api/`.
pub async fn api_cors(req: Request<Body>, next: Next) -> Response {
    let is_api = req.uri().path().starts_with("/api/");
    let mut response = next.run(req).await;

    if is_api {
        let headers = response.headers_mut();
        headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        headers.insert(
            "access-control-allow-headers",
            HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept"),
        );
    }
    response
}
