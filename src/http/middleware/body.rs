//! Body parsing middleware.
//! Buffers JSON and URL-encoded bodies up to the configured limit.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::http::context::RequestContext;
use crate::http::render::ErrorPages;

/// Decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

impl ParsedBody {
    /// First string value of `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            ParsedBody::Json(value) => value.get(name).and_then(Value::as_str),
            ParsedBody::Form(pairs) => pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Json,
    Form,
}

fn kind(req: &Request<Body>) -> Option<Kind> {
    let content_type = req.headers().get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json") {
        Some(Kind::Json)
    } else if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Some(Kind::Form)
    } else {
        None
    }
}

/// State of the body parser.
#[derive(Clone)]
pub struct BodyParser {
    pub limit_bytes: usize,
    pub pages: ErrorPages,
}

pub async fn parse_body(
    State(parser): State<Arc<BodyParser>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(kind) = kind(&req) else {
        return next.run(req).await;
    };
    let ctx = RequestContext::of(&req);
    let (mut parts, body) = req.into_parts();

    // 1. Buffer up to the limit
    let bytes = match axum::body::to_bytes(body, parser.limit_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = parser.limit_bytes, "Request body rejected");
            return parser
                .pages
                .error(&ctx, StatusCode::PAYLOAD_TOO_LARGE, "request entity too large");
        }
    };

    // 2. Decode
    if !bytes.is_empty() {
        let parsed = match kind {
            Kind::Json => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => ParsedBody::Json(value),
                Err(e) => {
                    tracing::debug!(error = %e, "Malformed JSON body");
                    return parser.pages.error(&ctx, StatusCode::BAD_REQUEST, "malformed JSON body");
                }
            },
            Kind::Form => ParsedBody::Form(url::form_urlencoded::parse(&bytes).into_owned().collect()),
        };
        parts.extensions.insert(parsed);
    }

    // 3. Hand the raw bytes back for extractors further down
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
