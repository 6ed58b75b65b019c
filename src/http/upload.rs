//! Multipart upload handling.
//!
//! # Responsibilities
//! - Pick the upload strategy for a route from its declared policy
//! - Stream accepted files to the configured destination
//! - Reject unexpected fields and oversized files
//!
//! # Design Decisions
//! - Only POST routes with an upload policy get an upload segment
//! - Every resolved segment owns its own field acceptor; the shared
//!   configuration is never mutated
//! - Non-multipart bodies pass through untouched

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{multipart::MultipartError, FromRequest, Multipart},
    http::{header, Request, StatusCode},
};
use tokio::io::AsyncWriteExt;

use crate::config::UploadConfig;
use crate::http::context::RequestContext;
use crate::http::render::ErrorPages;
use crate::routing::descriptor::{FieldSpec, RouteDescriptor, UploadMode, Verb};
use crate::routing::segment::{Flow, Segment};

/// One file written to disk by an upload segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub path: PathBuf,
    pub size: usize,
}

/// Files and text fields of a multipart request.
#[derive(Debug, Clone, Default)]
pub struct Uploads {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl Uploads {
    pub fn files_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unexpected file field `{0}`")]
    UnexpectedField(String),

    #[error("file in field `{field}` exceeds the {limit} byte limit")]
    TooLarge { field: String, limit: usize },

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        UploadError::Multipart(e.body_text())
    }
}

/// Which file fields a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAcceptor {
    /// Any number of files under any of these names.
    Array(Vec<String>),
    /// One file under this name.
    Single(String),
    /// Per-field limits.
    Fields(Vec<FieldSpec>),
    /// Anything.
    Any,
}

impl FieldAcceptor {
    fn admit(&self, field: &str, seen: usize) -> Result<(), UploadError> {
        let accepted = match self {
            FieldAcceptor::Array(names) => names.iter().any(|n| n == field),
            FieldAcceptor::Single(name) => name == field && seen == 0,
            FieldAcceptor::Fields(specs) => specs
                .iter()
                .find(|spec| spec.name == field)
                .is_some_and(|spec| spec.max_count.map_or(true, |max| seen < max)),
            FieldAcceptor::Any => true,
        };

        if accepted {
            Ok(())
        } else {
            Err(UploadError::UnexpectedField(field.to_string()))
        }
    }
}

/// Builds upload segments from route descriptors.
#[derive(Clone)]
pub struct UploadResolver {
    config: Arc<UploadConfig>,
    pages: ErrorPages,
}

impl UploadResolver {
    pub fn new(config: UploadConfig, pages: ErrorPages) -> Self {
        Self {
            config: Arc::new(config),
            pages,
        }
    }

    /// The upload segment for `route`, if it takes uploads.
    pub fn resolve(&self, route: &RouteDescriptor) -> Option<UploadSegment> {
        if route.verb != Verb::Post {
            return None;
        }
        let policy = route.upload.as_ref()?;

        let acceptor = match policy.mode {
            UploadMode::Array => {
                FieldAcceptor::Array(policy.fields.iter().map(|f| f.name.clone()).collect())
            }
            UploadMode::Single => FieldAcceptor::Single(
                policy.fields.first().map(|f| f.name.clone()).unwrap_or_default(),
            ),
            UploadMode::Fields => FieldAcceptor::Fields(policy.fields.clone()),
            UploadMode::Any => FieldAcceptor::Any,
        };

        Some(UploadSegment {
            acceptor,
            config: Arc::clone(&self.config),
            pages: self.pages.clone(),
        })
    }
}

/// Chain segment that consumes a multipart body.
pub struct UploadSegment {
    acceptor: FieldAcceptor,
    config: Arc<UploadConfig>,
    pages: ErrorPages,
}

impl UploadSegment {
    pub fn acceptor(&self) -> &FieldAcceptor {
        &self.acceptor
    }

    /// Checks files an earlier route already received against this route's fields.
    fn readmit(&self, uploads: &Uploads) -> Result<(), UploadError> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for file in &uploads.files {
            let seen = counts.entry(file.field.as_str()).or_insert(0);
            self.acceptor.admit(&file.field, *seen)?;
            *seen += 1;
        }
        Ok(())
    }

    async fn receive(&self, mut multipart: Multipart, uploads: &mut Uploads) -> Result<(), UploadError> {
        let mut counts: HashMap<String, usize> = HashMap::new();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(original_name) = field.file_name().map(str::to_string) else {
                let text = field.text().await?;
                uploads.fields.insert(name, text);
                continue;
            };

            let seen = counts.get(&name).copied().unwrap_or(0);
            self.acceptor.admit(&name, seen)?;
            counts.insert(name.clone(), seen + 1);

            let path = PathBuf::from(&self.config.dest).join(uuid::Uuid::new_v4().simple().to_string());
            let content_type = field.content_type().map(str::to_string);
            // Record before writing so a failed write is still cleaned up.
            uploads.files.push(UploadedFile {
                field: name.clone(),
                original_name,
                content_type,
                path: path.clone(),
                size: 0,
            });

            let mut file = tokio::fs::File::create(&path).await?;
            let mut size = 0usize;
            while let Some(chunk) = field.chunk().await? {
                size += chunk.len();
                if size > self.config.limit_bytes {
                    return Err(UploadError::TooLarge {
                        field: name,
                        limit: self.config.limit_bytes,
                    });
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;

            if let Some(last) = uploads.files.last_mut() {
                last.size = size;
            }
        }

        Ok(())
    }
}

pub(crate) async fn discard(uploads: &[UploadedFile]) {
    for file in uploads {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::debug!(path = ?file.path, error = %e, "Could not remove partial upload");
        }
    }
}

fn is_multipart(req: &Request<Body>) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

#[async_trait]
impl Segment for UploadSegment {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn call(&self, mut req: Request<Body>) -> Flow {
        // Body already read by a route that fell through.
        match req.extensions().get::<Uploads>().map(|uploads| self.readmit(uploads)) {
            Some(Ok(())) => return Flow::Continue(req),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Upload rejected");
                if let Some(uploads) = req.extensions_mut().remove::<Uploads>() {
                    discard(&uploads.files).await;
                }
                let ctx = RequestContext::of(&req);
                return Flow::Respond(self.pages.error(&ctx, StatusCode::BAD_REQUEST, &e.to_string()));
            }
            None => {}
        }

        if !is_multipart(&req) {
            return Flow::Continue(req);
        }

        let ctx = RequestContext::of(&req);
        let (parts, body) = req.into_parts();

        let mut multipart_req = Request::new(body);
        *multipart_req.headers_mut() = parts.headers.clone();
        *multipart_req.extensions_mut() = parts.extensions.clone();

        let mut uploads = Uploads::default();
        let result = match Multipart::from_request(multipart_req, &()).await {
            Ok(multipart) => self.receive(multipart, &mut uploads).await,
            Err(rejection) => Err(UploadError::Multipart(rejection.body_text())),
        };

        match result {
            Ok(()) => {
                tracing::debug!(files = uploads.files.len(), fields = uploads.fields.len(), "Upload received");
                let mut req = Request::from_parts(parts, Body::empty());
                req.extensions_mut().insert(uploads);
                Flow::Continue(req)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upload rejected");
                discard(&uploads.files).await;
                Flow::Respond(self.pages.error(&ctx, StatusCode::BAD_REQUEST, &e.to_string()))
            }
        }
    }
}
