//! View rendering.
//!
//! The template engine is an external collaborator behind [`ViewEngine`].
//! Each request gets its own [`Render`] handle, built from the request
//! context and the matched route. When an action renders without naming a
//! view, the handle substitutes the route's default view. JSON clients get
//! the locals back as `{"opts": ...}` instead of a page.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::config::AssetConfig;
use crate::http::context::RequestContext;

/// Error produced while rendering a view.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render called without a view and the route has no default view")]
    MissingView,

    #[error("view `{view}` failed to render: {message}")]
    Engine { view: String, message: String },
}

/// Template engine contract.
pub trait ViewEngine: Send + Sync + 'static {
    fn render(&self, view: &str, locals: &Value) -> Result<String, RenderError>;
}

/// Arguments of a render call: an optional view name and the locals.
#[derive(Debug, Clone, Default)]
pub struct RenderArgs {
    pub view: Option<String>,
    pub locals: Value,
}

impl From<&str> for RenderArgs {
    fn from(view: &str) -> Self {
        Self {
            view: Some(view.to_string()),
            locals: Value::Object(Map::new()),
        }
    }
}

impl From<String> for RenderArgs {
    fn from(view: String) -> Self {
        Self {
            view: Some(view),
            locals: Value::Object(Map::new()),
        }
    }
}

impl From<Value> for RenderArgs {
    fn from(locals: Value) -> Self {
        Self { view: None, locals }
    }
}

impl From<(&str, Value)> for RenderArgs {
    fn from((view, locals): (&str, Value)) -> Self {
        Self {
            view: Some(view.to_string()),
            locals,
        }
    }
}

impl From<(String, Value)> for RenderArgs {
    fn from((view, locals): (String, Value)) -> Self {
        Self {
            view: Some(view),
            locals,
        }
    }
}

/// Per-request render handle.
#[derive(Clone)]
pub struct Render {
    engine: Arc<dyn ViewEngine>,
    default_view: Option<String>,
    layout: Option<String>,
    is_json: bool,
    title: Option<String>,
    url: String,
    route: Option<String>,
    reached: Option<Instant>,
}

impl Render {
    pub fn new(engine: Arc<dyn ViewEngine>, ctx: &RequestContext) -> Self {
        Self {
            engine,
            default_view: None,
            layout: None,
            is_json: ctx.is_json,
            title: ctx.title.clone(),
            url: ctx.url.clone(),
            route: ctx.path.clone(),
            reached: ctx.timer.route,
        }
    }

    pub fn with_default_view(mut self, view: Option<String>) -> Self {
        self.default_view = view;
        self
    }

    pub fn with_layout(mut self, layout: Option<String>) -> Self {
        self.layout = layout;
        self
    }

    /// The view a render call would use.
    pub fn resolve_view(&self, requested: Option<&str>) -> Option<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.default_view.clone())
    }

    pub fn is_json(&self) -> bool {
        self.is_json
    }

    /// Render with status `200 OK`.
    pub fn render(&self, args: impl Into<RenderArgs>) -> Result<Response, RenderError> {
        self.render_status(StatusCode::OK, args)
    }

    pub fn render_status(
        &self,
        status: StatusCode,
        args: impl Into<RenderArgs>,
    ) -> Result<Response, RenderError> {
        let args = args.into();
        let view = self
            .resolve_view(args.view.as_deref())
            .ok_or(RenderError::MissingView)?;
        let locals = self.locals(args.locals);

        if self.is_json {
            return Ok((status, Json(json!({ "opts": locals }))).into_response());
        }

        let page = self.engine.render(&view, &locals)?;

        if let Some(reached) = self.reached {
            tracing::debug!(
                route = self.route.as_deref().unwrap_or(&self.url),
                view = %view,
                elapsed_ms = reached.elapsed().as_millis() as u64,
                "Rendered"
            );
        }

        Ok((status, Html(page)).into_response())
    }

    fn locals(&self, locals: Value) -> Value {
        let mut map = match locals {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        if let Some(title) = &self.title {
            map.entry("title").or_insert_with(|| Value::String(title.clone()));
        }
        map.entry("url").or_insert_with(|| Value::String(self.url.clone()));
        if let Some(route) = &self.route {
            map.entry("route").or_insert_with(|| Value::String(route.clone()));
        }
        map.entry("layout").or_insert_with(|| {
            Value::String(self.layout.clone().unwrap_or_else(|| "main".to_string()))
        });

        Value::Object(map)
    }
}

/// Not-found and error pages.
#[derive(Clone)]
pub struct ErrorPages {
    engine: Arc<dyn ViewEngine>,
}

impl ErrorPages {
    pub fn new(engine: Arc<dyn ViewEngine>) -> Self {
        Self { engine }
    }

    pub fn not_found(&self, ctx: &RequestContext) -> Response {
        self.error(ctx, StatusCode::NOT_FOUND, "404 page not found")
    }

    /// Render the `error` view; falls back to plain text if the engine fails.
    pub fn error(&self, ctx: &RequestContext, status: StatusCode, message: &str) -> Response {
        let render = Render::new(self.engine.clone(), ctx);
        match render.render_status(status, ("error", json!({ "message": message }))) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, status = %status, "Error page failed to render");
                (status, message.to_string()).into_response()
            }
        }
    }
}

/// Minimal page shell: title, bundled assets and the serialised locals.
///
/// Used when no template engine is plugged in.
#[derive(Debug, Clone, Default)]
pub struct ShellEngine {
    assets: AssetConfig,
}

impl ShellEngine {
    pub fn new(assets: AssetConfig) -> Self {
        Self { assets }
    }
}

impl ViewEngine for ShellEngine {
    fn render(&self, view: &str, locals: &Value) -> Result<String, RenderError> {
        let mount = view.rsplit('/').next().unwrap_or(view).trim();
        let title = locals.get("title").and_then(Value::as_str).unwrap_or_default();
        let base = self.assets.cdn_url.as_deref().unwrap_or("/");
        let version = self
            .assets
            .version
            .as_deref()
            .map(|v| format!("?v={v}"))
            .unwrap_or_default();
        let state = serde_json::to_string(locals).map_err(|e| RenderError::Engine {
            view: view.to_string(),
            message: e.to_string(),
        })?;

        Ok(format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
             <link rel=\"stylesheet\" href=\"{base}public/css/app.min.css{version}\"></head>\
             <body><div data-page=\"{mount}-page\"></div>\
             <script>var edenState = {state};</script>\
             <script type=\"text/javascript\" src=\"{base}public/js/app.min.js{version}\"></script>\
             </body></html>"
        ))
    }
}
