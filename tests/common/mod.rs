//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};

use edenframe::config::AppConfig;
use edenframe::controller::{action, ActionError, ActionFuture, Controller, ControllerRegistry, Outcome};
use edenframe::http::{Render, RenderError, RequestContext, Server, Uploads, ViewEngine};
use edenframe::observability::ErrorReporter;
use edenframe::routing::{RouteParams, RouteSet, RouteTable, RouteTableBuilder};

/// Reporter that remembers every error it was handed.
#[derive(Default)]
pub struct RecordingReporter {
    errors: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &(dyn std::error::Error + 'static)) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Renders `view|title`.
pub struct EchoEngine;

impl ViewEngine for EchoEngine {
    fn render(&self, view: &str, locals: &Value) -> Result<String, RenderError> {
        let title = locals.get("title").and_then(Value::as_str).unwrap_or("-");
        Ok(format!("{view}|{title}"))
    }
}

type Declare = Box<dyn Fn(&mut RouteSet) + Send + Sync>;

/// Controller with one action per behaviour under test.
pub struct Scripted {
    label: &'static str,
    calls: Arc<AtomicUsize>,
    declare: Declare,
}

impl Scripted {
    pub fn new<F>(label: &'static str, declare: F) -> Arc<Self>
    where
        F: Fn(&mut RouteSet) + Send + Sync + 'static,
    {
        Self::counted(label, Arc::new(AtomicUsize::new(0)), declare)
    }

    pub fn counted<F>(label: &'static str, calls: Arc<AtomicUsize>, declare: F) -> Arc<Self>
    where
        F: Fn(&mut RouteSet) + Send + Sync + 'static,
    {
        Arc::new(Self {
            label,
            calls,
            declare: Box::new(declare),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub const SCRIPTED_ACTIONS: &[&str] = &[
    "ok",
    "throw",
    "panic",
    "panic_sync",
    "next",
    "render",
    "render_explicit",
    "context",
    "params",
    "files",
];

impl Controller for Scripted {
    fn declare(&self, routes: &mut RouteSet) {
        (self.declare)(routes)
    }

    fn actions(&self) -> &'static [&'static str] {
        SCRIPTED_ACTIONS
    }

    fn invoke(self: Arc<Self>, name: &str, req: Request<Body>, render: Render) -> Option<ActionFuture> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = self.label;

        match name {
            "ok" => action(async move { Ok(Outcome::respond(format!("ok:{label}"))) }),
            "throw" => action(async { Err(ActionError::msg("boom")) }),
            "panic" => action(async {
                if true {
                    panic!("kaboom");
                }
                Ok(Outcome::Next)
            }),
            "panic_sync" => panic!("sync kaboom"),
            "next" => action(async { Ok(Outcome::Next) }),
            "render" => action(async move { Ok(Outcome::Respond(render.render(json!({}))?)) }),
            "render_explicit" => action(async move {
                Ok(Outcome::Respond(render.render(("explicit/view", json!({})))?))
            }),
            "context" => action(async move {
                let ctx = req.extensions().get::<RequestContext>().cloned();
                let delay = req
                    .uri()
                    .query()
                    .and_then(|q| q.strip_prefix("delay="))
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(delay)).await;

                let ctx = ctx.ok_or_else(|| ActionError::msg("no context"))?;
                Ok(Outcome::respond(format!(
                    "{}|{}|{}|{}",
                    ctx.path.unwrap_or_default(),
                    ctx.url,
                    ctx.is_json,
                    ctx.timer.route.is_some()
                )))
            }),
            "params" => action(async move {
                let id = req
                    .extensions()
                    .get::<RouteParams>()
                    .and_then(|p| p.get("id").map(str::to_string))
                    .unwrap_or_default();
                Ok(Outcome::respond(id))
            }),
            "files" => action(async move {
                let count = req.extensions().get::<Uploads>().map_or(0, |u| u.files.len());
                Ok(Outcome::respond(format!("files:{label}:{count}")))
            }),
            _ => None,
        }
    }
}

pub fn registry_of(controllers: Vec<(&'static str, i32, Arc<Scripted>)>) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    for (id, priority, controller) in controllers {
        registry.register_instance(id, priority, controller);
    }
    registry
}

/// Route table over `controllers` with the echo engine and `reporter`.
pub fn table_of(
    controllers: Vec<(&'static str, i32, Arc<Scripted>)>,
    reporter: Arc<RecordingReporter>,
) -> RouteTable {
    table_with(controllers, reporter, &AppConfig::default())
}

/// Route table whose upload segments write where `config` says.
pub fn table_with(
    controllers: Vec<(&'static str, i32, Arc<Scripted>)>,
    reporter: Arc<RecordingReporter>,
    config: &AppConfig,
) -> RouteTable {
    RouteTableBuilder::new(registry_of(controllers))
        .view_engine(Arc::new(EchoEngine))
        .reporter(reporter)
        .upload_config(config.upload.clone())
        .build()
        .expect("route table builds")
}

/// Configuration with no static directory and a temporary upload dir.
pub fn test_config(upload_dest: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.assets.static_dir = std::env::temp_dir()
        .join("edenframe-test-no-static")
        .to_string_lossy()
        .into_owned();
    config.upload.dest = upload_dest.to_string_lossy().into_owned();
    config.session.secret = "integration-test-secret".to_string();
    config
}

/// Full middleware stack around `table`.
pub fn app_of(table: RouteTable, config: AppConfig, reporter: Arc<RecordingReporter>) -> Router {
    Server::new(config, table).reporter(reporter).into_router()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
