//! Route table construction and dispatch.
//!
//! # Responsibilities
//! - Discover controllers and collect their route declarations
//! - Run the class and route hooks during the build phase only
//! - Order controllers and routes by descending priority (stable)
//! - Validate every route against the controllers before serving anything
//! - Dispatch requests through the compiled routes, first match wins
//!
//! # Design Decisions
//! - The table is frozen once built; only controller instances can change
//! - Any build failure aborts startup instead of serving a partial table
//! - A chain that falls through continues with the next matching route,
//!   then the not-found page

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};

use crate::config::UploadConfig;
use crate::controller::{BoxError, ControllerEntry, ControllerRegistry, Controllers};
use crate::http::context::RequestContext;
use crate::http::render::{ErrorPages, ShellEngine, ViewEngine};
use crate::http::upload::{discard, UploadResolver, Uploads};
use crate::observability::{ErrorReporter, TracingReporter};
use crate::routing::compiler::{CompiledRoute, RouteCompiler, RouteHook};
use crate::routing::descriptor::{RouteDescriptor, RouteSet, UploadMode, Verb};
use crate::routing::segment::{Flow, Segment};
use crate::security::gate::{AuthorizationGate, Gate};

type ClassesHook = Box<dyn FnOnce(&mut Vec<ControllerEntry>) -> Result<(), BoxError> + Send>;
type RoutesHook = Box<dyn FnOnce(&mut Vec<RouteDescriptor>) -> Result<(), BoxError> + Send>;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("controller hook failed: {0}")]
    ClassesHook(#[source] BoxError),

    #[error("route hook failed: {0}")]
    RoutesHook(#[source] BoxError),

    #[error("controller `{id}` could not be created: {source}")]
    Instantiate {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("controller `{0}` is registered more than once")]
    DuplicateController(String),

    #[error("route {verb} {path} names unknown controller `{controller}`")]
    UnknownController {
        verb: Verb,
        path: String,
        controller: String,
    },

    #[error("route {verb} {path} names unknown action `{controller}.{action}`")]
    UnknownAction {
        verb: Verb,
        path: String,
        controller: String,
        action: String,
    },

    #[error("route {verb} {path} declares a {mode:?} upload without fields")]
    UploadWithoutFields {
        verb: Verb,
        path: String,
        mode: UploadMode,
    },
}

/// Assembles a [`RouteTable`] from a controller registry.
pub struct RouteTableBuilder {
    registry: ControllerRegistry,
    classes_hook: Option<ClassesHook>,
    routes_hook: Option<RoutesHook>,
    route_hook: Option<RouteHook>,
    gate: Arc<dyn Gate>,
    engine: Arc<dyn ViewEngine>,
    reporter: Arc<dyn ErrorReporter>,
    upload: UploadConfig,
}

impl RouteTableBuilder {
    pub fn new(registry: ControllerRegistry) -> Self {
        Self {
            registry,
            classes_hook: None,
            routes_hook: None,
            route_hook: None,
            gate: Arc::new(AuthorizationGate::default()),
            engine: Arc::new(ShellEngine::default()),
            reporter: Arc::new(TracingReporter::new()),
            upload: UploadConfig::default(),
        }
    }

    /// Hook over the discovered controllers, run before any is created.
    pub fn on_classes<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Vec<ControllerEntry>) -> Result<(), BoxError> + Send + 'static,
    {
        self.classes_hook = Some(Box::new(hook));
        self
    }

    /// Hook over the collected routes, run before ordering and compilation.
    pub fn on_routes<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Vec<RouteDescriptor>) -> Result<(), BoxError> + Send + 'static,
    {
        self.routes_hook = Some(Box::new(hook));
        self
    }

    /// Hook adding segments in front of every compiled route.
    pub fn on_route<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RouteDescriptor) -> Vec<Arc<dyn Segment>> + Send + Sync + 'static,
    {
        self.route_hook = Some(Arc::new(hook));
        self
    }

    pub fn gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn view_engine(mut self, engine: Arc<dyn ViewEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn upload_config(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    pub fn build(self) -> Result<RouteTable, BuildError> {
        let mut entries = self.registry.into_entries();
        if let Some(hook) = self.classes_hook {
            hook(&mut entries).map_err(BuildError::ClassesHook)?;
        }
        entries.sort_by_key(|entry| Reverse(entry.priority));

        let mut controllers = Controllers::default();
        let mut routes = Vec::new();
        let mut seen = HashSet::new();

        for entry in &entries {
            if !seen.insert(entry.id.clone()) {
                return Err(BuildError::DuplicateController(entry.id.clone()));
            }
            let controller = entry.instantiate().map_err(|source| BuildError::Instantiate {
                id: entry.id.clone(),
                source,
            })?;

            let mut set = RouteSet::new(entry.id.clone());
            controller.declare(&mut set);
            let declared = set.into_routes();
            tracing::debug!(controller = %entry.id, routes = declared.len(), "Controller declared routes");

            routes.extend(declared);
            controllers.insert(entry.id.clone(), controller);
        }

        if let Some(hook) = self.routes_hook {
            hook(&mut routes).map_err(BuildError::RoutesHook)?;
        }
        routes.sort_by_key(|route| Reverse(route.priority));

        for route in &routes {
            validate(route, &controllers)?;
        }

        let pages = ErrorPages::new(Arc::clone(&self.engine));
        let compiler = RouteCompiler {
            gate: self.gate,
            controllers: Arc::new(controllers),
            engine: self.engine,
            reporter: self.reporter,
            uploads: UploadResolver::new(self.upload.clone(), pages.clone()),
            hook: self.route_hook,
        };

        let compiled: Vec<CompiledRoute> = routes.into_iter().map(|route| compiler.compile(route)).collect();
        for route in &compiled {
            tracing::debug!(
                verb = %route.descriptor().verb,
                path = %route.path(),
                segments = ?route.segment_names(),
                "Route mounted"
            );
        }
        tracing::info!(
            controllers = compiler.controllers.len(),
            routes = compiled.len(),
            "Route table built"
        );

        Ok(RouteTable {
            routes: compiled,
            controllers: compiler.controllers,
            pages,
            upload: self.upload,
        })
    }
}

fn validate(route: &RouteDescriptor, controllers: &Controllers) -> Result<(), BuildError> {
    let Some(controller) = controllers.get(&route.controller) else {
        return Err(BuildError::UnknownController {
            verb: route.verb,
            path: route.full_path(),
            controller: route.controller.clone(),
        });
    };
    if !controller.has_action(&route.action) {
        return Err(BuildError::UnknownAction {
            verb: route.verb,
            path: route.full_path(),
            controller: route.controller.clone(),
            action: route.action.clone(),
        });
    }
    if let Some(policy) = &route.upload {
        let needs_fields = matches!(policy.mode, UploadMode::Single | UploadMode::Fields);
        if needs_fields && policy.fields.is_empty() {
            return Err(BuildError::UploadWithoutFields {
                verb: route.verb,
                path: route.full_path(),
                mode: policy.mode,
            });
        }
    }
    Ok(())
}

/// The frozen, ordered set of compiled routes.
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    controllers: Arc<Controllers>,
    pages: ErrorPages,
    upload: UploadConfig,
}

impl RouteTable {
    /// Compiled routes in registration order.
    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn controllers(&self) -> &Arc<Controllers> {
        &self.controllers
    }

    pub fn pages(&self) -> &ErrorPages {
        &self.pages
    }

    /// Upload settings every upload segment of this table writes with.
    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }

    /// Run `req` through every matching route in order.
    pub async fn dispatch(&self, mut req: Request<Body>) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        for route in &self.routes {
            let Some(params) = route.matches(&method, &path) else {
                continue;
            };
            req.extensions_mut().insert(params);

            match route.run(req).await {
                Flow::Respond(response) => return response,
                Flow::Continue(next) | Flow::Next(next) => req = next,
                Flow::NotFound(ctx) => return self.pages.not_found(&ctx),
            }
        }

        tracing::debug!(method = %method, path = %path, "No route answered");
        // Files received by routes that all fell through have no owner.
        if let Some(uploads) = req.extensions_mut().remove::<Uploads>() {
            discard(&uploads.files).await;
        }
        self.pages.not_found(&RequestContext::of(&req))
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field("controllers", &self.controllers)
            .finish()
    }
}
