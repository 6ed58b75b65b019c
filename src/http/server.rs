//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Bind the listening socket and classify bind failures
//! - Wire up process-wide middleware in a fixed order
//! - Mount the route table behind static assets and sessions
//! - Expose verb passthroughs for handlers outside the route table
//! - Serve until the shutdown future resolves
//!
//! # Middleware order (outermost first)
//! ```text
//! request id → trace → negotiation → response time → cookies → body
//!     → api cors → static assets → sessions → passthroughs → route table
//!     → not-found page
//! ```

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    handler::Handler,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{self, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::http::context::negotiate;
use crate::http::middleware::{api_cors, parse_body, response_time, BodyParser};
use crate::http::session::{cookies, sessions, signing_key, MemoryStore, SessionState, SessionStore};
use crate::observability::{ErrorReporter, TracingReporter};
use crate::routing::RouteTable;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Port {port} requires elevated privileges")]
    PermissionDenied {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Port {port} is already in use")]
    AddrInUse {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {address}: {source}")]
    Listen {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

impl ServerError {
    /// Classify a bind failure.
    pub fn bind(address: &str, port: u16, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => ServerError::PermissionDenied { port, source },
            io::ErrorKind::AddrInUse => ServerError::AddrInUse { port, source },
            _ => ServerError::Listen {
                address: address.to_string(),
                source,
            },
        }
    }

    /// Fatal errors end the process with exit status 1.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::PermissionDenied { .. } | ServerError::AddrInUse { .. }
        )
    }
}

type AppHook = Box<dyn FnOnce(Router) -> Router + Send>;

/// The application server.
pub struct Server {
    config: AppConfig,
    table: Arc<RouteTable>,
    store: Arc<dyn SessionStore>,
    reporter: Arc<dyn ErrorReporter>,
    extra: Router,
    app_hook: Option<AppHook>,
}

impl Server {
    /// Upload settings always come from `table`, which owns the upload segments.
    pub fn new(mut config: AppConfig, table: RouteTable) -> Self {
        if config.upload.dest != table.upload_config().dest {
            tracing::warn!(
                configured = %config.upload.dest,
                table = %table.upload_config().dest,
                "Upload destination differs from the route table; using the table's"
            );
        }
        config.upload = table.upload_config().clone();

        Self {
            config,
            table: Arc::new(table),
            store: Arc::new(MemoryStore::new()),
            reporter: Arc::new(TracingReporter::new()),
            extra: Router::new(),
            app_hook: None,
        }
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Hook over the assembled application router (outermost position).
    pub fn on_app<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.app_hook = Some(Box::new(hook));
        self
    }

    fn passthrough(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.extra = self.extra.route(path, method_router);
        self
    }

    // Passthrough paths use axum syntax (`/items/{id}`). They are tried
    // before the route table.

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.passthrough(path, routing::get(handler))
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.passthrough(path, routing::post(handler))
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.passthrough(path, routing::put(handler))
    }

    /// Alias of [`Server::put`].
    pub fn push<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.put(path, handler)
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.passthrough(path, routing::delete(handler))
    }

    pub fn all<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.passthrough(path, routing::any(handler))
    }

    /// Mount a whole router under `path`.
    pub fn mount(mut self, path: &str, router: Router) -> Self {
        self.extra = if path == "/" || path.is_empty() {
            self.extra.merge(router)
        } else {
            self.extra.nest(path, router)
        };
        self
    }

    /// Assemble the full middleware stack.
    pub fn into_router(self) -> Router {
        let config = self.config;

        let table = Arc::clone(&self.table);
        let dispatch = move |req: Request<Body>| {
            let table = Arc::clone(&table);
            async move { table.dispatch(req).await }
        };

        let session_state = Arc::new(SessionState::new(self.store, config.session.clone()));
        let dynamic = self
            .extra
            .fallback(dispatch.clone())
            .method_not_allowed_fallback(dispatch)
            .layer(from_fn_with_state(session_state, sessions));

        let static_files = ServeDir::new(&config.assets.static_dir)
            .call_fallback_on_method_not_allowed(true)
            .fallback(dynamic);

        let body_parser = Arc::new(BodyParser {
            limit_bytes: config.body.limit_bytes,
            pages: self.table.pages().clone(),
        });

        let app = Router::new()
            .fallback_service(static_files)
            .layer(from_fn(api_cors))
            .layer(from_fn_with_state(body_parser, parse_body))
            .layer(from_fn_with_state(signing_key(&config.session.secret), cookies))
            .layer(from_fn(response_time))
            .layer(from_fn_with_state(Arc::new(config.assets.clone()), negotiate))
            .layer(DefaultBodyLimit::disable())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        match self.app_hook {
            Some(hook) => hook(app),
            None => app,
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = self.config.server.bind_address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(source) => {
                let error = ServerError::bind(&address, self.config.server.port, source);
                if error.is_fatal() {
                    tracing::error!(address = %address, "{error}");
                } else {
                    self.reporter.report(&error);
                }
                return Err(error);
            }
        };

        self.run(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match listener.local_addr() {
            Ok(address) => tracing::info!(address = %address, "HTTP server starting"),
            Err(e) => tracing::warn!(error = %e, "HTTP server starting on an unknown address"),
        }

        let reporter = Arc::clone(&self.reporter);
        let app = self.into_router();

        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            reporter.report(&ServerError::Serve(e));
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
