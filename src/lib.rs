//! EdenFrame: declarative routes over axum.
//!
//! Controllers declare their routes; the route table orders them by
//! priority, compiles each into a segment chain (timing, upload, gated
//! dispatch) and serves them behind the process-wide middleware.

pub mod config;
pub mod controller;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::AppConfig;
pub use controller::{action, ActionError, ActionFuture, Controller, ControllerRegistry, Outcome};
pub use http::{Render, Server};
pub use lifecycle::Shutdown;
pub use routing::{RouteSet, RouteTable, RouteTableBuilder};
