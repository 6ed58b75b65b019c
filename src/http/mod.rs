//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, process-wide middleware)
//!     → context.rs (negotiation flag, timers, per-request context)
//!     → middleware/ (response time, body parsing, api cors)
//!     → session.rs (signed cookies, session load/save)
//!     → [route table dispatch]
//!         → upload.rs (multipart segment, POST routes only)
//!         → render.rs (per-request render handle, error pages)
//!     → Send to client
//! ```

pub mod context;
pub mod middleware;
pub mod render;
pub mod server;
pub mod session;
pub mod upload;

pub use context::RequestContext;
pub use middleware::ParsedBody;
pub use render::{ErrorPages, Render, RenderArgs, RenderError, ShellEngine, ViewEngine};
pub use server::{Server, ServerError};
pub use session::{MemoryStore, Session, SessionStore};
pub use upload::{UploadedFile, Uploads};
