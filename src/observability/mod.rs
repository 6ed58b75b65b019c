//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → errors.rs  (process-wide error reporter)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the per-request span
//! - Errors caught at a request boundary are reported exactly once

pub mod errors;
pub mod logging;

pub use errors::{ErrorReporter, TracingReporter};
