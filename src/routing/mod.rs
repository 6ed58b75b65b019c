//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Table Build (at startup):
//!     ControllerRegistry
//!     → classes hook → sort by priority → Controller::declare
//!     → routes hook → sort by priority
//!     → validate against controllers
//!     → compiler.rs (timing → upload → dispatch per route)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (method, path)
//!     → table.rs (scan compiled routes in order)
//!     → matcher.rs (verb + path pattern)
//!     → segment chain → Respond | Next (try next route) | NotFound
//!     → not-found page when nothing answers
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (segment-wise matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority, ties keep discovery order)

pub mod compiler;
pub mod descriptor;
pub mod matcher;
pub mod segment;
pub mod table;

pub use compiler::{CompiledRoute, RouteHook};
pub use descriptor::{join_path, FieldSpec, RouteDescriptor, RouteSet, UploadMode, UploadPolicy, Verb};
pub use matcher::RouteParams;
pub use segment::{FnSegment, Flow, Segment};
pub use table::{BuildError, RouteTable, RouteTableBuilder};
