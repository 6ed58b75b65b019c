//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch segment:
//!     → gate.rs (route requires a capability?)
//!     → access_control.rs (principal from the session vs. requirement)
//!     → Verdict: Allow | DenySilent | Redirected
//! ```
//!
//! # Design Decisions
//! - Fail closed: a failing check never reaches the controller
//! - Denial without a redirect target looks exactly like a missing route

pub mod access_control;
pub mod gate;

pub use access_control::{AccessControl, AclDecision, AclError, CapabilityPolicy, Principal, PRINCIPAL_KEY};
pub use gate::{AuthorizationGate, Gate, GateError, Verdict};
