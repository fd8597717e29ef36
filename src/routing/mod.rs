//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (exact lookup)
//!     → Return: Handler, NotFound handler, Redirect, or RouteError
//!
//! Route Compilation (at startup):
//!     "METHOD::path" / "::path" / "ERROR::code" specs
//!     → matcher.rs (parse, reject malformed specs)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Malformed specs are fatal configuration errors
//! - Deterministic: same input always matches same route

pub mod handler;
pub mod matcher;
pub mod router;

pub use handler::Handler;
pub use matcher::{RouteSpec, RouteSpecError};
pub use router::{Resolution, RouteError, RouteTable};
