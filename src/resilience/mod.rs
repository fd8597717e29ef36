//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Handler execution:
//!     → recovery.rs (catch explicit errors and panics at one boundary)
//!     → classify.rs (Failure → StructuredFailure with status and trace)
//!     → Dispatcher routes the failure to an error handler
//! ```
//!
//! # Design Decisions
//! - Exactly one fault boundary per handler invocation, never deeper
//! - A panic in one request never affects another
//! - Classification is total; it cannot itself fail

pub mod classify;
pub mod recovery;

pub use classify::{ErrorClassifier, Failure, FailureKind, Fault, StructuredFailure};
pub use recovery::run_guarded;
