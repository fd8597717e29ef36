//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Dispatcher failures additionally go to:
//!     → alerts.rs (render alert mail → enqueue delivery task per operator)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID is attached to every dispatch span
//! - Alerts are best effort and never block the client response

pub mod alerts;
pub mod logging;
pub mod metrics;

pub use alerts::{MailAlertNotifier, Notifier, NotifyError};
