//! Request-processing pipeline for hosted web applications.
//!
//! Routes requests to handlers, guards state-changing requests with rotating
//! anti-forgery tokens, and recovers from handler failures by re-rendering
//! through per-status error handlers before anything reaches the client.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod templates;

pub use config::AppConfig;
pub use error::AppError;
pub use http::{AppServer, Dispatcher, RequestContext};
pub use lifecycle::Shutdown;
pub use routing::{Handler, RouteTable};
