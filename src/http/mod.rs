//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, body collection)
//!     → dispatcher.rs (session, route, guard, handler, error routing)
//!         → context.rs (what a handler sees)
//!         → response.rs (buffered body until commit)
//!         → cookies.rs (Cookie / Set-Cookie)
//!     → Send to client
//! ```

pub mod context;
pub mod cookies;
pub mod dispatcher;
pub mod request;
pub mod response;
pub mod server;

pub use context::{RequestContext, Services};
pub use dispatcher::Dispatcher;
pub use request::X_REQUEST_ID;
pub use response::{BufferedResponseSink, ResponseTransport, Transport};
pub use server::AppServer;
