//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → headers.rs (default no-cache headers)
//!     → xsrf.rs (rotate token; verify pair on mutating methods)
//!         → codec.rs (sign/verify the token cookie)
//!     → Pass to handler, or 403
//! ```
//!
//! # Design Decisions
//! - Fail closed: any guard failure rejects the request before the handler
//! - Cookie values are always authenticated, never trusted as-is
//! - Keys rotate by prepending; old keys still verify

pub mod codec;
pub mod headers;
pub mod xsrf;

pub use codec::{CodecError, HmacTokenCodec, TokenCodec};
pub use headers::apply_default_headers;
pub use xsrf::{AntiForgeryGuard, GuardError};
