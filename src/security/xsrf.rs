//! Rotating double-submit anti-forgery tokens.
//!
//! # Protocol (once per request)
//! ```text
//! previous = session token (may be absent)
//! issued   = fresh random bytes → session, encoded → response cookie
//! if method is not safe:
//!     previous absent             → MissingToken
//!     cookie absent               → MissingCookie
//!     header != cookie (verbatim) → TokenMismatch
//!     decode(cookie) fails        → TokenDecode
//!     decoded != previous         → TokenMismatch (constant-time, full length)
//! ```
//!
//! # Design Decisions
//! - Rotation happens on every request, safe methods included, so each
//!   response primes the client for its next mutating request
//! - A captured token is good for exactly one mutating request
//! - Token values are never logged

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, Method};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::http::cookies::{request_cookie, SetCookie};
use crate::observability::metrics;
use crate::security::codec::{CodecError, TokenCodec};
use crate::session::Session;

/// Default random token length in bytes.
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Why a request was refused, or why a token could not be issued.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("no token was issued to this session before")]
    MissingToken,

    #[error("request carries no token cookie")]
    MissingCookie,

    #[error("token header does not match token cookie")]
    TokenMismatch,

    #[error("token cookie failed verification: {0}")]
    TokenDecode(#[source] CodecError),

    #[error("token could not be encoded: {0}")]
    Encode(#[source] CodecError),

    #[error("token cookie could not be set: {0}")]
    Cookie(String),
}

impl GuardError {
    /// Whether this is a rejected request (403) rather than a server fault.
    pub fn is_forbidden(&self) -> bool {
        !matches!(self, GuardError::Encode(_) | GuardError::Cookie(_))
    }

    fn reason(&self) -> &'static str {
        match self {
            GuardError::MissingToken => "missing_token",
            GuardError::MissingCookie => "missing_cookie",
            GuardError::TokenMismatch => "mismatch",
            GuardError::TokenDecode(_) => "decode",
            GuardError::Encode(_) => "encode",
            GuardError::Cookie(_) => "cookie",
        }
    }
}

/// Issues and verifies anti-forgery tokens.
#[derive(Clone)]
pub struct AntiForgeryGuard {
    codec: Arc<dyn TokenCodec>,
    cookie_name: String,
    header_name: HeaderName,
    token_bytes: usize,
    safe_methods: Vec<Method>,
}

impl AntiForgeryGuard {
    /// Create a guard that treats only GET as safe.
    pub fn new(codec: Arc<dyn TokenCodec>, cookie_name: impl Into<String>, header_name: HeaderName) -> Self {
        Self {
            codec,
            cookie_name: cookie_name.into(),
            header_name,
            token_bytes: DEFAULT_TOKEN_BYTES,
            safe_methods: vec![Method::GET],
        }
    }

    pub fn with_token_bytes(mut self, token_bytes: usize) -> Self {
        self.token_bytes = token_bytes;
        self
    }

    pub fn with_safe_methods(mut self, methods: Vec<Method>) -> Self {
        self.safe_methods = methods;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn is_safe(&self, method: &Method) -> bool {
        self.safe_methods.contains(method)
    }

    /// Rotate the session token and, for mutating methods, verify the
    /// token pair presented by the client.
    ///
    /// The new token is stored and its cookie set before verification, so a
    /// rejected request still rotates.
    pub fn protect(
        &self,
        method: &Method,
        request_headers: &HeaderMap,
        session: &mut Session,
        response_headers: &mut HeaderMap,
    ) -> Result<(), GuardError> {
        let previous = session.xsrf_token();

        let issued = generate_token(self.token_bytes);
        session.set_xsrf_token(&issued);

        let encoded = self.codec.encode(&issued).map_err(GuardError::Encode)?;
        SetCookie::new(self.cookie_name.as_str(), encoded)
            .path("/")
            .append_to(response_headers)
            .map_err(|e| GuardError::Cookie(e.to_string()))?;

        if self.is_safe(method) {
            return Ok(());
        }

        self.verify(previous.as_deref(), request_headers).map_err(|err| {
            tracing::warn!(method = %method, reason = err.reason(), "XSRF check failed");
            metrics::record_xsrf_rejection(err.reason());
            err
        })
    }

    fn verify(&self, previous: Option<&[u8]>, request_headers: &HeaderMap) -> Result<(), GuardError> {
        let previous = previous.ok_or(GuardError::MissingToken)?;

        let cookie = request_cookie(request_headers, &self.cookie_name)
            .filter(|c| !c.is_empty())
            .ok_or(GuardError::MissingCookie)?;

        let header = request_headers
            .get(&self.header_name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if header != cookie {
            tracing::debug!(
                header_len = header.len(),
                cookie_len = cookie.len(),
                "XSRF header and cookie differ"
            );
            return Err(GuardError::TokenMismatch);
        }

        let presented = self.codec.decode(cookie).map_err(GuardError::TokenDecode)?;
        if !constant_time_eq(previous, &presented) {
            tracing::debug!(
                expected_len = previous.len(),
                presented_len = presented.len(),
                "XSRF token does not match session"
            );
            return Err(GuardError::TokenMismatch);
        }

        Ok(())
    }
}

impl std::fmt::Debug for AntiForgeryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AntiForgeryGuard")
            .field("cookie_name", &self.cookie_name)
            .field("header_name", &self.header_name)
            .field("token_bytes", &self.token_bytes)
            .field("safe_methods", &self.safe_methods)
            .finish()
    }
}

/// Fresh cryptographically random token.
pub fn generate_token(len: usize) -> Vec<u8> {
    let mut token = vec![0u8; len];
    OsRng.fill_bytes(&mut token);
    token
}

/// Compare `presented` against the full length of `expected` without
/// short-circuiting. A length difference is a mismatch.
pub fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    let mut diff = expected.len() ^ presented.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = presented.get(i).copied().unwrap_or(!*byte);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}
