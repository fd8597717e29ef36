//! Route specification parsing.
//!
//! # Responsibilities
//! - Parse `"METHOD::path"`, `"::path"` and `"ERROR::code"` strings
//! - Reject malformed specs at startup, never at request time
//!
//! # Design Decisions
//! - Method names are case-sensitive (HTTP methods are)
//! - Paths must be absolute
//! - Error codes must be valid HTTP status codes

use std::str::FromStr;

use axum::http::{Method, StatusCode};

/// Separator between the method (or `ERROR`) and the path (or code).
pub const SEPARATOR: &str = "::";

/// Prefix marking an error-handler binding.
pub const ERROR_PREFIX: &str = "ERROR";

/// A parsed route specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSpec {
    /// Bound to one method on one path.
    Method { method: Method, path: String },
    /// Bound to every method on one path.
    Any { path: String },
    /// Error handler for a status code.
    Error(StatusCode),
}

/// Fatal configuration error raised while building the route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteSpecError {
    #[error("route `{0}` is not in the METHOD::path format")]
    Arity(String),

    #[error("route `{spec}` has an invalid method `{method}`")]
    InvalidMethod { spec: String, method: String },

    #[error("route `{spec}` has a non-numeric or invalid error code `{code}`")]
    InvalidCode { spec: String, code: String },

    #[error("route `{0}` must have an absolute path")]
    InvalidPath(String),

    #[error("route `{0}` is registered twice")]
    Duplicate(String),
}

impl FromStr for RouteSpec {
    type Err = RouteSpecError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = spec.split(SEPARATOR).collect();
        let [head, tail] = parts.as_slice() else {
            return Err(RouteSpecError::Arity(spec.to_string()));
        };

        if *head == ERROR_PREFIX {
            let code = tail
                .parse::<u16>()
                .ok()
                .and_then(|n| StatusCode::from_u16(n).ok())
                .ok_or_else(|| RouteSpecError::InvalidCode {
                    spec: spec.to_string(),
                    code: tail.to_string(),
                })?;
            return Ok(RouteSpec::Error(code));
        }

        if !tail.starts_with('/') {
            return Err(RouteSpecError::InvalidPath(spec.to_string()));
        }
        let path = tail.to_string();

        if head.is_empty() {
            return Ok(RouteSpec::Any { path });
        }

        let method = parse_method(head).ok_or_else(|| RouteSpecError::InvalidMethod {
            spec: spec.to_string(),
            method: head.to_string(),
        })?;
        Ok(RouteSpec::Method { method, path })
    }
}

/// Parse an HTTP method token. Only uppercase tokens are accepted.
pub fn parse_method(token: &str) -> Option<Method> {
    if token.is_empty() || token.bytes().any(|b| b.is_ascii_lowercase()) {
        return None;
    }
    Method::from_bytes(token.as_bytes()).ok()
}
