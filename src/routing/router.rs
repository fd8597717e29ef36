//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store method+path bindings and status-code error handlers
//! - Look up the handler for a request
//! - Return matched handler or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact path lookup via HashMap
//! - A method-specific binding wins over an any-method binding on the same path
//! - Error handlers: last registration wins

use std::collections::HashMap;

use axum::http::{Method, StatusCode};

use crate::http::context::RequestContext;
use crate::error::AppError;
use crate::routing::handler::Handler;
use crate::routing::matcher::{RouteSpec, RouteSpecError};

#[derive(Debug, Clone, Default)]
struct PathRoutes {
    by_method: HashMap<Method, Handler>,
    any: Option<Handler>,
}

impl PathRoutes {
    fn get(&self, method: &Method) -> Option<&Handler> {
        self.by_method.get(method).or(self.any.as_ref())
    }

    fn allowed(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.by_method.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

/// Successful lookup.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// A bound route.
    Handler(&'a Handler),
    /// Nothing bound; the registered not-found handler takes over.
    NotFound(&'a Handler),
    /// Path differs from a bound path only by a trailing slash.
    Redirect(String),
}

/// Failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route")]
    NoRoute,

    #[error("method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },
}

/// Method+path bindings plus error-handler bindings.
///
/// Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct RouteTable {
    paths: HashMap<String, PathRoutes>,
    errors: HashMap<StatusCode, Handler>,
    strict_slash: bool,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Create an empty table with strict-slash redirects enabled.
    pub fn new() -> Self {
        Self {
            paths: HashMap::new(),
            errors: HashMap::new(),
            strict_slash: true,
        }
    }

    pub fn with_strict_slash(mut self, enabled: bool) -> Self {
        self.strict_slash = enabled;
        self
    }

    /// Build a table from `(spec, handler)` pairs.
    pub fn from_routes<I, S>(routes: I) -> Result<Self, RouteSpecError>
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for (spec, handler) in routes {
            table.register(spec.as_ref(), handler)?;
        }
        Ok(table)
    }

    /// Bind a handler under a route spec.
    pub fn register(&mut self, spec: &str, handler: Handler) -> Result<&mut Self, RouteSpecError> {
        match spec.parse::<RouteSpec>()? {
            RouteSpec::Error(code) => {
                if self.errors.insert(code, handler).is_some() {
                    tracing::debug!(code = code.as_u16(), "Error handler replaced");
                }
            }
            RouteSpec::Any { path } => {
                let entry = self.paths.entry(path).or_default();
                if entry.any.is_some() {
                    return Err(RouteSpecError::Duplicate(spec.to_string()));
                }
                entry.any = Some(handler);
            }
            RouteSpec::Method { method, path } => {
                let entry = self.paths.entry(path).or_default();
                if entry.by_method.contains_key(&method) {
                    return Err(RouteSpecError::Duplicate(spec.to_string()));
                }
                entry.by_method.insert(method, handler);
            }
        }
        Ok(self)
    }

    /// Bind a closure under a route spec, naming the handler after the spec.
    pub fn handle<F>(&mut self, spec: &str, func: F) -> Result<&mut Self, RouteSpecError>
    where
        F: Fn(&mut RequestContext<'_>) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.register(spec, Handler::new(spec, func))
    }

    /// Exact-match lookup for a request.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Resolution<'_>, RouteError> {
        if let Some(routes) = self.paths.get(path) {
            return match routes.get(method) {
                Some(handler) => Ok(Resolution::Handler(handler)),
                None => Err(RouteError::MethodNotAllowed {
                    allowed: routes.allowed(),
                }),
            };
        }

        if self.strict_slash {
            if let Some(target) = toggle_trailing_slash(path) {
                if self.paths.contains_key(&target) {
                    return Ok(Resolution::Redirect(target));
                }
            }
        }

        match self.not_found_handler() {
            Some(handler) => Ok(Resolution::NotFound(handler)),
            None => Err(RouteError::NoRoute),
        }
    }

    /// Error handler registered for a status code. No fallback chain.
    pub fn resolve_error(&self, code: StatusCode) -> Option<&Handler> {
        self.errors.get(&code)
    }

    /// The handler bound to `ERROR::404`, if any.
    pub fn not_found_handler(&self) -> Option<&Handler> {
        self.errors.get(&StatusCode::NOT_FOUND)
    }

    /// Number of bound paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.strip_suffix('/') {
        Some(trimmed) => Some(trimmed.to_string()),
        None => Some(format!("{}/", path)),
    }
}
