//! Per-request orchestration.
//!
//! # States
//! ```text
//! Start ──resolve──▶ Resolved ──guard──▶ Guarded ──run──▶ Executing
//!   │ no route (404)    │ forbidden (403)                 │
//!   │ wrong method (405)│                     ┌───────────┴──────────┐
//!   ▼                   ▼                     ▼                      ▼
//! ErrorRouted ◀─────────┴───────────────── Failed                 Success
//!   │ (error handler re-renders into the same sink;                  │
//!   │  if it fails too: bare status, no recursion)                   │
//!   ▼                                                                ▼
//! Committed ◀── session saved (always) ◀────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Synchronous; the server runs one dispatch per blocking task
//! - One fault boundary around each handler invocation
//! - The session is written back on every exit path because the guard
//!   rotated its token regardless of outcome

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::header::{ALLOW, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, Request, Response, StatusCode};
use uuid::Uuid;

use crate::error::AppError;
use crate::http::context::{RequestContext, Services};
use crate::http::request::request_id;
use crate::http::response::BufferedResponseSink;
use crate::observability::metrics;
use crate::observability::Notifier;
use crate::resilience::{run_guarded, ErrorClassifier, Failure, StructuredFailure};
use crate::routing::{Resolution, RouteError, RouteTable};
use crate::security::{apply_default_headers, AntiForgeryGuard};
use crate::session::{Session, SessionManager};

const UNMATCHED_ROUTE: &str = "unmatched";
const REDIRECT_ROUTE: &str = "redirect";

/// Turns one request into one response.
pub struct Dispatcher {
    routes: RouteTable,
    guard: AntiForgeryGuard,
    sessions: SessionManager,
    services: Services,
    notifier: Option<Arc<dyn Notifier>>,
    notification_path: Option<String>,
    default_headers: bool,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, guard: AntiForgeryGuard, sessions: SessionManager, services: Services) -> Self {
        Self {
            routes,
            guard,
            sessions,
            services,
            notifier: None,
            notification_path: None,
            default_headers: true,
        }
    }

    /// Forward failures to `notifier`, except failures of requests under
    /// `delivery_path` (the notification deliveries themselves).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, delivery_path: impl Into<String>) -> Self {
        self.notifier = Some(notifier);
        self.notification_path = Some(delivery_path.into());
        self
    }

    pub fn with_default_headers(mut self, enabled: bool) -> Self {
        self.default_headers = enabled;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Process a request to completion. Never fails; every failure becomes a
    /// response with its classified status.
    pub fn dispatch(&self, request: Request<Bytes>) -> Response<Bytes> {
        let started = Instant::now();
        let request_id = request_id(request.headers());
        let span = tracing::info_span!(
            "dispatch",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        );
        let _entered = span.enter();

        let mut sink = BufferedResponseSink::default();
        if self.default_headers {
            apply_default_headers(sink.headers_mut());
        }

        let mut route = UNMATCHED_ROUTE.to_string();
        let (mut session, outcome, persist) = match self.sessions.load(request.headers()) {
            Ok(mut session) => {
                let outcome = self.execute(&request, &mut sink, &mut session, &request_id, &mut route);
                (session, outcome, true)
            }
            Err(err) => {
                tracing::error!(error = %err, "Session could not be loaded");
                let transient = Session::new(Uuid::new_v4().to_string());
                (transient, Err(Failure::Handler(AppError::from(err))), false)
            }
        };

        let succeeded = outcome.is_ok();
        if let Err(failure) = outcome {
            let failure = ErrorClassifier::classify(failure);
            self.report(&request, &failure);
            self.route_failure(&request, &mut sink, &mut session, &request_id, &failure);
        }

        if persist {
            if let Err(err) = self.sessions.save(&session, sink.headers_mut()) {
                tracing::error!(error = %err, "Session could not be saved");
                if succeeded {
                    let failure = ErrorClassifier::classify(Failure::Handler(AppError::from(err)));
                    self.report(&request, &failure);
                    self.route_failure(&request, &mut sink, &mut session, &request_id, &failure);
                }
            }
        }

        let response = match sink.commit() {
            Ok(transport) => transport.into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Response could not be committed");
                bare_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        let elapsed = started.elapsed();
        metrics::record_request(request.method().as_str(), response.status().as_u16(), &route, elapsed);
        tracing::debug!(
            status = response.status().as_u16(),
            route = %route,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request dispatched"
        );
        response
    }

    /// Resolve, guard, and run the handler.
    fn execute(
        &self,
        request: &Request<Bytes>,
        sink: &mut BufferedResponseSink,
        session: &mut Session,
        request_id: &str,
        route: &mut String,
    ) -> Result<(), Failure> {
        let handler = match self.routes.resolve(request.method(), request.uri().path()) {
            Ok(Resolution::Handler(handler)) => handler,
            Ok(Resolution::Redirect(target)) => {
                *route = REDIRECT_ROUTE.to_string();
                let location = match request.uri().query() {
                    Some(query) => format!("{}?{}", target, query),
                    None => target,
                };
                let location = HeaderValue::from_str(&location).map_err(AppError::internal)?;
                sink.headers_mut().insert(LOCATION, location);
                sink.set_status(StatusCode::MOVED_PERMANENTLY);
                return Ok(());
            }
            Ok(Resolution::NotFound(_)) | Err(RouteError::NoRoute) => {
                return Err(AppError::NotFound.into());
            }
            Err(RouteError::MethodNotAllowed { allowed }) => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    sink.headers_mut().insert(ALLOW, value);
                }
                return Err(AppError::MethodNotAllowed.into());
            }
        };
        *route = handler.name().to_string();

        self.guard
            .protect(request.method(), request.headers(), session, sink.headers_mut())
            .map_err(AppError::from)?;

        run_guarded(|| {
            let mut ctx = RequestContext::new(request, &mut *sink, &mut *session, &self.services, request_id);
            handler.call(&mut ctx)
        })
    }

    /// Log, count and forward a classified failure.
    fn report(&self, request: &Request<Bytes>, failure: &StructuredFailure) {
        if failure.is_server_error() {
            tracing::error!(
                status = failure.status.as_u16(),
                kind = %failure.kind,
                message = %failure.message,
                trace = %failure.trace,
                "Request failed"
            );
        } else {
            tracing::warn!(
                status = failure.status.as_u16(),
                kind = %failure.kind,
                message = %failure.message,
                "Request failed"
            );
        }
        metrics::record_failure(failure.kind.as_str());

        let Some(notifier) = &self.notifier else {
            return;
        };
        if self.is_notification_delivery(request) {
            tracing::debug!("Not notifying about a failed notification delivery");
            return;
        }
        if let Err(err) = notifier.notify(failure) {
            tracing::error!(error = %err, "Operators could not be notified");
        }
    }

    fn is_notification_delivery(&self, request: &Request<Bytes>) -> bool {
        self.notification_path
            .as_deref()
            .map(|delivery| is_under_path(request.uri().path(), delivery))
            .unwrap_or(false)
    }

    /// Replace whatever was buffered with the registered error handler's
    /// output, or with a bare status when there is none or it fails.
    fn route_failure(
        &self,
        request: &Request<Bytes>,
        sink: &mut BufferedResponseSink,
        session: &mut Session,
        request_id: &str,
        failure: &StructuredFailure,
    ) {
        sink.discard();
        sink.set_status(failure.status);

        let Some(handler) = self.routes.resolve_error(failure.status) else {
            bare_status(sink, failure.status);
            return;
        };

        let result = run_guarded(|| {
            let mut ctx = RequestContext::new(request, &mut *sink, &mut *session, &self.services, request_id)
                .with_failure(failure);
            handler.call(&mut ctx)
        });
        if let Err(nested) = result {
            let nested = ErrorClassifier::classify(nested);
            tracing::error!(
                handler = handler.name(),
                status = nested.status.as_u16(),
                message = %nested.message,
                trace = %nested.trace,
                "Error handler failed"
            );
            bare_status(sink, failure.status);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("guard", &self.guard)
            .field("sessions", &self.sessions)
            .field("notifier", &self.notifier.is_some())
            .field("default_headers", &self.default_headers)
            .finish()
    }
}

/// `path` is `base` itself or lies below it at a segment boundary.
fn is_under_path(path: &str, base: &str) -> bool {
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || base.ends_with('/'),
        None => false,
    }
}

fn bare_status(sink: &mut BufferedResponseSink, status: StatusCode) {
    sink.discard();
    sink.set_status(status);
    sink.headers_mut().remove(CONTENT_TYPE);
    sink.headers_mut().remove(LOCATION);
}

fn bare_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_path_matches_whole_segments() {
        assert!(is_under_path("/tasks/error-mail", "/tasks/error-mail"));
        assert!(is_under_path("/tasks/error-mail/retry", "/tasks/error-mail"));
        assert!(is_under_path("/tasks/error-mail/retry", "/tasks/"));
        assert!(!is_under_path("/tasks/error-mailbox", "/tasks/error-mail"));
        assert!(!is_under_path("/tasks", "/tasks/error-mail"));
    }
}
