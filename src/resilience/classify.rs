//! Failure classification.
//!
//! Every request-ending failure becomes a [`StructuredFailure`] before any
//! response decision is made. Classification is total and never fails.

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;

use crate::error::AppError;

/// Broad category of a failure, used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoRoute,
    MethodNotAllowed,
    Forbidden,
    Handler,
    RuntimeFault,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoRoute => "no_route",
            FailureKind::MethodNotAllowed => "method_not_allowed",
            FailureKind::Forbidden => "forbidden",
            FailureKind::Handler => "handler",
            FailureKind::RuntimeFault => "runtime_fault",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unexpected runtime fault caught at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub trace: String,
}

/// A raised failure, before classification.
#[derive(Debug)]
pub enum Failure {
    /// Explicit error returned by a handler or the pipeline.
    Handler(AppError),
    /// Caught panic.
    Fault(Fault),
}

impl From<AppError> for Failure {
    fn from(err: AppError) -> Self {
        Failure::Handler(err)
    }
}

/// Normalized failure record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredFailure {
    pub status: StatusCode,
    pub kind: FailureKind,
    pub message: String,
    pub trace: String,
}

impl StructuredFailure {
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Plain-text report for operators.
    pub fn render(&self) -> String {
        let mut out = format!("{} {}: {}", self.status.as_u16(), self.kind, self.message);
        if !self.trace.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.trace);
        }
        out
    }
}

impl fmt::Display for StructuredFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.kind, self.message)
    }
}

/// Maps raised failures to [`StructuredFailure`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(failure: Failure) -> StructuredFailure {
        match failure {
            Failure::Fault(fault) => StructuredFailure {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: FailureKind::RuntimeFault,
                message: fault.message,
                trace: fault.trace,
            },
            Failure::Handler(err) => {
                let kind = match &err {
                    AppError::NotFound => FailureKind::NoRoute,
                    AppError::MethodNotAllowed => FailureKind::MethodNotAllowed,
                    AppError::Forbidden(_) => FailureKind::Forbidden,
                    AppError::Status { .. } | AppError::Internal(_) => FailureKind::Handler,
                };
                StructuredFailure {
                    status: err.status(),
                    kind,
                    message: err.to_string(),
                    trace: source_chain(&err),
                }
            }
        }
    }
}

/// "caused by" lines for each error source below the top-level message.
fn source_chain(err: &dyn StdError) -> String {
    let mut lines = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        lines.push(format!("caused by: {}", source));
        current = source.source();
    }
    lines.join("\n")
}
