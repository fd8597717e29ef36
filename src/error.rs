//! Handler-facing error type.
//!
//! Handlers return `Result<(), AppError>`. Explicit variants carry their own
//! status code; anything else converts into `Internal` and is reported as 500.

use axum::http::StatusCode;

use crate::security::xsrf::GuardError;
use crate::session::SessionError;
use crate::storage::StorageError;
use crate::tasks::TaskError;
use crate::templates::RenderError;

/// Boxed source error carried by [`AppError::Internal`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No resource for this request (404).
    #[error("not found")]
    NotFound,

    /// Request refused (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Path exists but not for this method (405).
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Explicit status chosen by the handler.
    #[error("[status code {}] {message}", code.as_u16())]
    Status { code: StatusCode, message: String },

    /// Unexpected error from a collaborator (500).
    #[error(transparent)]
    Internal(BoxError),
}

impl AppError {
    /// Failure with an explicit status code and no message.
    ///
    /// Codes outside the valid HTTP range fall back to 500.
    pub fn code(code: u16) -> Self {
        let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::Status {
            code,
            message: String::new(),
        }
    }

    /// Failure with an explicit status code and a message for the logs.
    pub fn with_message(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Wrap any error as a 500.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn forbidden() -> Self {
        Self::Forbidden(String::new())
    }

    pub fn not_allowed() -> Self {
        Self::MethodNotAllowed
    }

    /// Status code the client will receive.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Status { code, .. } => *code,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        if err.is_forbidden() {
            AppError::Forbidden(err.to_string())
        } else {
            AppError::internal(err)
        }
    }
}

macro_rules! internal_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AppError {
                fn from(err: $ty) -> Self {
                    AppError::internal(err)
                }
            }
        )*
    };
}

internal_from!(
    std::io::Error,
    serde_json::Error,
    RenderError,
    SessionError,
    StorageError,
    TaskError,
);
