//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, token length)
//! - Check that names parse as HTTP methods, headers and addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, Method};

use crate::config::schema::AppConfig;

/// Shortest accepted anti-forgery token, in bytes.
pub const MIN_TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    if config.session.secret.is_empty() {
        errors.push(ValidationError::new("session.secret", "must not be empty"));
    }
    if config.session.cookie_name.is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    }
    if !config.session.path.starts_with('/') {
        errors.push(ValidationError::new("session.path", "must start with `/`"));
    }
    if config.session.max_age_secs == 0 {
        errors.push(ValidationError::new("session.max_age_secs", "must be greater than 0"));
    }

    let xsrf = &config.xsrf;
    if xsrf.secrets.iter().all(|s| s.is_empty()) {
        errors.push(ValidationError::new("xsrf.secrets", "at least one non-empty secret is required"));
    }
    if xsrf.token_bytes < MIN_TOKEN_BYTES {
        errors.push(ValidationError::new(
            "xsrf.token_bytes",
            format!("must be at least {}", MIN_TOKEN_BYTES),
        ));
    }
    if xsrf.cookie_name.is_empty() {
        errors.push(ValidationError::new("xsrf.cookie_name", "must not be empty"));
    }
    if HeaderName::try_from(xsrf.header_name.as_str()).is_err() {
        errors.push(ValidationError::new(
            "xsrf.header_name",
            format!("`{}` is not a header name", xsrf.header_name),
        ));
    }
    for method in &xsrf.safe_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "xsrf.safe_methods",
                format!("`{}` is not an HTTP method", method),
            ));
        }
    }
    if xsrf.max_age_secs == Some(0) {
        errors.push(ValidationError::new("xsrf.max_age_secs", "must be greater than 0"));
    }

    let notifications = &config.notifications;
    if !notifications.task_path.starts_with('/') {
        errors.push(ValidationError::new("notifications.task_path", "must start with `/`"));
    }
    for admin in &notifications.admin_emails {
        if !is_plausible_address(admin) {
            errors.push(ValidationError::new(
                "notifications.admin_emails",
                format!("`{}` is not a mail address", admin),
            ));
        }
    }
    if notifications.enabled && notifications.admin_emails.is_empty() {
        errors.push(ValidationError::new(
            "notifications.admin_emails",
            "alerts are enabled but no address is configured",
        ));
    }
    if notifications.queue.is_empty() {
        errors.push(ValidationError::new("notifications.queue", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_plausible_address(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}
