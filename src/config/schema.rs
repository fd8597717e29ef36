//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! application. All types derive Serde traits for deserialization from config
//! files, and every section has defaults.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Application identity and behaviour switches.
    pub app: AppSection,

    /// Session cookie and store settings.
    pub session: SessionConfig,

    /// Anti-forgery token settings.
    pub xsrf: XsrfConfig,

    /// Template source settings.
    pub templates: TemplateConfig,

    /// Operator failure alerts.
    pub notifications: NotificationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest accepted request body; larger bodies get 413.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSection {
    /// Application identifier, used in operator alerts.
    pub app_id: String,

    /// Development mode: templates recompile on every render and operator
    /// alerts are disabled.
    pub development: bool,

    /// Send the default no-cache headers on every response.
    pub default_headers: bool,

    /// Redirect paths differing from a route only by a trailing slash.
    pub strict_slash: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            app_id: "gatekeep".to_string(),
            development: false,
            default_headers: true,
            strict_slash: true,
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,

    /// Key that signs the session cookie.
    pub secret: String,

    pub path: String,

    /// Cookie lifetime and store expiry in seconds.
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            secret: String::new(),
            path: "/".to_string(),
            max_age_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Anti-forgery token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct XsrfConfig {
    pub cookie_name: String,
    pub header_name: String,

    /// Signing keys. The first signs; all of them verify.
    pub secrets: Vec<String>,

    /// Random token length in bytes.
    pub token_bytes: usize,

    /// Methods exempt from verification.
    pub safe_methods: Vec<String>,

    /// Reject token cookies older than this.
    pub max_age_secs: Option<u64>,
}

impl Default for XsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "XSRF-TOKEN".to_string(),
            header_name: "X-XSRF-TOKEN".to_string(),
            secrets: Vec::new(),
            token_bytes: 32,
            safe_methods: vec!["GET".to_string()],
            max_age_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory holding `<name>.html` sources.
    pub dir: String,
    pub left_delim: String,
    pub right_delim: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: "templates".to_string(),
            left_delim: "{{".to_string(),
            right_delim: "}}".to_string(),
        }
    }
}

/// Operator alert configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// Operators who receive one alert per failure.
    pub admin_emails: Vec<String>,

    /// Sender address; defaults to `errors@<app_id>`.
    pub sender: Option<String>,

    pub subject: String,

    /// Path of the delivery task. Failures on this path are never alerted.
    pub task_path: String,

    pub queue: String,

    /// Template rendered for each alert.
    pub template: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_emails: Vec::new(),
            sender: None,
            subject: "An error occurred in the application".to_string(),
            task_path: "/tasks/error-mail".to_string(),
            queue: "admin-mails".to_string(),
            template: "mails/error".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
