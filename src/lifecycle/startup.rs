//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration plus application routes into a
//!   ready-to-serve [`Dispatcher`]
//! - Provide in-process collaborators for development and tests
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The route table is handed over by value and never mutated afterwards

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::InvalidHeaderName;
use axum::http::{HeaderName, Method};

use crate::config::{AppConfig, XsrfConfig};
use crate::http::{Dispatcher, Services};
use crate::observability::MailAlertNotifier;
use crate::routing::{RouteSpecError, RouteTable};
use crate::security::{AntiForgeryGuard, CodecError, HmacTokenCodec};
use crate::session::{MemorySessionStore, SessionManager, SessionStore};
use crate::storage::{MemoryStorage, Storage};
use crate::tasks::TaskQueue;
use crate::templates::{Delimiters, Renderer, TemplateCache};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid route: {0}")]
    Route(#[from] RouteSpecError),

    #[error("invalid signing configuration: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid anti-forgery header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),

    #[error("invalid safe method `{0}`")]
    Method(String),
}

/// External collaborators the dispatcher is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub storage: Arc<dyn Storage>,
    pub templates: Arc<dyn Renderer>,
    pub tasks: Arc<dyn TaskQueue>,
}

impl Collaborators {
    /// In-process stores plus a template cache over the configured directory.
    pub fn in_memory(config: &AppConfig, tasks: Arc<dyn TaskQueue>) -> Self {
        let templates = TemplateCache::new(config.templates.dir.as_str())
            .with_delimiters(Delimiters::new(
                config.templates.left_delim.as_str(),
                config.templates.right_delim.as_str(),
            ))
            .development(config.app.development);
        Self {
            sessions: Arc::new(MemorySessionStore::new(Duration::from_secs(config.session.max_age_secs))),
            storage: Arc::new(MemoryStorage::new()),
            templates: Arc::new(templates),
            tasks,
        }
    }
}

pub fn build_guard(config: &XsrfConfig) -> Result<AntiForgeryGuard, StartupError> {
    let mut codec = HmacTokenCodec::new(config.cookie_name.as_str(), &config.secrets)?;
    if let Some(secs) = config.max_age_secs {
        codec = codec.with_max_age(Duration::from_secs(secs));
    }

    let header = HeaderName::try_from(config.header_name.as_str())?;
    let safe_methods = config
        .safe_methods
        .iter()
        .map(|m| Method::from_bytes(m.as_bytes()).map_err(|_| StartupError::Method(m.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AntiForgeryGuard::new(Arc::new(codec), config.cookie_name.as_str(), header)
        .with_token_bytes(config.token_bytes)
        .with_safe_methods(safe_methods))
}

pub fn build_dispatcher(
    config: &AppConfig,
    routes: RouteTable,
    collaborators: Collaborators,
) -> Result<Dispatcher, StartupError> {
    let guard = build_guard(&config.xsrf)?;

    let session_codec = HmacTokenCodec::new(config.session.cookie_name.as_str(), [&config.session.secret])?
        .with_max_age(Duration::from_secs(config.session.max_age_secs));
    let sessions = SessionManager::new(collaborators.sessions, Arc::new(session_codec), &config.session);

    let services = Services {
        storage: collaborators.storage,
        templates: Arc::clone(&collaborators.templates),
        tasks: Arc::clone(&collaborators.tasks),
    };

    let routes = routes.with_strict_slash(config.app.strict_slash);
    tracing::info!(
        routes = routes.len(),
        development = config.app.development,
        "Dispatcher ready"
    );

    let mut dispatcher = Dispatcher::new(routes, guard, sessions, services)
        .with_default_headers(config.app.default_headers);
    if let Some(notifier) =
        MailAlertNotifier::from_config(collaborators.templates, collaborators.tasks, config)
    {
        dispatcher = dispatcher.with_notifier(Arc::new(notifier), config.notifications.task_path.as_str());
    }
    Ok(dispatcher)
}
