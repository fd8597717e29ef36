//! Session cookie handling around a [`SessionStore`].

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::config::SessionConfig;
use crate::http::cookies::{request_cookie, SetCookie};
use crate::security::codec::TokenCodec;
use crate::session::{Session, SessionError, SessionStore};

/// Loads and saves sessions keyed by a signed cookie.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn TokenCodec>,
    cookie_name: String,
    path: String,
    max_age_secs: u64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, codec: Arc<dyn TokenCodec>, config: &SessionConfig) -> Self {
        Self {
            store,
            codec,
            cookie_name: config.cookie_name.clone(),
            path: config.path.clone(),
            max_age_secs: config.max_age_secs,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Load the session named by the request's cookie.
    ///
    /// A cookie that fails verification is ignored and a fresh session starts.
    pub fn load(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let id = request_cookie(headers, &self.cookie_name).and_then(|raw| {
            match self.codec.decode(raw) {
                Ok(bytes) => String::from_utf8(bytes).ok(),
                Err(err) => {
                    tracing::debug!(error = %err, "Ignoring invalid session cookie");
                    None
                }
            }
        });
        self.store.load(id.as_deref())
    }

    /// Persist the session and re-issue its cookie on the response.
    pub fn save(&self, session: &Session, response_headers: &mut HeaderMap) -> Result<(), SessionError> {
        self.store.save(session)?;

        let encoded = self
            .codec
            .encode(session.id().as_bytes())
            .map_err(|e| SessionError::Cookie(e.to_string()))?;
        SetCookie::new(self.cookie_name.as_str(), encoded)
            .path(self.path.as_str())
            .max_age(self.max_age_secs)
            .http_only()
            .append_to(response_headers)
            .map_err(|e| SessionError::Cookie(e.to_string()))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie_name", &self.cookie_name)
            .field("path", &self.path)
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}
