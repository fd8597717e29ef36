//! Per-client session state.
//!
//! # Data Flow
//! ```text
//! Request start:
//!     session cookie → manager.rs (verify signature) → SessionStore::load
//!
//! Request end (always, success or failure):
//!     Session → SessionStore::save → manager.rs (re-issue signed cookie)
//! ```
//!
//! # Design Decisions
//! - A session is owned by exactly one request while it is processed
//! - One reserved key holds the anti-forgery token; handlers cannot write it
//! - Creation-on-miss is the store's responsibility

pub mod manager;
pub mod store;

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use manager::SessionManager;
pub use store::{MemorySessionStore, SessionStore};

/// Session key reserved for the anti-forgery token.
pub const XSRF_KEY: &str = "xsrf";

/// Errors from session access or persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session key `{0}` is reserved")]
    ReservedKey(String),

    #[error("session value could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session backend failed: {0}")]
    Backend(String),

    #[error("session cookie could not be issued: {0}")]
    Cookie(String),
}

/// A client's key/value state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    values: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    is_new: bool,
}

impl Session {
    /// A session not yet known to any store.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
            is_new: true,
        }
    }

    pub(crate) fn restore(id: String, values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            id,
            values,
            is_new: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn values(&self) -> &HashMap<String, serde_json::Value> {
        &self.values
    }

    /// Typed read. Missing keys and type mismatches both yield `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), SessionError> {
        if key == XSRF_KEY {
            return Err(SessionError::ReservedKey(key.to_string()));
        }
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<serde_json::Value>, SessionError> {
        if key == XSRF_KEY {
            return Err(SessionError::ReservedKey(key.to_string()));
        }
        Ok(self.values.remove(key))
    }

    /// The live anti-forgery token, if one was issued.
    pub fn xsrf_token(&self) -> Option<Vec<u8>> {
        self.values
            .get(XSRF_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| STANDARD.decode(s).ok())
    }

    /// Replace the live anti-forgery token.
    pub(crate) fn set_xsrf_token(&mut self, token: &[u8]) {
        self.values.insert(
            XSRF_KEY.to_string(),
            serde_json::Value::String(STANDARD.encode(token)),
        );
    }
}
