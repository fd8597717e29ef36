//! Shared harness for dispatcher and server integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{Method, Request, Response};
use tokio::sync::mpsc::UnboundedReceiver;

use gatekeep::config::AppConfig;
use gatekeep::lifecycle::{build_dispatcher, Collaborators};
use gatekeep::observability::{Notifier, NotifyError};
use gatekeep::resilience::StructuredFailure;
use gatekeep::session::{MemorySessionStore, Session, SessionError, SessionStore};
use gatekeep::storage::MemoryStorage;
use gatekeep::tasks::{ChannelTaskQueue, QueuedTask};
use gatekeep::{Dispatcher, RouteTable};

pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.app.app_id = "test-app".to_string();
    config.session.secret = "integration-session-secret".to_string();
    config.xsrf.secrets = vec!["integration-xsrf-secret".to_string()];
    config.templates.dir = "tests/does-not-exist".to_string();
    config
}

/// A dispatcher plus handles on its in-memory collaborators.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub sessions: Arc<MemorySessionStore>,
    pub storage: Arc<MemoryStorage>,
    pub tasks: UnboundedReceiver<QueuedTask>,
}

pub fn harness(routes: RouteTable) -> Harness {
    harness_with(test_config(), routes)
}

pub fn harness_with(config: AppConfig, routes: RouteTable) -> Harness {
    harness_with_sessions(
        config,
        routes,
        MemorySessionStore::new(std::time::Duration::from_secs(3600)),
    )
}

pub fn harness_with_sessions(config: AppConfig, routes: RouteTable, sessions: MemorySessionStore) -> Harness {
    let (queue, tasks) = ChannelTaskQueue::new();
    let sessions = Arc::new(sessions);
    let storage = Arc::new(MemoryStorage::new());

    let mut collaborators = Collaborators::in_memory(&config, Arc::new(queue));
    collaborators.sessions = sessions.clone();
    collaborators.storage = storage.clone();

    let dispatcher = build_dispatcher(&config, routes, collaborators).expect("dispatcher builds");
    Harness {
        dispatcher,
        sessions,
        storage,
        tasks,
    }
}

/// A dispatcher over an arbitrary session store, with no other handles.
pub fn dispatcher_with_store(routes: RouteTable, store: Arc<dyn SessionStore>) -> Dispatcher {
    let config = test_config();
    let (queue, _tasks) = ChannelTaskQueue::new();
    let mut collaborators = Collaborators::in_memory(&config, Arc::new(queue));
    collaborators.sessions = store;
    build_dispatcher(&config, routes, collaborators).expect("dispatcher builds")
}

/// Session store whose backend can be made to fail on load or on save.
#[derive(Debug, Default)]
pub struct FailingSessionStore {
    pub fail_load: bool,
    pub fail_save: bool,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl FailingSessionStore {
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    pub fn failing_save() -> Self {
        Self {
            fail_save: true,
            ..Self::default()
        }
    }

    /// Successful saves.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SessionStore for FailingSessionStore {
    fn load(&self, _id: Option<&str>) -> Result<Session, SessionError> {
        if self.fail_load {
            return Err(SessionError::Backend("store unavailable".to_string()));
        }
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(format!("session-{}", n)))
    }

    fn save(&self, _session: &Session) -> Result<(), SessionError> {
        if self.fail_save {
            return Err(SessionError::Backend("store is read-only".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every failure it is told about.
#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<StructuredFailure>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, failure: &StructuredFailure) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push(failure.clone());
        Ok(())
    }
}

/// A browser-like client: keeps cookies between requests.
#[derive(Debug, Default)]
pub struct Browser {
    cookies: HashMap<String, String>,
}

impl Browser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn get(&mut self, dispatcher: &Dispatcher, path: &str) -> Response<Bytes> {
        self.send(dispatcher, Method::GET, path, None, "")
    }

    /// Mutating request echoing the XSRF cookie in the header.
    pub fn post(&mut self, dispatcher: &Dispatcher, path: &str, body: &'static str) -> Response<Bytes> {
        let token = self.cookie(XSRF_COOKIE).map(str::to_string);
        self.send(dispatcher, Method::POST, path, token.as_deref(), body)
    }

    pub fn send(
        &mut self,
        dispatcher: &Dispatcher,
        method: Method,
        path: &str,
        xsrf_header: Option<&str>,
        body: &'static str,
    ) -> Response<Bytes> {
        let mut builder = Request::builder().method(method).uri(path);
        if !self.cookies.is_empty() {
            let line = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, line);
        }
        if let Some(token) = xsrf_header {
            builder = builder.header(XSRF_HEADER, token);
        }
        let request = builder.body(Bytes::from_static(body.as_bytes())).unwrap();

        let response = dispatcher.dispatch(request);
        self.absorb(&response);
        response
    }

    fn absorb(&mut self, response: &Response<Bytes>) {
        for value in response.headers().get_all(SET_COOKIE) {
            let value = value.to_str().unwrap();
            let pair = value.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            self.cookies.insert(name.to_string(), value.to_string());
        }
    }
}

pub fn body_text(response: &Response<Bytes>) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

pub fn set_cookie_names(response: &Response<Bytes>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().split('=').next().unwrap().to_string())
        .collect()
}
