//! Per-request execution context handed to handlers.
//!
//! A context borrows everything it exposes from the dispatcher invocation
//! that created it; nothing in it outlives the request.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;
use crate::http::cookies::request_cookie;
use crate::http::response::BufferedResponseSink;
use crate::resilience::StructuredFailure;
use crate::session::Session;
use crate::storage::Storage;
use crate::tasks::TaskQueue;
use crate::templates::{Delimiters, Renderer};

/// Prefix that stops a JSON response from being executed as a script.
pub const XSSI_PREFIX: &[u8] = b")]}',\n";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// External collaborators shared by every request.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn Storage>,
    pub templates: Arc<dyn Renderer>,
    pub tasks: Arc<dyn TaskQueue>,
}

/// Everything a handler may touch while serving one request.
pub struct RequestContext<'a> {
    request: &'a Request<Bytes>,
    sink: &'a mut BufferedResponseSink,
    session: &'a mut Session,
    services: &'a Services,
    failure: Option<&'a StructuredFailure>,
    request_id: &'a str,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(
        request: &'a Request<Bytes>,
        sink: &'a mut BufferedResponseSink,
        session: &'a mut Session,
        services: &'a Services,
        request_id: &'a str,
    ) -> Self {
        Self {
            request,
            sink,
            session,
            services,
            failure: None,
            request_id,
        }
    }

    pub(crate) fn with_failure(mut self, failure: &'a StructuredFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    // Request side.

    pub fn request(&self) -> &Request<Bytes> {
        self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn is_post(&self) -> bool {
        self.request.method() == Method::POST
    }

    pub fn is_delete(&self) -> bool {
        self.request.method() == Method::DELETE
    }

    /// Path plus `?query` when a query is present.
    pub fn path(&self) -> String {
        let uri = self.request.uri();
        match uri.query() {
            Some(query) if !query.is_empty() => format!("{}?{}", uri.path(), query),
            _ => uri.path().to_string(),
        }
    }

    pub fn request_id(&self) -> &str {
        self.request_id
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        request_cookie(self.request.headers(), name)
    }

    pub fn body(&self) -> &[u8] {
        self.request.body()
    }

    /// Decode a JSON body. An empty body is `Ok(None)`.
    pub fn load_json<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        let body = self.request.body();
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(body)
            .map(Some)
            .map_err(|e| AppError::with_message(StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)))
    }

    /// Query pairs followed by urlencoded body pairs.
    pub fn form(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .request
            .uri()
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let is_form = self
            .header(CONTENT_TYPE.as_str())
            .map(|ct| ct.starts_with(FORM_CONTENT_TYPE))
            .unwrap_or(false);
        if is_form {
            pairs.extend(url::form_urlencoded::parse(self.request.body()).into_owned());
        }
        pairs
    }

    /// First value of a form field.
    pub fn form_value(&self, name: &str) -> Option<String> {
        self.form().into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Decode form fields into `T`. Every field arrives as a string; the last
    /// occurrence of a repeated field wins.
    pub fn load_form<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .form()
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| AppError::with_message(StatusCode::BAD_REQUEST, format!("invalid form: {}", e)))
    }

    // Response side.

    pub fn status(&self) -> StatusCode {
        self.sink.status()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.sink.set_status(status);
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), AppError> {
        let value = HeaderValue::from_str(value).map_err(AppError::internal)?;
        self.sink.headers_mut().insert(name, value);
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        self.sink.write(bytes);
        Ok(())
    }

    /// The buffered response, for handlers that need raw access.
    pub fn sink(&mut self) -> &mut BufferedResponseSink {
        &mut *self.sink
    }

    /// Serialize `data` as plain JSON.
    pub fn json<T: Serialize>(&mut self, data: &T) -> Result<(), AppError> {
        let body = serde_json::to_vec(data)?;
        self.sink
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self.sink.write(&body);
        Ok(())
    }

    /// Serialize `data` as JSON behind the XSSI prefix line.
    pub fn emit_json<T: Serialize>(&mut self, data: &T) -> Result<(), AppError> {
        let body = serde_json::to_vec(data)?;
        self.sink
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self.sink.write(XSSI_PREFIX);
        self.sink.write(&body);
        self.sink.write(b"\n");
        Ok(())
    }

    /// Render templates into the response.
    pub fn template<T: Serialize>(&mut self, names: &[&str], data: &T) -> Result<(), AppError> {
        let data = serde_json::to_value(data)?;
        let html = self.services.templates.render(names, &data)?;
        self.write_html(&html);
        Ok(())
    }

    /// Render templates using a different variable delimiter pair.
    pub fn template_with<T: Serialize>(
        &mut self,
        names: &[&str],
        data: &T,
        delimiters: &Delimiters,
    ) -> Result<(), AppError> {
        let data = serde_json::to_value(data)?;
        let html = self.services.templates.render_with(names, &data, delimiters)?;
        self.write_html(&html);
        Ok(())
    }

    fn write_html(&mut self, html: &[u8]) {
        self.sink
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
        self.sink.write(html);
    }

    /// 302 to `location`.
    pub fn redirect(&mut self, location: &str) -> Result<(), AppError> {
        self.redirect_with(StatusCode::FOUND, location)
    }

    /// 301 to `location`.
    pub fn redirect_permanently(&mut self, location: &str) -> Result<(), AppError> {
        self.redirect_with(StatusCode::MOVED_PERMANENTLY, location)
    }

    fn redirect_with(&mut self, status: StatusCode, location: &str) -> Result<(), AppError> {
        let value = HeaderValue::from_str(location).map_err(AppError::internal)?;
        self.sink.headers_mut().insert(LOCATION, value);
        self.sink.set_status(status);
        Ok(())
    }

    // Collaborators.

    pub fn session(&self) -> &Session {
        &*self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut *self.session
    }

    pub fn storage(&self) -> &dyn Storage {
        self.services.storage.as_ref()
    }

    pub fn tasks(&self) -> &dyn TaskQueue {
        self.services.tasks.as_ref()
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.services.templates.as_ref()
    }

    /// The failure being handled, inside an error handler.
    pub fn failure(&self) -> Option<&StructuredFailure> {
        self.failure
    }
}
