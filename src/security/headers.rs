//! Default response headers.
//!
//! # Responsibilities
//! - Disable intermediary and browser caching of dynamic responses
//! - Opt legacy browsers into their modern rendering engine
//!
//! # Design Decisions
//! - Applied before the handler runs, so a handler can overwrite any of them

use axum::http::header::{CACHE_CONTROL, EXPIRES};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_UA_COMPATIBLE: HeaderName = HeaderName::from_static("x-ua-compatible");

const NO_CACHE: &str = "max-age=0,no-cache,no-store,post-check=0,pre-check=0";
const EXPIRED: &str = "Mon, 26 Jul 1997 05:00:00 GMT";

/// Insert the default headers, replacing existing values.
pub fn apply_default_headers(headers: &mut HeaderMap) {
    headers.insert(X_UA_COMPATIBLE, HeaderValue::from_static("chrome=1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(EXPIRES, HeaderValue::from_static(EXPIRED));
}
