//! Minimal cookie handling.
//!
//! # Responsibilities
//! - Read a named cookie from the `Cookie` request headers
//! - Serialize `Set-Cookie` response headers

use axum::http::header::{InvalidHeaderValue, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};

/// Value of the named request cookie.
///
/// When the name appears more than once the last occurrence wins.
pub fn request_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .last()
}

/// A `Set-Cookie` header under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    path: Option<String>,
    max_age: Option<u64>,
    http_only: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = Some(secs);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Render the header value.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        HeaderValue::from_str(&out)
    }

    /// Append as a `Set-Cookie` header, keeping any cookies already set.
    pub fn append_to(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        headers.append(SET_COOKIE, self.to_header_value()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; XSRF-TOKEN=abc; b=2"));
        assert_eq!(request_cookie(&headers, "XSRF-TOKEN"), Some("abc"));
        assert_eq!(request_cookie(&headers, "b"), Some("2"));
        assert_eq!(request_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_last_occurrence_wins_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("t=first"));
        headers.append(COOKIE, HeaderValue::from_static("t=second"));
        assert_eq!(request_cookie(&headers, "t"), Some("second"));
    }

    #[test]
    fn test_set_cookie_rendering() {
        let cookie = SetCookie::new("session", "xyz")
            .path("/")
            .max_age(604800)
            .http_only();
        assert_eq!(
            cookie.to_header_value().unwrap(),
            "session=xyz; Path=/; Max-Age=604800; HttpOnly"
        );
    }

    #[test]
    fn test_append_keeps_existing_cookies() {
        let mut headers = HeaderMap::new();
        SetCookie::new("a", "1").append_to(&mut headers).unwrap();
        SetCookie::new("b", "2").append_to(&mut headers).unwrap();
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }
}
