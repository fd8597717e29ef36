//! Response buffering.
//!
//! # Responsibilities
//! - Abstract the real response surface behind [`Transport`]
//! - Defer body bytes until the request outcome is known
//! - Let an error handler replace partial output before anything is sent
//!
//! # Design Decisions
//! - Status and headers pass straight through to the transport; only the
//!   body is held back, so collaborators see headers immediately
//! - `commit` consumes the sink, so a second commit cannot be expressed

use std::io;

use axum::body::Bytes;
use axum::http::{HeaderMap, Response, StatusCode};

/// The write surface of an outgoing response.
pub trait Transport {
    fn status(&self) -> StatusCode;
    fn set_status(&mut self, status: StatusCode);
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// In-memory transport that becomes an HTTP response.
#[derive(Debug, Default)]
pub struct ResponseTransport {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Transport for ResponseTransport {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}

/// Holds body bytes back from a [`Transport`] until [`commit`](Self::commit).
#[derive(Debug)]
pub struct BufferedResponseSink<T: Transport = ResponseTransport> {
    transport: T,
    buffer: Vec<u8>,
}

impl Default for BufferedResponseSink<ResponseTransport> {
    fn default() -> Self {
        Self::new(ResponseTransport::new())
    }
}

impl<T: Transport> BufferedResponseSink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.transport.status()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.transport.set_status(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        self.transport.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.transport.headers_mut()
    }

    /// Append to the pending body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop everything buffered so far. Headers and status are untouched.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    /// Flush the buffered body to the transport in one write and hand the
    /// transport back.
    pub fn commit(mut self) -> io::Result<T> {
        if !self.buffer.is_empty() {
            self.transport.write_body(&self.buffer)?;
        }
        Ok(self.transport)
    }
}

impl<T: Transport> io::Write for BufferedResponseSink<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
