//! Response writers.
//!
//! A [`ResponseWriter`] is the output side of one request. The status may be
//! written any number of times until the first body write; after that the
//! head is *committed* and further status writes are ignored. Last write
//! before the commit wins.
//!
//! ```text
//! Logging ──► StatusRecorder ──► BufferedWriter ──► hyper
//!                 │ records            │ owns status, headers, body
//!                 ▼
//!            status() for the log line
//! ```

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

/// Output capability handed to every [`Service`](crate::Service).
///
/// `Send` so a `&mut dyn ResponseWriter` can be held across `.await`.
pub trait ResponseWriter: Send {
    /// Response headers. Changes after the commit are not sent.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the status line. Ignored once the head is committed.
    fn write_status(&mut self, status: StatusCode);

    /// Appends body bytes, committing the head on the first call (even when
    /// `chunk` is empty).
    fn write(&mut self, chunk: &[u8]);

    /// Whether the head has been committed.
    fn is_committed(&self) -> bool;
}

// ── BufferedWriter ────────────────────────────────────────────────────────────

/// The transport-side writer: collects one response and hands it to hyper.
#[derive(Debug)]
pub struct BufferedWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    committed: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Finishes the exchange. Headers are frozen at the commit point, so a
    /// header added afterwards would never reach a streaming transport; it
    /// does not reach this one either.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for BufferedWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.committed {
            warn!(
                sent = self.status.as_u16(),
                ignored = status.as_u16(),
                "superfluous status write after response was committed"
            );
            return;
        }
        self.status = status;
    }

    fn write(&mut self, chunk: &[u8]) {
        self.committed = true;
        self.body.extend_from_slice(chunk);
    }

    fn is_committed(&self) -> bool {
        self.committed
    }
}

// ── StatusRecorder ────────────────────────────────────────────────────────────

/// Decorates another writer and remembers the status it was given.
///
/// Forwards every call unchanged. The recorded status follows the same
/// commit rule as the writer underneath, so it always equals what goes out
/// on the wire. Defaults to `200 OK` when the handler never sets one.
pub struct StatusRecorder<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: StatusCode,
}

impl<'a> StatusRecorder<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, status: StatusCode::OK }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl ResponseWriter for StatusRecorder<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if !self.inner.is_committed() {
            self.status = status;
        }
        self.inner.write_status(status);
    }

    fn write(&mut self, chunk: &[u8]) {
        self.inner.write(chunk);
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ok_when_status_is_never_written() {
        let mut buf = BufferedWriter::new();
        let mut rec = StatusRecorder::new(&mut buf);
        rec.write(b"hello");
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(buf.status(), StatusCode::OK);
        assert_eq!(buf.body(), b"hello");
    }

    #[test]
    fn records_explicit_status() {
        let mut buf = BufferedWriter::new();
        let mut rec = StatusRecorder::new(&mut buf);
        rec.write_status(StatusCode::NOT_FOUND);
        rec.write(b"");
        let recorded = rec.status();
        assert_eq!(recorded, StatusCode::NOT_FOUND);
        assert_eq!(buf.into_http().status(), recorded);
    }

    #[test]
    fn last_status_before_commit_wins() {
        let mut buf = BufferedWriter::new();
        let mut rec = StatusRecorder::new(&mut buf);
        rec.write_status(StatusCode::CREATED);
        rec.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        rec.write(b"{}");
        assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(buf.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_after_commit_is_ignored_by_both() {
        let mut buf = BufferedWriter::new();
        let mut rec = StatusRecorder::new(&mut buf);
        rec.write_status(StatusCode::ACCEPTED);
        rec.write(b"partial");
        rec.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(rec.is_committed());
        assert_eq!(rec.status(), StatusCode::ACCEPTED);
        assert_eq!(buf.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn headers_are_forwarded() {
        let mut buf = BufferedWriter::new();
        let mut rec = StatusRecorder::new(&mut buf);
        rec.headers_mut()
            .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
        rec.write(b"{}");
        let res = buf.into_http();
        assert_eq!(res.headers()[http::header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn recorders_can_be_stacked() {
        let mut buf = BufferedWriter::new();
        let mut outer = StatusRecorder::new(&mut buf);
        let outer_status = {
            let mut inner = StatusRecorder::new(&mut outer);
            inner.write_status(StatusCode::SERVICE_UNAVAILABLE);
            inner.write(b"x");
            inner.status()
        };
        assert_eq!(outer_status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(outer.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
