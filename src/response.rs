//! Outgoing HTTP response values.
//!
//! Route handlers build a [`Response`] and return it. The router then writes
//! it into the request's [`ResponseWriter`] in one go: status, headers, body.
//! Every JSON error in the service goes through [`Response::error`] so the
//! error shape stays `{"status":"error","message":…}` everywhere.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::error::Fault;
use crate::models::ErrorBody;
use crate::writer::ResponseWriter;

/// What a route handler produces: a response, or a fault for the recovery
/// middleware to deal with.
pub type Outcome = Result<Response, Fault>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types the service emits.
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Json, // application/json
    Text, // text/plain; charset=utf-8
}

impl ContentType {
    fn header_value(self) -> HeaderValue {
        match self {
            Self::Json => HeaderValue::from_static("application/json"),
            Self::Text => HeaderValue::from_static("text/plain; charset=utf-8"),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use demo_web_service::Response;
/// use http::StatusCode;
///
/// let ok = Response::json(StatusCode::OK, &serde_json::json!({"status": "healthy"}));
/// let err = Response::error(StatusCode::BAD_REQUEST, "Empty request body");
/// let bare = Response::empty(StatusCode::NO_CONTENT);
/// # let _ = (ok, err, bare);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Serialises `value` as the JSON body.
    ///
    /// Encoding can only fail for values serde cannot represent; that is a
    /// programming error, so it surfaces as a [`Fault`].
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Self, Fault> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::with_body(status, ContentType::Json, body.into()))
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::with_body(status, ContentType::Text, Bytes::from(body.into()))
    }

    /// Response with no body.
    pub fn empty(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// The service-wide error shape: `{"status":"error","message":…}`.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(status = status.as_u16(), message = %message, "Sending error response");

        // Two string fields always serialise.
        let body = serde_json::to_vec(&ErrorBody::new(&message)).unwrap_or_default();
        Self::with_body(status, ContentType::Json, body.into())
    }

    /// Generic 500 that leaks nothing about the cause.
    pub fn internal_error() -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    /// Adds a header, replacing any previous value with the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
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

    fn with_body(status: StatusCode, content_type: ContentType, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, content_type.header_value());
        Self { status, headers, body }
    }

    /// Writes the whole response into `w`. Headers are merged over whatever
    /// the writer already holds; the status goes out before the body.
    pub fn write_to(self, w: &mut dyn ResponseWriter) {
        let target = w.headers_mut();
        let mut current: Option<HeaderName> = None;
        for (name, value) in self.headers {
            // HeaderMap's owned iterator yields `None` for the extra values
            // of the previous name.
            match name {
                Some(name) => {
                    target.insert(name.clone(), value);
                    current = Some(name);
                }
                None => {
                    if let Some(name) = &current {
                        target.append(name.clone(), value);
                    }
                }
            }
        }
        w.write_status(self.status);
        w.write(&self.body);
    }
}

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion into a handler [`Outcome`].
///
/// Lets a handler return a bare [`Response`] when it cannot fault, or
/// `Result<Response, Fault>` when it can.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Outcome { self }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BufferedWriter;

    #[test]
    fn error_has_the_service_wide_shape() {
        let res = Response::error(StatusCode::BAD_REQUEST, "Empty request body");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, serde_json::json!({"status": "error", "message": "Empty request body"}));
    }

    #[test]
    fn internal_error_is_generic() {
        let res = Response::internal_error();
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[test]
    fn write_to_sends_status_headers_and_body() {
        let mut w = BufferedWriter::new();
        Response::json(StatusCode::CREATED, &serde_json::json!({"id": 3}))
            .unwrap()
            .with_header(http::header::LOCATION, HeaderValue::from_static("/api/users/3"))
            .write_to(&mut w);

        assert!(w.is_committed());
        let res = w.into_http();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(res.headers()[http::header::LOCATION], "/api/users/3");
    }

    #[test]
    fn write_to_replaces_headers_already_on_the_writer() {
        let mut w = BufferedWriter::new();
        w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Response::text(StatusCode::OK, "hi").write_to(&mut w);
        assert_eq!(w.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(w.body(), b"hi");
    }

    #[test]
    fn empty_response_still_commits() {
        let mut w = BufferedWriter::new();
        Response::empty(StatusCode::NO_CONTENT).write_to(&mut w);
        assert!(w.is_committed());
        assert_eq!(w.status(), StatusCode::NO_CONTENT);
    }
}
