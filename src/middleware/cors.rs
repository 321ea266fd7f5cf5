//! Cross-origin resource sharing.
//!
//! Requests without an `Origin` header pass straight through. An allowed
//! origin is echoed back in `access-control-allow-origin` together with
//! `vary: origin`; a disallowed one gets no CORS headers and the browser
//! blocks the response itself.
//!
//! Preflight requests (`OPTIONS` carrying `access-control-request-method`)
//! never reach the router: 204 for an allowed origin, 403 otherwise.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::request::Request;
use crate::response::Response;
use crate::service::{ServeFuture, Service};
use crate::writer::ResponseWriter;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "content-type";
const PREFLIGHT_MAX_AGE: &str = "3600";

/// CORS middleware over an origin allow-list. `"*"` allows every origin.
pub struct Cors<S> {
    inner: S,
    origins: Vec<String>,
}

impl<S> Cors<S> {
    pub fn new(inner: S, origins: Vec<String>) -> Self {
        Self { inner, origins }
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o == origin)
    }
}

fn allow_origin(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.append(VARY, HeaderValue::from_static("origin"));
}

fn is_preflight(req: &Request) -> bool {
    *req.method() == Method::OPTIONS && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

impl<S: Service> Service for Cors<S> {
    fn serve<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a> {
        Box::pin(async move {
            let Some(origin) = req.headers().get(ORIGIN).cloned() else {
                return self.inner.serve(req, w).await;
            };
            let allowed = origin.to_str().is_ok_and(|o| self.is_allowed(o));

            if is_preflight(&req) {
                if !allowed {
                    warn!(origin = ?origin, "CORS preflight: origin not allowed");
                    Response::error(StatusCode::FORBIDDEN, "Origin not allowed").write_to(w);
                    return Ok(());
                }
                debug!(origin = ?origin, "CORS preflight accepted");
                let headers = w.headers_mut();
                allow_origin(headers, origin);
                headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
                headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
                Response::empty(StatusCode::NO_CONTENT).write_to(w);
                return Ok(());
            }

            if allowed {
                allow_origin(w.headers_mut(), origin);
            } else {
                debug!(origin = ?origin, "CORS: origin not allowed, no headers added");
            }
            self.inner.serve(req, w).await
        })
    }
}
