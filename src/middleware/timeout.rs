//! Deadline for producing a response.
//!
//! Sits inside [`Logging`](super::Logging), so a request cut off here is
//! still logged, with the 503 it was answered with.

use std::time::Duration;

use http::StatusCode;
use tracing::warn;

use crate::request::Request;
use crate::response::Response;
use crate::service::{ServeFuture, Service};
use crate::writer::ResponseWriter;

/// Answers 503 when the inner service takes longer than `limit`.
///
/// `None` means no limit. A response whose head already went out is left as
/// it is; the client sees whatever was written before the deadline.
pub struct Timeout<S> {
    inner: S,
    limit: Option<Duration>,
}

impl<S> Timeout<S> {
    pub fn new(inner: S, limit: Option<Duration>) -> Self {
        Self { inner, limit }
    }
}

impl<S: Service> Service for Timeout<S> {
    fn serve<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a> {
        Box::pin(async move {
            let Some(limit) = self.limit else {
                return self.inner.serve(req, w).await;
            };
            let path = req.path().to_owned();
            // Headers from the layers outside this one survive the 503.
            let outer = w.headers_mut().clone();

            match tokio::time::timeout(limit, self.inner.serve(req, &mut *w)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(path = %path, timeout = ?limit, "write timeout exceeded");
                    if !w.is_committed() {
                        *w.headers_mut() = outer;
                        Response::error(StatusCode::SERVICE_UNAVAILABLE, "Request timed out").write_to(w);
                    }
                    Ok(())
                }
            }
        })
    }
}
