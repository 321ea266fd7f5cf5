//! Access log: one structured record per request, emitted after it finishes.

use std::time::Instant;

use http::StatusCode;
use tracing::{error, info};

use crate::request::Request;
use crate::service::{ServeFuture, Service};
use crate::writer::{ResponseWriter, StatusRecorder};

/// Logs method, path, status, duration, client address and user agent.
///
/// The inner service writes through a [`StatusRecorder`], so the logged
/// status is the one that went out.
pub struct Logging<S> {
    inner: S,
}

impl<S> Logging<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Service> Service for Logging<S> {
    fn serve<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let method = req.method().clone();
            let path = req.path().to_owned();
            let remote_addr = req.remote_addr();
            let user_agent = req.user_agent().to_owned();

            let mut recorder = StatusRecorder::new(w);
            let result = self.inner.serve(req, &mut recorder).await;
            let duration = started.elapsed();

            match &result {
                Ok(()) => info!(
                    method = %method,
                    path = %path,
                    status = recorder.status().as_u16(),
                    duration = ?duration,
                    ip = %remote_addr,
                    user_agent = %user_agent,
                    "Request completed"
                ),
                // Nothing below turned the fault into a response; the server
                // answers 500 unless the head already went out.
                Err(fault) => {
                    let status = if recorder.is_committed() {
                        recorder.status()
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    };
                    error!(
                        method = %method,
                        path = %path,
                        status = status.as_u16(),
                        duration = ?duration,
                        ip = %remote_addr,
                        user_agent = %user_agent,
                        error = %fault,
                        "Request failed"
                    );
                }
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use http::Method;
    use serde_json::Value;

    use super::*;
    use crate::error::Fault;
    use crate::middleware::{Recovery, Timeout};
    use crate::response::Response;
    use crate::router::Router;
    use crate::writer::BufferedWriter;

    /// Collects JSON log lines written by a scoped subscriber.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let sink = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_writer(move || sink.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn records(&self, message: &str) -> Vec<Value> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter_map(|line| serde_json::from_str::<Value>(line).ok())
                .filter(|record| record["fields"]["message"] == message)
                .collect()
        }
    }

    fn request(uri: &str) -> Request {
        let req = http::Request::builder()
            .uri(uri)
            .header("user-agent", "curl/8.5.0")
            .body(Bytes::new())
            .unwrap();
        Request::from_http(req, "192.0.2.1:4000".parse().unwrap())
    }

    async fn teapot(_req: Request) -> Response {
        Response::error(StatusCode::IM_A_TEAPOT, "short and stout")
    }

    async fn explode(_req: Request) -> Response {
        panic!("kaboom")
    }

    async fn stall(_req: Request) -> Response {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Response::text(StatusCode::OK, "too late")
    }

    async fn fail(_req: Request) -> Result<Response, Fault> {
        Err(Fault::new("lost the plot"))
    }

    #[tokio::test]
    async fn logs_one_record_with_the_sent_status() {
        let capture = Capture::default();
        let _guard = capture.install();

        let app = Logging::new(Router::new().on(Method::GET, "/teapot", teapot));
        let mut w = BufferedWriter::new();
        app.serve(request("/teapot"), &mut w).await.unwrap();

        let logged = capture.records("Request completed");
        assert_eq!(logged.len(), 1);
        let fields = &logged[0]["fields"];
        assert_eq!(fields["status"], u64::from(w.status().as_u16()));
        assert_eq!(fields["status"], 418);
        assert_eq!(fields["method"], "GET");
        assert_eq!(fields["path"], "/teapot");
        assert_eq!(fields["ip"], "192.0.2.1:4000");
        assert_eq!(fields["user_agent"], "curl/8.5.0");
        assert!(fields["duration"].is_string());
    }

    #[tokio::test]
    async fn recovered_panic_is_logged_as_500() {
        let capture = Capture::default();
        let _guard = capture.install();

        let app = Logging::new(Recovery::new(Router::new().on(Method::GET, "/explode", explode)));
        let mut w = BufferedWriter::new();
        app.serve(request("/explode"), &mut w).await.unwrap();

        assert_eq!(w.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let logged = capture.records("Request completed");
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0]["fields"]["status"], 500);
    }

    #[tokio::test]
    async fn timed_out_request_is_logged_once_as_503() {
        let capture = Capture::default();
        let _guard = capture.install();

        let router = Router::new().on(Method::GET, "/stall", stall);
        let app = Logging::new(Timeout::new(router, Some(std::time::Duration::from_millis(50))));
        let mut w = BufferedWriter::new();
        app.serve(request("/stall"), &mut w).await.unwrap();

        assert_eq!(w.status(), StatusCode::SERVICE_UNAVAILABLE);
        let logged = capture.records("Request completed");
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0]["fields"]["status"], 503);
    }

    #[tokio::test]
    async fn fault_without_recovery_is_logged_as_500_and_passed_on() {
        let capture = Capture::default();
        let _guard = capture.install();

        let app = Logging::new(Router::new().on(Method::GET, "/fail", fail));
        let mut w = BufferedWriter::new();
        let fault = app.serve(request("/fail"), &mut w).await.unwrap_err();

        assert_eq!(fault.message(), "lost the plot");
        assert!(capture.records("Request completed").is_empty());
        let failed = capture.records("Request failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["fields"]["status"], 500);
        assert_eq!(failed[0]["fields"]["error"], "lost the plot");
    }
}
