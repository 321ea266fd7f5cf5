//! HTTP server and graceful shutdown.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──bind──► Serving ──signal──► ShuttingDown ──drained / deadline──► Stopped
//! ```
//!
//! The accept loop runs in its own task; the task that called
//! [`Server::serve`] waits for the shutdown signal. On the signal:
//!
//! 1. The accept loop stops and the listener is dropped, so new connections
//!    are refused.
//! 2. Every open connection is told to finish. In-flight requests complete;
//!    idle keep-alive connections close.
//! 3. If that takes longer than the shutdown timeout (15 s by default), the
//!    remaining connections are aborted and a warning is logged. Shutdown
//!    still finishes.
//!
//! Kubernetes sends SIGTERM and waits `terminationGracePeriodSeconds`
//! (default 30 s) before SIGKILL, so the default shutdown timeout fits
//! inside it.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::service::Service;
use crate::writer::{BufferedWriter, ResponseWriter};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the server is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

/// How shutdown ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection finished before the deadline.
    Graceful,
    /// The deadline passed; `abandoned` connections were aborted.
    Forced { abandoned: usize },
}

/// Per-connection time limits. `None` turns a limit off.
///
/// The limit on producing a response is not here; it is the
/// [`Timeout`](crate::middleware::Timeout) middleware, inside the access log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Limit on reading a request head (HTTP/1).
    pub read: Option<Duration>,
    /// HTTP/2 keep-alive ping interval on idle connections.
    pub idle: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Some(Duration::from_secs(15)),
            idle: Some(Duration::from_secs(60)),
        }
    }
}

/// The HTTP server.
///
/// ```rust,no_run
/// use demo_web_service::{app, Config, Server};
///
/// # async fn run() -> Result<(), demo_web_service::Error> {
/// let config = Config::from_env();
/// let server = Server::bind("0.0.0.0:8080".parse().unwrap(), app::build(&config)).await?;
/// server.serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server<S> {
    listener: TcpListener,
    local_addr: SocketAddr,
    service: Arc<S>,
    timeouts: Timeouts,
    shutdown_timeout: Duration,
    state: watch::Sender<State>,
}

impl<S: Service> Server<S> {
    /// Binds the listener. A port already in use is [`Error::Bind`].
    pub async fn bind(addr: SocketAddr, service: S) -> Result<Self, Error> {
        let (state, _) = watch::channel(State::Starting);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            service: Arc::new(service),
            timeouts: Timeouts::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            state,
        })
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// How long shutdown waits for open connections before aborting them.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The bound address; useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Watches lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Serves until SIGINT or SIGTERM, then shuts down.
    pub async fn serve(self) -> Result<ShutdownOutcome, Error> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then shuts down.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<ShutdownOutcome, Error>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, local_addr, service, timeouts, shutdown_timeout, state } = self;

        let (stop_tx, stop_rx) = oneshot::channel();
        let builder = connection_builder(&timeouts);
        let mut accept = tokio::spawn(accept_loop(listener, service, builder, stop_rx));

        state.send_replace(State::Serving);
        info!(addr = %local_addr, "Server listening");

        tokio::pin!(signal);
        let joined = tokio::select! {
            () = &mut signal => {
                state.send_replace(State::ShuttingDown);
                info!("Server is shutting down...");
                // The accept loop may already be gone; its result is read below.
                let _ = stop_tx.send(());
                (&mut accept).await
            }
            // Only reachable if the accept loop panicked.
            res = &mut accept => {
                state.send_replace(State::ShuttingDown);
                res
            }
        };

        let (graceful, mut connections) = match joined {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "accept loop failed");
                state.send_replace(State::Stopped);
                return Err(e.into());
            }
        };

        let outcome = match tokio::time::timeout(shutdown_timeout, graceful.shutdown()).await {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(_) => {
                while connections.try_join_next().is_some() {}
                let abandoned = connections.len();
                warn!(abandoned, timeout = ?shutdown_timeout, "Server forced to shutdown");
                connections.abort_all();
                ShutdownOutcome::Forced { abandoned }
            }
        };
        while connections.join_next().await.is_some() {}

        state.send_replace(State::Stopped);
        info!("Server exited properly");
        Ok(outcome)
    }
}

fn connection_builder(timeouts: &Timeouts) -> ConnBuilder<TokioExecutor> {
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read);
    builder
        .http2()
        .timer(TokioTimer::new())
        .keep_alive_interval(timeouts.idle);
    builder
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts until `stop` fires, then drops the listener and hands back the
/// open connections for draining.
async fn accept_loop<S: Service>(
    listener: TcpListener,
    service: Arc<S>,
    builder: ConnBuilder<TokioExecutor>,
    mut stop: oneshot::Receiver<()>,
) -> (GracefulShutdown, JoinSet<()>) {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // Stop first, so a shutdown is not delayed by queued connections.
            biased;

            _ = &mut stop => break,

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!(error = %e, "accept error");
                        continue;
                    }
                };

                let service = Arc::clone(&service);
                // Called once per request on the connection.
                let svc = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    async move { dispatch(service, req, remote_addr).await }
                });

                let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());
                connections.spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(peer = %remote_addr, error = %e, "connection closed with error");
                    }
                });
            }

            // Reap finished connections so the set does not grow without bound.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    (graceful, connections)
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the service and produces the response hyper
/// sends. Every failure is answered here, so hyper never sees an error.
async fn dispatch<S: Service>(
    service: Arc<S>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let mut w = BufferedWriter::new();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, error = %e, "failed to read request body");
            Response::error(StatusCode::BAD_REQUEST, "Failed to read request body").write_to(&mut w);
            return Ok(w.into_http());
        }
    };
    let req = Request::from_http(http::Request::from_parts(parts, body), remote_addr);

    if let Err(fault) = service.serve(req, &mut w).await {
        error!(error = %fault, stack_trace = %fault.backtrace(), "fault reached the server");
        if !w.is_committed() {
            w.headers_mut().clear();
            Response::internal_error().write_to(&mut w);
        }
    }
    Ok(w.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM.
///
/// A signal that cannot be listened for is logged and ignored; the other one
/// still works. On non-Unix platforms only Ctrl-C is available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => info!(signal = "SIGINT", "shutdown signal received"),
        () = sigterm => info!(signal = "SIGTERM", "shutdown signal received"),
    }
}
