//! Panic and fault recovery.
//!
//! Two boundaries live here:
//!
//! - [`Recovery`], per request. A panic or a [`Fault`](crate::Fault) from the
//!   inner service is logged with its stack trace and answered with a
//!   generic 500. The connection and the process carry on.
//! - [`guard`], per process. Wraps startup and the serve loop; a failure
//!   there is logged and reported as [`Fatal`] so `main` can exit non-zero.
//!
//! A panic's stack is gone by the time `catch_unwind` returns, so
//! [`install_panic_hook`] records a backtrace at the panic site into a
//! thread-local. The unwind is caught on the same thread that panicked, which
//! is where the recovery code picks it up.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::FutureExt;
use tracing::{error, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::service::{ServeFuture, Service};
use crate::writer::ResponseWriter;

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a panic hook that records the backtrace at the panic site.
///
/// Idempotent. The previously installed hook still runs afterwards.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Backtrace of the latest panic on this thread, or one taken here when the
/// hook is not installed.
fn panic_trace() -> String {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ── Per-request recovery ──────────────────────────────────────────────────────

/// Turns panics and faults from the inner service into a 500.
pub struct Recovery<S> {
    inner: S,
}

impl<S> Recovery<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Service> Service for Recovery<S> {
    fn serve<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a> {
        Box::pin(async move {
            let method = req.method().clone();
            let url = req.uri().to_string();
            // What the layers outside set; the 500 keeps it and drops the rest.
            let outer = w.headers_mut().clone();

            let caught = AssertUnwindSafe(self.inner.serve(req, &mut *w)).catch_unwind().await;

            match caught {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(fault)) => {
                    error!(
                        error = %fault,
                        url = %url,
                        method = %method,
                        stack_trace = %fault.backtrace(),
                        "HTTP handler fault recovered"
                    );
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        error = %format!("panic in HTTP handler: {message}"),
                        panic = %message,
                        url = %url,
                        method = %method,
                        stack_trace = %panic_trace(),
                        "HTTP handler panic recovered"
                    );
                }
            }

            if w.is_committed() {
                warn!(url = %url, "response already started, cannot replace it with a 500");
            } else {
                *w.headers_mut() = outer;
                Response::internal_error().write_to(w);
            }
            Ok(())
        })
    }
}

// ── Process guard ─────────────────────────────────────────────────────────────

/// Why the process has to stop.
#[derive(Debug)]
pub enum Fatal {
    Failed(Error),
    Panicked { message: String },
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e}"),
            Self::Panicked { message } => write!(f, "panic recovered: {message}"),
        }
    }
}

impl std::error::Error for Fatal {}

/// Runs `f` and logs anything that should end the process.
///
/// Both an `Err` and a panic come back as `Err(Fatal)`; the caller exits
/// with a non-zero status.
pub fn guard<T, F>(f: F) -> Result<T, Fatal>
where
    F: FnOnce() -> Result<T, Error>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(error = %e, "Server failed");
            Err(Fatal::Failed(e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                error = %format!("panic recovered: {message}"),
                panic = %message,
                stack_trace = %panic_trace(),
                "PANIC RECOVERED"
            );
            Err(Fatal::Panicked { message })
        }
    }
}
