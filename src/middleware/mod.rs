//! Middleware layer.
//!
//! Each middleware wraps an inner [`Service`](crate::Service) and is a
//! `Service` itself. The application stack, outermost first:
//!
//! ```text
//! Logging ─► Cors ─► Timeout ─► Recovery ─► Router ─► handler
//! ```
//!
//! Everything that can rewrite the status (Timeout, Recovery) sits inside
//! Logging, so the access log shows the status that was actually sent.
//! Timeout and Recovery restore the headers set outside them before writing
//! their own response, so CORS headers reach the client on a 500 or 503.

mod cors;
mod logging;
mod recovery;
mod timeout;

pub use cors::Cors;
pub use logging::Logging;
pub use recovery::{Fatal, Recovery, guard, install_panic_hook};
pub use timeout::Timeout;
