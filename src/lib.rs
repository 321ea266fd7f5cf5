//! # demo-web-service
//!
//! A small JSON API over hyper. It serves a handful of user endpoints and
//! fails at random so the plumbing around it has something to do.
//!
//! ## What is in the box
//!
//! - Radix-tree routing via [`matchit`], one tree per method; a GET to any
//!   unclaimed path lands on the home handler, other methods get a 405 in
//!   the service's JSON error shape
//! - An access log line per request carrying the status that was actually
//!   sent ([`StatusRecorder`])
//! - Panic and fault recovery: one generic 500, full stack trace in the log,
//!   and the server keeps serving
//! - Fault injection behind [`FaultPolicy`]; test mode swaps in
//!   [`NoFaults`](fault::NoFaults) and every response is deterministic
//! - Graceful shutdown on SIGTERM / Ctrl-C, bounded by a deadline
//!
//! ## Request pipeline
//!
//! ```text
//! hyper ─► Logging ─► Cors ─► Timeout ─► Recovery ─► Router ─► handler
//! ```
//!
//! Handlers return a [`Response`] value, or `Err(Fault)` for something they
//! could not answer. The router writes the response into a
//! [`ResponseWriter`]; the middleware around it watches or repairs what gets
//! written.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use demo_web_service::{app, Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), demo_web_service::Error> {
//!     let config = Config::from_env();
//!     let addr = "127.0.0.1:8080".parse().unwrap();
//!     Server::bind(addr, app::build(&config)).await?.serve().await?;
//!     Ok(())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod service;
mod writer;

pub mod api;
pub mod app;
pub mod config;
pub mod fault;
pub mod middleware;
pub mod models;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Fault};
pub use fault::FaultPolicy;
pub use handler::Handler;
pub use request::Request;
pub use response::{ContentType, IntoOutcome, Outcome, Response};
pub use router::Router;
pub use server::{Server, ShutdownOutcome, State, Timeouts};
pub use service::{ServeFuture, Service};
pub use writer::{BufferedWriter, ResponseWriter, StatusRecorder};
