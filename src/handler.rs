//! Route handlers.
//!
//! A handler is any `async` function or closure taking a [`Request`]. It
//! answers with either a bare [`Response`](crate::Response) or an
//! [`Outcome`], which is `Result<Response, Fault>`:
//!
//! - `Ok(response)`: the router writes it, whatever its status. Client
//!   mistakes and simulated backend failures are answered this way.
//! - `Err(fault)`: the handler could not produce any answer. The router
//!   passes the fault up untouched and [`Recovery`](crate::middleware::Recovery)
//!   logs it with its backtrace and answers a generic 500.
//!
//! Both shapes are normalised to an `Outcome` when the route is registered,
//! so the router stores one kind of value per route: a [`Route`] behind an
//! `Arc`. Handlers that need state capture an `Arc`; see
//! [`api::routes`](crate::api::routes).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoOutcome, Outcome};

pub(crate) type RouteFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// A registered route, whatever the handler behind it returns.
#[doc(hidden)]
pub trait Route {
    fn run(&self, req: Request) -> RouteFuture;
}

#[doc(hidden)]
pub type SharedRoute = Arc<dyn Route + Send + Sync + 'static>;

/// Implemented for every function or closure shaped like
///
/// ```text
/// Fn(Request) -> impl Future<Output = Response | Result<Response, Fault>>
/// ```
///
/// Sealed; [`IntoOutcome`] decides which outputs qualify.
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_route(self) -> SharedRoute;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut, R> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_route(self) -> SharedRoute {
        Arc::new(Normalised(self))
    }
}

/// Wraps a handler so its output always comes back as an [`Outcome`].
struct Normalised<F>(F);

impl<F, Fut, R> Route for Normalised<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn run(&self, req: Request) -> RouteFuture {
        let answer = (self.0)(req);
        Box::pin(async move { answer.await.into_outcome() })
    }
}
