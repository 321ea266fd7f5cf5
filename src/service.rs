//! The request pipeline's common shape.
//!
//! Everything between the connection and the route handler (the router and
//! each middleware) is a [`Service`]: it takes the request by value and
//! writes the answer into a borrowed [`ResponseWriter`]. Middleware wraps
//! another `Service` and is one itself, so layers nest like
//! `Logging<Cors<Timeout<Recovery<Router>>>>`.
//!
//! `Err(Fault)` is how a layer says "I could not answer this". The recovery
//! middleware is the one place that turns it into a response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Fault;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Future returned by [`Service::serve`]; borrows the service and the writer.
pub type ServeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Fault>> + Send + 'a>>;

pub trait Service: Send + Sync + 'static {
    fn serve<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a>;
}

impl<S: Service + ?Sized> Service for Arc<S> {
    fn serve<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a> {
        (**self).serve(req, w)
    }
}
