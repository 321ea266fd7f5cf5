//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is the
//! innermost [`Service`]: it finds the handler, runs it, and writes the
//! response it returns. A fault from the handler is passed up untouched.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::handler::{Handler, SharedRoute};
use crate::request::Request;
use crate::response::Response;
use crate::service::{ServeFuture, Service};
use crate::writer::ResponseWriter;

/// The application router.
///
/// Build it once at startup; each [`Router::on`] call returns `self` so
/// registrations chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<SharedRoute>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` reads them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup, so this is a
    /// programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_route())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(SharedRoute, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((route, params))
    }

    /// Methods that do have a route for `path`, in a stable order.
    fn allowed_methods(&self, path: &str) -> Vec<&str> {
        let mut methods: Vec<&str> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        methods.sort_unstable();
        methods
    }

    fn unmatched(&self, req: &Request) -> Response {
        let allowed = self.allowed_methods(req.path());
        if allowed.is_empty() {
            debug!(method = %req.method(), path = req.path(), "no route");
            return Response::error(StatusCode::NOT_FOUND, "Resource not found");
        }

        let res = Response::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        match HeaderValue::from_str(&allowed.join(", ")) {
            Ok(value) => res.with_header(ALLOW, value),
            Err(_) => res,
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Service for Router {
    fn serve<'a>(&'a self, mut req: Request, w: &'a mut dyn ResponseWriter) -> ServeFuture<'a> {
        Box::pin(async move {
            let response = match self.lookup(req.method(), req.path()) {
                Some((route, params)) => {
                    req.set_params(params);
                    route.run(req).await?
                }
                None => self.unmatched(&req),
            };
            response.write_to(w);
            Ok(())
        })
    }
}
