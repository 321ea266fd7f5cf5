//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// An incoming HTTP request with its body already read.
///
/// Owned by the connection task for the duration of one call; dropped as
/// soon as the response is produced.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: SocketAddr,
    params: HashMap<String, String>,
}

impl Request {
    /// Builds a request from an `http` request whose body has been collected.
    pub fn from_http(req: http::Request<Bytes>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr,
            params: HashMap::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// Header lookup. Values that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/api/users/{id}`, `req.param("id")` on `/api/users/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(builder: http::request::Builder) -> Request {
        let addr: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        Request::from_http(builder.body(Bytes::new()).unwrap(), addr)
    }

    #[test]
    fn exposes_path_without_query() {
        let req = request(http::Request::builder().uri("/api/users?page=2"));
        assert_eq!(req.path(), "/api/users");
        assert_eq!(req.uri().query(), Some("page=2"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request(http::Request::builder().uri("/").header("User-Agent", "curl/8.0"));
        assert_eq!(req.header("user-agent"), Some("curl/8.0"));
        assert_eq!(req.user_agent(), "curl/8.0");
    }

    #[test]
    fn missing_user_agent_is_empty() {
        let req = request(http::Request::builder().uri("/"));
        assert_eq!(req.user_agent(), "");
        assert_eq!(req.remote_addr().to_string(), "10.0.0.7:5555");
    }
}
