//! Unified error types.
//!
//! Two kinds of failure exist and they never mix:
//!
//! - [`Error`]: infrastructure, such as binding the port or installing the
//!   log subscriber. These end the process.
//! - [`Fault`]: something went wrong *inside* a handler that the handler
//!   could not answer itself. Faults travel up as values to the recovery
//!   middleware, which logs them and answers `500`.
//!
//! Client mistakes (bad id, empty body) are neither. They are answered on the
//! spot as JSON error responses.

use std::backtrace::Backtrace;
use std::fmt;
use std::net::{AddrParseError, SocketAddr};

/// The error type returned by the crate's fallible infrastructure operations.
#[derive(Debug)]
pub enum Error {
    /// The listener could not bind, e.g. the port is already in use.
    Bind { addr: SocketAddr, source: std::io::Error },
    /// The configured listen address is not a valid `host:port`.
    InvalidAddr { addr: String, source: AddrParseError },
    Io(std::io::Error),
    /// The accept loop task panicked or was cancelled.
    Task(tokio::task::JoinError),
    /// A global tracing subscriber was already installed.
    Telemetry(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            Self::InvalidAddr { addr, source } => write!(f, "invalid listen address {addr:?}: {source}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Task(e) => write!(f, "accept task failed: {e}"),
            Self::Telemetry(msg) => write!(f, "telemetry: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::InvalidAddr { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Task(e) => Some(e),
            Self::Telemetry(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e)
    }
}

// ── Fault ─────────────────────────────────────────────────────────────────────

/// An unexpected failure inside a handler.
///
/// A backtrace is captured where the fault is created, so the recovery
/// middleware can log where it came from, not where it was caught.
pub struct Fault {
    message: String,
    backtrace: Backtrace,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault").field("message", &self.message).finish_non_exhaustive()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fault {}

impl From<serde_json::Error> for Fault {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("failed to encode JSON response: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_the_address() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let err = Error::Bind {
            addr,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:8080"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_addr_keeps_the_parse_error() {
        let addr = "0.0.0.0:http".to_owned();
        let source = addr.parse::<SocketAddr>().unwrap_err();
        let err = Error::InvalidAddr { addr, source };
        assert!(err.to_string().starts_with("invalid listen address \"0.0.0.0:http\""));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn fault_displays_its_message_and_keeps_a_backtrace() {
        let fault = Fault::new("disk on fire");
        assert_eq!(fault.to_string(), "disk on fire");
        assert!(!fault.backtrace().to_string().is_empty());
    }
}
