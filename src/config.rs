//! Environment configuration.
//!
//! | Variable           | Default                                       |
//! |--------------------|-----------------------------------------------|
//! | `SERVER_PORT`      | `8080`                                        |
//! | `READ_TIMEOUT`     | `15s`                                         |
//! | `WRITE_TIMEOUT`    | `15s`                                         |
//! | `IDLE_TIMEOUT`     | `60s`                                         |
//! | `SHUTDOWN_TIMEOUT` | `15s`                                         |
//! | `ALLOWED_ORIGINS`  | `http://localhost:3000,http://localhost:8080` |
//! | `TEST_MODE`        | `false`                                       |
//!
//! Durations are written the way Go writes them: `15s`, `1m30s`, `250ms`,
//! `1.5h`. A value that does not parse is logged and the default is used;
//! configuration never stops the process from starting. A timeout of `0`
//! turns that limit off.

use std::env;
use std::fmt;
use std::time::Duration;

use tracing::warn;

const DEFAULT_PORT: &str = "8080";
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:8080";

/// Service configuration, read once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub allowed_origins: Vec<String>,
    /// Disables fault injection and simulated latency.
    pub test_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value. Lets tests supply an environment without touching the
    /// process-wide one.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let duration = |key: &str, default: Duration| match lookup(key) {
            None => default,
            Some(raw) => parse_duration(&raw).unwrap_or_else(|e| {
                warn!(key, value = %raw, error = %e, default = ?default, "invalid duration, using default");
                default
            }),
        };

        let test_mode = match lookup("TEST_MODE") {
            None => false,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(key = "TEST_MODE", value = %raw, "invalid boolean, using false");
                false
            }),
        };

        Self {
            port: lookup("SERVER_PORT").unwrap_or_else(|| DEFAULT_PORT.to_owned()),
            read_timeout: duration("READ_TIMEOUT", DEFAULT_READ_TIMEOUT),
            write_timeout: duration("WRITE_TIMEOUT", DEFAULT_WRITE_TIMEOUT),
            idle_timeout: duration("IDLE_TIMEOUT", DEFAULT_IDLE_TIMEOUT),
            shutdown_timeout: duration("SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT),
            allowed_origins: split_origins(
                lookup("ALLOWED_ORIGINS").as_deref().unwrap_or(DEFAULT_ORIGINS),
            ),
            test_mode,
        }
    }

    /// The listen address, all interfaces.
    pub fn addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn read_limit(&self) -> Option<Duration> {
        limit(self.read_timeout)
    }

    pub fn write_limit(&self) -> Option<Duration> {
        limit(self.write_timeout)
    }

    pub fn idle_limit(&self) -> Option<Duration> {
        limit(self.idle_timeout)
    }
}

/// Zero means unlimited.
fn limit(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

// ── Durations ─────────────────────────────────────────────────────────────────

/// Why a duration string was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DurationError {
    Empty,
    Negative,
    MissingUnit,
    UnknownUnit(String),
    Invalid,
}

impl fmt::Display for DurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty duration"),
            Self::Negative => f.write_str("negative duration"),
            Self::MissingUnit => f.write_str("missing unit in duration"),
            Self::UnknownUnit(u) => write!(f, "unknown unit {u:?} in duration"),
            Self::Invalid => f.write_str("invalid duration"),
        }
    }
}

impl std::error::Error for DurationError {}

/// Parses a Go-style duration: a sequence of decimal numbers, each with an
/// optional fraction and a unit (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`).
/// A bare `0` is allowed. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    let s = match s.as_bytes().first() {
        None => return Err(DurationError::Empty),
        Some(b'-') => return Err(DurationError::Negative),
        Some(b'+') => &s[1..],
        Some(_) => s,
    };
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(DurationError::Invalid);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(DurationError::Invalid);
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "" => return Err(DurationError::MissingUnit),
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3600 * 1_000_000_000,
            other => return Err(DurationError::UnknownUnit(other.to_owned())),
        };

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| DurationError::Invalid)? };
        let mut nanos = whole.checked_mul(scale).ok_or(DurationError::Invalid)?;
        // Fraction digits past nanosecond precision are dropped.
        let mut place = scale;
        for digit in frac.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            nanos += u128::from(digit - b'0') * place;
        }
        total = total.checked_add(nanos).ok_or(DurationError::Invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| DurationError::Invalid)?;
    // Always below one billion.
    let subsec = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}
