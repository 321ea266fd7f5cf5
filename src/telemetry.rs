//! Log subscriber setup.
//!
//! Every record is one JSON object on stdout, written in a single call, so
//! concurrent requests never interleave inside a line. `RUST_LOG` overrides
//! the level chosen from `APP_ENV`.

use std::env;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::Error;

/// Output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Adds file and line to each record.
    pub include_location: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// `APP_ENV=production` logs at info without source locations; anything
    /// else logs at debug with them.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let production = lookup("APP_ENV").is_some_and(|v| v == "production");
        Self {
            level: if production { Level::INFO } else { Level::DEBUG },
            format: lookup("LOG_FORMAT").map_or(LogFormat::Json, |f| LogFormat::parse(&f)),
            include_location: !production,
        }
    }
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init(config: &LogConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Telemetry(e.to_string()))
}
