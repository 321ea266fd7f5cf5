//! JSON shapes on the wire.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Envelope for every successful user endpoint. Empty fields are omitted.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,
}

/// Body accepted by `POST /api/users`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUser {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: &str) -> Self {
        Self { status: "error".to_owned(), message: message.to_owned() }
    }
}

/// Build metadata served by `/api/version` and logged at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub module: String,
    /// Kept under its historical wire name; holds the minimum supported
    /// Rust version, e.g. `rust1.85`.
    #[serde(rename = "goVersion")]
    pub runtime_version: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        let version = env!("CARGO_PKG_VERSION");
        Self {
            version: if version.is_empty() { "dev".to_owned() } else { version.to_owned() },
            module: env!("CARGO_PKG_NAME").to_owned(),
            runtime_version: format!("rust{}", env!("CARGO_PKG_RUST_VERSION")),
        }
    }
}
