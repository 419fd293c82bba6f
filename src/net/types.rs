//! Wire types shared by the HTTP client, the query layer and the gates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by remote reads and writes.
///
/// `Clone` so a failure can be stored in query state and handed to every
/// observer of the key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("unexpected status {status} from {path}")]
    Status { status: u16, path: String },

    /// The response body could not be decoded.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("http client build failed: {0}")]
    ClientBuild(String),
}

impl ApiError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 408 | 429 | 500..=599, .. })
    }
}

// =============================================================================
// CURRENT USER
// =============================================================================

/// The authenticated caller as reported by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CurrentUser {
    #[must_use]
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { id: id.into(), role: role.into(), name: None, email: None }
    }
}

// =============================================================================
// SITE CONFIG
// =============================================================================

/// Client-side view of the remote key-value configuration.
///
/// Always a mapping. An absent or failed read is represented by
/// [`SiteConfig::default`], never by a missing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteConfig(Map<String, Value>);

impl SiteConfig {
    #[must_use]
    pub fn new(entries: Map<String, Value>) -> Self {
        Self(entries)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Body of `GET /site-config/{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfigEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}
