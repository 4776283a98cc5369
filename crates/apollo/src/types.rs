//! Wire types and errors.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, time::Duration};

/// Notification id used for namespaces that have never been observed.
pub const DEFAULT_NOTIFICATION_ID: i64 = -1;

/// A change record returned by the long-poll notify endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Namespace the change belongs to
    pub namespace_name: String,
    /// Remote-assigned change version
    pub notification_id: i64,
}

impl Notification {
    /// Create a new notification record.
    pub fn new(namespace_name: impl Into<String>, notification_id: i64) -> Self {
        Self { namespace_name: namespace_name.into(), notification_id }
    }
}

/// Snapshot of one namespace's configuration, as served by the config service
/// or restored from a local backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApolloConfig {
    /// App ID in Apollo
    #[serde(default)]
    pub app_id: String,
    /// Cluster the snapshot was served from
    #[serde(default)]
    pub cluster: String,
    /// Namespace name, possibly carrying a format suffix (`app.yml`)
    pub namespace_name: String,
    /// Release key presented on the next fetch so the server can answer 304
    #[serde(default)]
    pub release_key: String,
    /// Key/value content
    #[serde(default)]
    pub configurations: HashMap<String, String>,
}

impl ApolloConfig {
    /// Create an empty snapshot for `namespace_name`.
    pub fn new(namespace_name: impl Into<String>) -> Self {
        Self { namespace_name: namespace_name.into(), ..Default::default() }
    }

    /// Set the release key.
    pub fn with_release_key(mut self, release_key: impl Into<String>) -> Self {
        self.release_key = release_key.into();
        self
    }

    /// Insert a single configuration entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configurations.insert(key.into(), value.into());
        self
    }

    /// Look up a configuration value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.configurations.get(key).map(String::as_str)
    }
}

/// Per-request transport parameters.
#[derive(Clone)]
pub struct ConnectConfig {
    /// Request URI, relative to the config service base URL
    pub uri: String,
    /// App ID in Apollo
    pub app_id: String,
    /// Optional access key secret
    pub secret: Option<String>,
    /// Total request timeout
    pub timeout: Duration,
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("uri", &self.uri)
            .field("app_id", &self.app_id)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Apollo error enum
#[derive(Debug, thiserror::Error)]
pub enum ApolloError {
    /// Failed to initialize Apollo client
    #[error("Failed to initialize Apollo client: {0}")]
    ClientInit(String),
    /// Client settings are incomplete or malformed
    #[error("Invalid Apollo config: {0}")]
    InvalidConfig(String),
    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),
    /// The config service answered with an unexpected status
    #[error("Unexpected status {status} for {uri}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Request URI
        uri: String,
    },
    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Namespace content could not be parsed by its format parser
    #[error("Parse error: {0}")]
    Parse(String),
    /// Backup snapshot could not be read or written
    #[error("Backup error for namespace {namespace}: {reason}")]
    Backup {
        /// Namespace the backup belongs to
        namespace: String,
        /// What went wrong
        reason: String,
    },
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ApolloError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
