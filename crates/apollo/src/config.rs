//! Client identity and settings.

use crate::{notifications::NotificationState, types::ApolloError};
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Cluster used when none is configured.
pub const DEFAULT_CLUSTER: &str = "default";
/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "application";
/// Timeout for single-namespace fetches.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(3);

/// Apollo client settings.
///
/// Deserializes from the JSON layout Apollo clients conventionally keep in
/// `app.properties`:
///
/// ```json
/// { "appId": "SampleApp", "cluster": "default", "namespaceName": "application,app.yml",
///   "ip": "http://localhost:8080", "isBackupConfig": true, "backupConfigPath": "/tmp/apollo" }
/// ```
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// App ID in Apollo
    pub app_id: String,
    /// Cluster name (default: "default")
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Comma-joined namespace names (default: "application")
    #[serde(default = "default_namespace")]
    pub namespace_name: String,
    /// Base URL of the config service
    pub ip: String,
    /// Optional access key secret
    #[serde(default)]
    pub secret: Option<String>,
    /// Whether successful syncs are written to the backup store
    #[serde(default = "default_true")]
    pub is_backup_config: bool,
    /// Directory holding backup snapshots
    #[serde(default = "default_backup_path")]
    pub backup_config_path: PathBuf,
    /// Timeout for single-namespace fetches
    #[serde(default = "default_sync_timeout", with = "humantime_serde")]
    pub sync_timeout: Duration,

    #[serde(skip)]
    notifications: NotificationState,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_id", &self.app_id)
            .field("cluster", &self.cluster)
            .field("namespace_name", &self.namespace_name)
            .field("ip", &self.ip)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("is_backup_config", &self.is_backup_config)
            .field("backup_config_path", &self.backup_config_path)
            .field("sync_timeout", &self.sync_timeout)
            .field("notifications", &self.notifications)
            .finish()
    }
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

const fn default_true() -> bool {
    true
}

fn default_backup_path() -> PathBuf {
    PathBuf::from(".")
}

const fn default_sync_timeout() -> Duration {
    DEFAULT_SYNC_TIMEOUT
}

impl AppConfig {
    /// Create settings for `app_id` served from `ip`, with defaults for everything else.
    pub fn new(app_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            cluster: default_cluster(),
            namespace_name: default_namespace(),
            ip: ip.into(),
            secret: None,
            is_backup_config: true,
            backup_config_path: default_backup_path(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            notifications: NotificationState::new(),
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApolloError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Set the cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Set the comma-joined namespace list.
    pub fn with_namespaces(mut self, namespace_name: impl Into<String>) -> Self {
        self.namespace_name = namespace_name.into();
        self
    }

    /// Set the access key secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the backup directory.
    pub fn with_backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_config_path = path.into();
        self
    }

    /// Enable or disable writing backups.
    pub const fn with_backup_enabled(mut self, enabled: bool) -> Self {
        self.is_backup_config = enabled;
        self
    }

    /// Individual namespace names, in configured order.
    pub fn namespaces(&self) -> Vec<&str> {
        split_namespaces(&self.namespace_name)
    }

    /// Notification ids observed so far.
    pub const fn notifications(&self) -> &NotificationState {
        &self.notifications
    }

    /// Reject settings a client cannot work with.
    pub fn validate(&self) -> Result<(), ApolloError> {
        if self.app_id.trim().is_empty() {
            return Err(ApolloError::InvalidConfig("appId is empty".to_string()));
        }
        if self.ip.trim().is_empty() {
            return Err(ApolloError::InvalidConfig("ip is empty".to_string()));
        }
        if self.namespaces().is_empty() {
            return Err(ApolloError::InvalidConfig("namespaceName is empty".to_string()));
        }
        Ok(())
    }
}

/// Split a comma-joined namespace specifier into trimmed, de-duplicated names.
pub fn split_namespaces(namespaces: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for namespace in namespaces.split(',').map(str::trim).filter(|ns| !ns.is_empty()) {
        if !out.contains(&namespace) {
            out.push(namespace);
        }
    }
    out
}
