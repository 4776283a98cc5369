//! One synchronization pass against the config service.
//!
//! A pass long-polls the notify endpoint, merges the returned notification ids,
//! then fetches every tracked namespace. When the notify call fails or reports
//! nothing, the whole pass degrades to the local backup store.

use crate::{
    backup::{BackupStore, FileBackupStore, load_backup_configs},
    cache::ConfigCache,
    config::AppConfig,
    format::FormatRegistry,
    transport::{FetchOutcome, RemoteTransport},
    types::{ApolloConfig, ApolloError, ConnectConfig, Notification},
};
use futures::future::join_all;
use std::{net::IpAddr, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::form_urlencoded;

/// Long-poll timeout. The server holds the notify request open until a namespace
/// changes or this elapses.
pub const NOTIFY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Form-urlencode a single query or path value.
fn escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Relative URI of the long-poll notify request.
pub fn notify_uri(notifications: &str, config: &AppConfig) -> String {
    format!(
        "notifications/v2?appId={}&cluster={}&notifications={}",
        escape(&config.app_id),
        escape(&config.cluster),
        escape(notifications)
    )
}

/// Relative URI of the fetch request for one namespace.
pub fn sync_uri(config: &AppConfig, namespace: &str, release_key: &str, client_ip: &str) -> String {
    format!(
        "configs/{}/{}/{}?releaseKey={}&ip={}",
        escape(&config.app_id),
        escape(&config.cluster),
        escape(namespace),
        escape(release_key),
        escape(client_ip)
    )
}

/// Decode a notify response body.
pub fn decode_notifications(body: &[u8]) -> Result<Vec<Notification>, ApolloError> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a fetch response body.
pub fn decode_config(body: &[u8]) -> Result<ApolloConfig, ApolloError> {
    Ok(serde_json::from_slice(body)?)
}

/// Address reported when no interface qualifies.
const FALLBACK_IP: &str = "127.0.0.1";

/// First non-loopback IPv4 address of this host, sent as `ip` on fetches.
pub fn local_ip() -> String {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => select_ip(interfaces.iter().map(|iface| iface.ip())),
        Err(err) => {
            warn!(target: "apollo::sync", "[Apollo] Failed to list network interfaces: {}", err);
            FALLBACK_IP.to_string()
        }
    }
}

fn select_ip(addrs: impl IntoIterator<Item = IpAddr>) -> String {
    addrs
        .into_iter()
        .find(|ip| ip.is_ipv4() && !ip.is_loopback() && !ip.is_unspecified())
        .map_or_else(|| FALLBACK_IP.to_string(), |ip| ip.to_string())
}

/// Where the snapshots of a pass came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassSource {
    /// Fetched from the config service.
    Remote,
    /// Loaded from the backup store after the notify call reported nothing.
    Backup,
}

/// Result of one synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncPass {
    /// Where `configs` came from
    pub source: PassSource,
    /// Namespaces that came back with content
    pub configs: Vec<ApolloConfig>,
}

/// Orchestrates synchronization passes.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    transport: Arc<dyn RemoteTransport>,
    backup: Arc<dyn BackupStore>,
    formats: Arc<FormatRegistry>,
    cache: ConfigCache,
    client_ip: String,
}

impl SyncEngine {
    /// Create an engine on `transport` with the file backup store, the built-in
    /// parsers, an empty cache and the detected local address.
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            backup: Arc::new(FileBackupStore),
            formats: Arc::new(FormatRegistry::with_defaults()),
            cache: ConfigCache::new(),
            client_ip: local_ip(),
        }
    }

    /// Use `backup` as the backup store.
    pub fn with_backup_store(mut self, backup: Arc<dyn BackupStore>) -> Self {
        self.backup = backup;
        self
    }

    /// Use `formats` for content parsing.
    pub fn with_formats(mut self, formats: Arc<FormatRegistry>) -> Self {
        self.formats = formats;
        self
    }

    /// Read release keys from `cache`.
    pub fn with_cache(mut self, cache: ConfigCache) -> Self {
        self.cache = cache;
        self
    }

    /// Override the address reported on fetches.
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = client_ip.into();
        self
    }

    /// Cache release keys are read from.
    pub const fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Parser registry.
    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    /// Backup store.
    pub fn backup_store(&self) -> &dyn BackupStore {
        self.backup.as_ref()
    }

    /// Fetch URI for `namespace`, carrying the cached release key.
    pub fn sync_uri(&self, config: &AppConfig, namespace: &str) -> String {
        sync_uri(config, namespace, &self.cache.release_key(namespace), &self.client_ip)
    }

    /// Run one synchronization pass.
    ///
    /// Returns the namespaces that came back with content. Namespaces the server
    /// reported as unchanged, or that failed, are absent.
    pub async fn sync(&self, app_config: &AppConfig) -> Vec<ApolloConfig> {
        self.sync_pass(app_config).await.configs
    }

    /// Run one synchronization pass, reporting where its snapshots came from.
    pub async fn sync_pass(&self, app_config: &AppConfig) -> SyncPass {
        let notifications = match self.notify_remote(app_config, "").await {
            Ok(notifications) => notifications,
            Err(err) => {
                warn!(target: "apollo::sync", phase = "notify", "[Apollo] Notify failed, falling back to backup: {}", err);
                Vec::new()
            }
        };

        if notifications.is_empty() {
            let backups = self.load_backups(app_config);
            info!(target: "apollo::sync", phase = "backup", "[Apollo] No notifications, loaded {} namespaces from backup", backups.len());
            return SyncPass { source: PassSource::Backup, configs: backups };
        }

        let notify_state = app_config.notifications();
        notify_state.update_all(&notifications);

        let namespaces = notify_state.namespaces();
        debug!(target: "apollo::sync", phase = "fetch", "[Apollo] Fetching namespaces {:?}", namespaces);
        let configs = join_all(
            namespaces.iter().map(|namespace| self.sync_namespace(app_config, namespace)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();
        SyncPass { source: PassSource::Remote, configs }
    }

    /// Long-poll the notify endpoint.
    ///
    /// An empty `namespace` asks about every configured namespace. A 304 yields an
    /// empty list.
    pub async fn notify_remote(
        &self,
        app_config: &AppConfig,
        namespace: &str,
    ) -> Result<Vec<Notification>, ApolloError> {
        let payload = app_config.notifications().notifies(app_config.namespaces(), namespace)?;
        let request = ConnectConfig {
            uri: notify_uri(&payload, app_config),
            app_id: app_config.app_id.clone(),
            secret: app_config.secret.clone(),
            timeout: NOTIFY_CONNECT_TIMEOUT,
        };

        match self.transport.execute(&request).await {
            FetchOutcome::Changed(body) => decode_notifications(&body).inspect_err(|err| {
                warn!(target: "apollo::sync", phase = "notify", "[Apollo] Failed to decode notifications: {}", err);
            }),
            FetchOutcome::Unchanged => Ok(Vec::new()),
            FetchOutcome::Failed(err) => Err(err),
        }
    }

    /// Fetch and parse a single namespace.
    pub async fn sync_namespace(
        &self,
        app_config: &AppConfig,
        namespace: &str,
    ) -> Option<ApolloConfig> {
        let request = ConnectConfig {
            uri: self.sync_uri(app_config, namespace),
            app_id: app_config.app_id.clone(),
            secret: app_config.secret.clone(),
            timeout: app_config.sync_timeout,
        };

        match self.transport.execute(&request).await {
            FetchOutcome::Changed(body) => match decode_config(&body) {
                Ok(mut config) => {
                    if config.namespace_name != namespace {
                        if !config.namespace_name.is_empty() {
                            warn!(target: "apollo::sync", namespace, phase = "fetch", "[Apollo] Server answered for namespace {}", config.namespace_name);
                        }
                        config.namespace_name = namespace.to_string();
                    }
                    Some(self.formats.apply(config))
                }
                Err(err) => {
                    warn!(target: "apollo::sync", namespace, phase = "fetch", "[Apollo] Failed to decode config: {}", err);
                    None
                }
            },
            FetchOutcome::Unchanged => {
                debug!(target: "apollo::sync", namespace, phase = "fetch", "[Apollo] Not modified");
                None
            }
            FetchOutcome::Failed(err) => {
                warn!(target: "apollo::sync", namespace, phase = "fetch", "[Apollo] Fetch failed: {}", err);
                None
            }
        }
    }

    /// Load backups for every configured namespace.
    pub fn load_backups(&self, app_config: &AppConfig) -> Vec<ApolloConfig> {
        load_backup_configs(
            self.backup.as_ref(),
            &app_config.backup_config_path,
            &app_config.namespace_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config() -> AppConfig {
        AppConfig::new("SampleApp", "http://localhost:8080").with_cluster("dev&test")
    }

    #[test]
    fn test_notify_uri_escapes_every_field() {
        let config = app_config();
        let payload = r#"[{"namespaceName":"app","notificationId":-1}]"#;
        let uri = notify_uri(payload, &config);

        assert_eq!(
            uri,
            "notifications/v2?appId=SampleApp&cluster=dev%26test&notifications=%5B%7B%22namespaceName%22%3A%22app%22%2C%22notificationId%22%3A-1%7D%5D"
        );
        assert_eq!(uri, notify_uri(payload, &config));
    }

    #[test]
    fn test_sync_uri_escapes_every_field() {
        let config = app_config();
        let uri = sync_uri(&config, "app yml", "rk/1", "10.0.0.1");
        assert_eq!(uri, "configs/SampleApp/dev%26test/app+yml?releaseKey=rk%2F1&ip=10.0.0.1");
        assert_eq!(uri, sync_uri(&config, "app yml", "rk/1", "10.0.0.1"));
    }

    #[test]
    fn test_decode_notifications_rejects_non_array() {
        assert!(decode_notifications(br#"{"namespaceName":"app"}"#).is_err());
        assert!(decode_notifications(b"[").is_err());
        assert!(decode_notifications(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_config() {
        let body = br#"{"appId":"a","cluster":"default","namespaceName":"app","releaseKey":"rk1","configurations":{"k":"v"}}"#;
        let config = decode_config(body).unwrap();
        assert_eq!(config.release_key, "rk1");
        assert_eq!(config.get("k"), Some("v"));
        assert!(decode_config(b"[]").is_err());
    }

    #[test]
    fn test_select_ip_skips_loopback_and_ipv6() {
        let addrs: Vec<IpAddr> = ["127.0.0.1", "::1", "fe80::1", "10.9.8.7", "192.168.1.2"]
            .iter()
            .map(|ip| ip.parse().unwrap())
            .collect();
        assert_eq!(select_ip(addrs), "10.9.8.7");
    }

    #[test]
    fn test_select_ip_falls_back_to_loopback() {
        let addrs: Vec<IpAddr> =
            ["127.0.0.1", "::1", "0.0.0.0"].iter().map(|ip| ip.parse().unwrap()).collect();
        assert_eq!(select_ip(addrs), FALLBACK_IP);
        assert_eq!(select_ip(Vec::new()), FALLBACK_IP);
    }
}
