//! Apollo client facade with an optional process-wide instance.

use crate::{
    cache::ConfigCache,
    config::AppConfig,
    handler::ApolloHandler,
    sync::{PassSource, SyncEngine},
    transport::HttpTransport,
    types::{ApolloConfig, ApolloError},
};
use async_once_cell::OnceCell;
use parking_lot::RwLock;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Apollo client: owns the sync engine, the active cache and the poll loop.
#[derive(Clone)]
pub struct ApolloClient {
    config: Arc<AppConfig>,
    engine: SyncEngine,
    handlers: Arc<RwLock<Vec<Arc<dyn ApolloHandler>>>>,
    listener_state: Arc<Mutex<ListenerState>>,
}

#[derive(Debug, Default)]
struct ListenerState {
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::mpsc::Sender<()>>,
}

/// Optional process-wide instance
static INSTANCE: OnceCell<ApolloClient> = OnceCell::new();
/// Pause between two passes of the poll loop
const POLL_INTERVAL: Duration = Duration::from_secs(1);

impl std::fmt::Debug for ApolloClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApolloClient")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("handlers", &self.handlers.read().len())
            .field("listener_state", &"<locked>")
            .finish()
    }
}

impl ApolloClient {
    /// Get the process-wide instance, creating it from `config` on first use and
    /// starting its poll loop.
    ///
    /// `config` is ignored once the instance exists.
    pub async fn get_instance(config: AppConfig) -> Result<Self, ApolloError> {
        info!(target: "apollo::client", "[Apollo] Getting Apollo client");
        let client = INSTANCE.get_or_try_init(async { Self::new(config) }).await?.clone();
        client.start_listening().await?;
        Ok(client)
    }

    /// The process-wide instance, if [`ApolloClient::get_instance`] has created it.
    pub fn instance() -> Option<&'static Self> {
        INSTANCE.get()
    }

    /// Check if the process-wide instance is initialized
    pub fn is_initialized() -> bool {
        INSTANCE.get().is_some()
    }

    /// Create a client talking HTTP to `config.ip`.
    pub fn new(config: AppConfig) -> Result<Self, ApolloError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.ip)?;
        Self::with_engine(config, SyncEngine::new(Arc::new(transport)))
    }

    /// Create a client on a prepared engine.
    pub fn with_engine(config: AppConfig, engine: SyncEngine) -> Result<Self, ApolloError> {
        config.validate()?;
        info!(target: "apollo::client", "[Apollo] Namespaces: {:?}", config.namespaces());
        Ok(Self {
            config: Arc::new(config),
            engine,
            handlers: Arc::new(RwLock::new(Vec::new())),
            listener_state: Arc::new(Mutex::new(ListenerState::default())),
        })
    }

    /// Client settings.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Underlying sync engine.
    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Active configuration cache.
    pub const fn cache(&self) -> &ConfigCache {
        self.engine.cache()
    }

    /// Register a handler for namespace updates.
    pub fn add_handler(&self, handler: Arc<dyn ApolloHandler>) {
        self.handlers.write().push(handler);
    }

    /// Run one pass and install every namespace whose snapshot changed.
    ///
    /// Snapshots restored from backup only fill namespaces that are not cached
    /// yet. Remote snapshots that changed are also written to the backup store
    /// when backups are enabled. Returns the installed snapshots.
    pub async fn sync_once(&self) -> Vec<Arc<ApolloConfig>> {
        let pass = self.engine.sync_pass(&self.config).await;
        let cache = self.engine.cache();
        let changed: Vec<ApolloConfig> = match pass.source {
            PassSource::Remote => pass
                .configs
                .into_iter()
                .filter(|config| {
                    cache.get(&config.namespace_name).is_none_or(|current| *current != *config)
                })
                .collect(),
            PassSource::Backup => pass
                .configs
                .into_iter()
                .filter(|config| cache.get(&config.namespace_name).is_none())
                .collect(),
        };

        if self.config.is_backup_config && pass.source == PassSource::Remote {
            for config in &changed {
                if let Err(err) =
                    self.engine.backup_store().save(&self.config.backup_config_path, config)
                {
                    warn!(target: "apollo::client", namespace = %config.namespace_name, phase = "backup", "[Apollo] Failed to write backup: {}", err);
                }
            }
        }

        cache.install(changed)
    }

    /// Load the initial configuration and hand it to the registered handlers.
    ///
    /// Returns the number of namespaces loaded.
    pub async fn load_config(&self) -> usize {
        let installed = self.sync_once().await;
        let handlers = self.handlers.read().clone();
        for config in &installed {
            info!(target: "apollo::client", namespace = %config.namespace_name, "[Apollo] Loaded {} keys", config.configurations.len());
            for handler in &handlers {
                handler.load_config(&config.namespace_name, config);
            }
        }
        installed.len()
    }

    /// Load the initial configuration, then keep it fresh from a background task.
    ///
    /// Fails when nothing could be loaded from either the remote or the backup store.
    pub async fn start_listening(&self) -> Result<(), ApolloError> {
        let mut state = self.listener_state.lock().await;
        if state.task.is_some() {
            return Ok(()); // Already listening
        }

        if self.load_config().await == 0 && self.cache().namespaces().is_empty() {
            error!(target: "apollo::client", "[Apollo] Initial load returned no namespace");
            return Err(ApolloError::ClientInit(
                "no namespace could be loaded from the config service or the backup store"
                    .to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
        let client = self.clone();
        let task = tokio::spawn(async move {
            client.listener_task(shutdown_rx).await;
        });

        state.task = Some(task);
        state.shutdown_tx = Some(shutdown_tx);

        info!(target: "apollo::client", "[Apollo] Started listening to configuration changes");
        Ok(())
    }

    // Background poll loop
    async fn listener_task(self, mut shutdown_rx: tokio::sync::mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                installed = self.sync_once() => self.dispatch_changes(&installed),
            }
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
        info!(target: "apollo::client", "[Apollo] Stopping listener task");
    }

    fn dispatch_changes(&self, installed: &[Arc<ApolloConfig>]) {
        if installed.is_empty() {
            return;
        }
        let handlers = self.handlers.read().clone();
        for config in installed {
            info!(target: "apollo::client", namespace = %config.namespace_name, release_key = %config.release_key, "[Apollo] Configuration changed");
            for handler in &handlers {
                handler.handle_config_change(&config.namespace_name, config);
            }
        }
    }

    /// Whether the poll loop is running.
    pub async fn is_listening(&self) -> bool {
        self.listener_state.lock().await.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening and cleanup
    pub async fn stop_listening(&self) -> Result<(), ApolloError> {
        let mut state = self.listener_state.lock().await;
        if let Some(tx) = state.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(task) = state.task.take() {
            task.abort();
        }

        info!(target: "apollo::client", "[Apollo] Stopped listening to configuration changes");
        Ok(())
    }

    /// Snapshot currently in effect for `namespace`.
    pub fn get_config(&self, namespace: &str) -> Option<Arc<ApolloConfig>> {
        self.cache().get(namespace)
    }

    /// Raw value of `key` in `namespace`.
    pub fn get_value(&self, namespace: &str, key: &str) -> Option<String> {
        self.cache().get_value(namespace, key)
    }

    /// Value of `key` in `namespace`, parsed as `T`.
    pub fn get_parsed<T: FromStr>(&self, namespace: &str, key: &str) -> Option<T> {
        self.cache().get_parsed(namespace, key)
    }
}
