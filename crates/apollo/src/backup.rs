//! Local backup snapshots, used when the config service is unreachable.

use crate::{
    config::split_namespaces,
    types::{ApolloConfig, ApolloError},
};
use std::{
    fmt,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Storage for last known-good namespace snapshots.
pub trait BackupStore: Send + Sync + fmt::Debug {
    /// Load the snapshot for `namespace` from `dir`. `Ok(None)` when there is none.
    fn load(&self, dir: &Path, namespace: &str) -> Result<Option<ApolloConfig>, ApolloError>;

    /// Persist `config` under `dir`.
    fn save(&self, dir: &Path, config: &ApolloConfig) -> Result<(), ApolloError>;
}

/// One JSON file per namespace: `{dir}/{namespace}.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackupStore;

impl FileBackupStore {
    /// Path of the backup file for `namespace`.
    pub fn file_path(dir: &Path, namespace: &str) -> PathBuf {
        dir.join(format!("{namespace}.json"))
    }
}

impl BackupStore for FileBackupStore {
    fn load(&self, dir: &Path, namespace: &str) -> Result<Option<ApolloConfig>, ApolloError> {
        let path = Self::file_path(dir, namespace);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ApolloError::Backup {
                    namespace: namespace.to_string(),
                    reason: format!("failed to read {}: {e}", path.display()),
                });
            }
        };
        serde_json::from_slice(&raw).map(Some).map_err(|e| ApolloError::Backup {
            namespace: namespace.to_string(),
            reason: format!("malformed backup {}: {e}", path.display()),
        })
    }

    fn save(&self, dir: &Path, config: &ApolloConfig) -> Result<(), ApolloError> {
        std::fs::create_dir_all(dir)?;
        let path = Self::file_path(dir, &config.namespace_name);
        let raw = serde_json::to_vec_pretty(config)?;

        // Write beside the target and rename over it so a crash never leaves a
        // truncated backup behind.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&raw)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| ApolloError::Io(e.error))?;
        debug!(target: "apollo::backup", namespace = %config.namespace_name, "[Apollo] Backup written to {}", path.display());
        Ok(())
    }
}

/// Load backups for every namespace in the comma-joined `namespaces`.
///
/// Namespaces without a backup, or whose backup fails to load, are left out.
pub fn load_backup_configs(
    store: &dyn BackupStore,
    dir: &Path,
    namespaces: &str,
) -> Vec<ApolloConfig> {
    let mut configs = Vec::new();
    for namespace in split_namespaces(namespaces) {
        match store.load(dir, namespace) {
            Ok(Some(config)) => configs.push(config),
            Ok(None) => {
                debug!(target: "apollo::backup", namespace, phase = "backup", "[Apollo] No backup found");
            }
            Err(err) => {
                warn!(target: "apollo::backup", namespace, phase = "backup", "[Apollo] Failed to load backup: {}", err);
            }
        }
    }
    configs
}
