//! Active configuration cache.

use crate::types::ApolloConfig;
use moka::sync::Cache;
use std::{str::FromStr, sync::Arc};

/// Namespace snapshots currently in effect.
///
/// Results of a sync pass are installed here by the caller. The sync engine reads
/// release keys back from it so unchanged namespaces can be answered with a 304.
#[derive(Debug, Clone)]
pub struct ConfigCache {
    inner: Cache<String, Arc<ApolloConfig>>,
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigCache {
    /// Create an empty, unbounded cache.
    pub fn new() -> Self {
        Self { inner: Cache::builder().build() }
    }

    /// Install `configs`, replacing previous snapshots of the same namespaces.
    /// Returns the installed snapshots.
    pub fn install(
        &self,
        configs: impl IntoIterator<Item = ApolloConfig>,
    ) -> Vec<Arc<ApolloConfig>> {
        configs
            .into_iter()
            .map(|config| {
                let config = Arc::new(config);
                self.inner.insert(config.namespace_name.clone(), config.clone());
                config
            })
            .collect()
    }

    /// Snapshot for `namespace`.
    pub fn get(&self, namespace: &str) -> Option<Arc<ApolloConfig>> {
        self.inner.get(namespace)
    }

    /// Release key of the cached snapshot, empty when nothing is cached.
    pub fn release_key(&self, namespace: &str) -> String {
        self.get(namespace).map(|config| config.release_key.clone()).unwrap_or_default()
    }

    /// Raw value of `key` in `namespace`.
    pub fn get_value(&self, namespace: &str, key: &str) -> Option<String> {
        self.get(namespace)?.get(key).map(str::to_string)
    }

    /// Value of `key` in `namespace`, parsed as `T`.
    pub fn get_parsed<T: FromStr>(&self, namespace: &str, key: &str) -> Option<T> {
        self.get_value(namespace, key)?.parse().ok()
    }

    /// Names of all cached namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.inner.iter().map(|(k, _)| (*k).clone()).collect();
        namespaces.sort_unstable();
        namespaces
    }

    /// Drop the snapshot for `namespace`.
    pub fn invalidate(&self, namespace: &str) {
        self.inner.invalidate(namespace);
    }
}
