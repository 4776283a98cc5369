//! Per-namespace notification id tracking.

use crate::types::{DEFAULT_NOTIFICATION_ID, Notification};
use dashmap::DashMap;
use std::sync::Arc;

/// Last observed notification id per namespace.
///
/// Backed by a sharded map: an update to one namespace is atomic and only locks
/// that namespace's shard. Iteration goes through [`NotificationState::snapshot`],
/// which copies the entries out so no shard lock is held while the caller works
/// on them. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    inner: Arc<DashMap<String, i64>>,
}

impl NotificationState {
    /// Create an empty state. Every namespace starts as "never observed".
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed id for `namespace`, if any.
    pub fn get(&self, namespace: &str) -> Option<i64> {
        self.inner.get(namespace).map(|id| *id)
    }

    /// Last observed id for `namespace`, or [`DEFAULT_NOTIFICATION_ID`].
    pub fn get_or_default(&self, namespace: &str) -> i64 {
        self.get(namespace).unwrap_or(DEFAULT_NOTIFICATION_ID)
    }

    /// Record `id` for `namespace`, replacing whatever was there.
    pub fn set(&self, namespace: impl Into<String>, id: i64) {
        self.inner.insert(namespace.into(), id);
    }

    /// Merge a notify response. The remote is the only authority on ids, so every
    /// record overwrites the stored value. Records without a namespace are ignored.
    pub fn update_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            if notification.namespace_name.is_empty() {
                continue;
            }
            self.set(notification.namespace_name.clone(), notification.notification_id);
        }
    }

    /// Copy of all tracked entries, sorted by namespace.
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let mut entries: Vec<_> =
            self.inner.iter().map(|entry| (entry.key().clone(), *entry.value())).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Names of all tracked namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(namespace, _)| namespace).collect()
    }

    /// Number of tracked namespaces.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no namespace has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Serialize the notify payload for `namespaces`, in the given order.
    ///
    /// An empty `filter` includes every namespace; otherwise only the namespace equal
    /// to `filter` is included. Untracked namespaces carry [`DEFAULT_NOTIFICATION_ID`].
    pub fn notifies<'a>(
        &self,
        namespaces: impl IntoIterator<Item = &'a str>,
        filter: &str,
    ) -> Result<String, serde_json::Error> {
        let payload: Vec<Notification> = namespaces
            .into_iter()
            .filter(|namespace| filter.is_empty() || *namespace == filter)
            .map(|namespace| Notification::new(namespace, self.get_or_default(namespace)))
            .collect();
        serde_json::to_string(&payload)
    }
}
