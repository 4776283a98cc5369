//! Apollo configuration client: long-poll synchronization core.
//!
//! [`SyncEngine`] runs one synchronization pass: it long-polls the notify endpoint,
//! fetches the namespaces that changed, parses their content by format and falls
//! back to local backups when the config service is unreachable. [`ApolloClient`]
//! wraps an engine with an active cache and a background poll loop.

pub mod backup;
pub mod cache;
pub mod client;
pub mod config;
pub mod format;
pub mod handler;
pub mod notifications;
pub mod sync;
pub mod transport;
pub mod types;

/// Read a cached value from the process-wide client, parsed to the type of
/// `$default`, or `$default` when the client, namespace or key is missing.
#[macro_export]
macro_rules! apollo_cached_config {
    ($namespace:expr, $key:expr, $default:expr) => {{
        $crate::client::ApolloClient::instance()
            .and_then(|apollo| apollo.get_parsed($namespace, $key))
            .unwrap_or($default)
    }};
}

pub use backup::{BackupStore, FileBackupStore};
pub use cache::ConfigCache;
pub use client::ApolloClient;
pub use config::AppConfig;
pub use format::{ContentParser, FormatRegistry};
pub use handler::ApolloHandler;
pub use notifications::NotificationState;
pub use sync::{PassSource, SyncEngine, SyncPass};
pub use transport::{FetchOutcome, HttpTransport, RemoteTransport};
pub use types::{ApolloConfig, ApolloError, ConnectConfig, Notification};
