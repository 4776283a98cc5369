//! Apollo handler interface for dynamic configuration loading

use crate::types::ApolloConfig;

/// Handler interface for Apollo config changes
pub trait ApolloHandler: Send + Sync {
    /// Handle a namespace whose snapshot changed after the initial load
    fn handle_config_change(&self, namespace: &str, config: &ApolloConfig);

    /// Load initial configuration from Apollo
    fn load_config(&self, namespace: &str, config: &ApolloConfig) {
        self.handle_config_change(namespace, config);
    }
}
