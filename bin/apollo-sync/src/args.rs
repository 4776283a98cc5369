use apollo_sync::{
    AppConfig,
    config::{DEFAULT_CLUSTER, DEFAULT_NAMESPACE},
};
use clap::{Args, Parser};
use eyre::{WrapErr, eyre};
use std::path::PathBuf;

/// Keep Apollo namespaces in sync and log every update.
#[derive(Clone, Debug, Parser)]
#[command(name = "apollo-sync", version, about)]
pub(crate) struct Cli {
    /// Where to get the Apollo settings from.
    #[command(flatten)]
    pub(crate) apollo: ApolloArgs,
}

/// Apollo client settings, either from a settings file or from individual flags.
#[derive(Clone, Debug, Default, Args)]
pub(crate) struct ApolloArgs {
    /// Path to a JSON `app.properties` settings file.
    ///
    /// When given, the individual `--apollo.*` flags are not allowed.
    #[arg(
        long = "apollo.config",
        value_name = "APOLLO_CONFIG",
        conflicts_with_all = ["app_id", "ip", "secret", "backup_path"],
        verbatim_doc_comment
    )]
    pub(crate) config: Option<PathBuf>,

    /// App ID in Apollo.
    #[arg(long = "apollo.app-id", value_name = "APOLLO_APP_ID")]
    pub(crate) app_id: Option<String>,

    /// Base URL of the config service.
    #[arg(long = "apollo.ip", value_name = "APOLLO_IP")]
    pub(crate) ip: Option<String>,

    /// Cluster name.
    #[arg(long = "apollo.cluster", value_name = "APOLLO_CLUSTER", default_value = DEFAULT_CLUSTER)]
    pub(crate) cluster: String,

    /// Comma-separated namespaces.
    #[arg(long = "apollo.namespaces", value_name = "APOLLO_NAMESPACES", default_value = DEFAULT_NAMESPACE)]
    pub(crate) namespaces: String,

    /// Directory for backup snapshots.
    #[arg(long = "apollo.backup-path", value_name = "APOLLO_BACKUP_PATH")]
    pub(crate) backup_path: Option<PathBuf>,

    /// Access key secret.
    #[arg(long = "apollo.secret", value_name = "APOLLO_SECRET")]
    pub(crate) secret: Option<String>,

    /// Do not write backup snapshots.
    #[arg(long = "apollo.no-backup", default_value_t = false)]
    pub(crate) no_backup: bool,
}

impl ApolloArgs {
    /// Build the client settings these arguments describe.
    pub(crate) fn app_config(&self) -> eyre::Result<AppConfig> {
        let mut config = if let Some(path) = &self.config {
            AppConfig::load(path)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?
        } else {
            let app_id = self.app_id.clone().ok_or_else(|| eyre!("--apollo.app-id is required"))?;
            let ip = self.ip.clone().ok_or_else(|| eyre!("--apollo.ip is required"))?;
            let mut config = AppConfig::new(app_id, ip)
                .with_cluster(self.cluster.clone())
                .with_namespaces(self.namespaces.clone());
            if let Some(path) = &self.backup_path {
                config = config.with_backup_path(path.clone());
            }
            if let Some(secret) = &self.secret {
                config = config.with_secret(secret.clone());
            }
            config
        };
        if self.no_backup {
            config = config.with_backup_enabled(false);
        }
        config.validate()?;
        Ok(config)
    }
}
