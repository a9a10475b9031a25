//! CLI error types.

use sitepush_config::ConfigError;
use sitepush_deploy::PublishError;
use sitepush_storage::StoreError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Publish(#[from] PublishError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{failed} of {total} sites failed")]
    SitesFailed { failed: usize, total: usize },
}
