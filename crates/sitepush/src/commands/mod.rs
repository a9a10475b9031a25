//! CLI command implementations.

mod deploy;
mod plan;

use std::sync::Arc;

use clap::ValueEnum;
use sitepush_assets::RewriteScope;
use sitepush_config::{Config, RewriteMode, StorageBackend};
use sitepush_deploy::PublishConfig;
use sitepush_storage::{FsStore, ObjectStore};
use sitepush_storage_s3::{S3Config, S3Store};

use crate::error::CliError;

pub(crate) use deploy::DeployArgs;
pub(crate) use plan::PlanArgs;

/// Storage backend selectable on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum BackendArg {
    /// Amazon S3 or an S3-compatible service.
    S3,
    /// Local directory, one subdirectory per bucket.
    Fs,
}

impl From<BackendArg> for StorageBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::S3 => Self::S3,
            BackendArg::Fs => Self::Fs,
        }
    }
}

/// Filename substitution scope selectable on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ScopeArg {
    /// Replace every occurrence of an asset file name.
    Literal,
    /// Replace asset file names only in attribute values and `url(...)`.
    References,
}

impl From<ScopeArg> for RewriteMode {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Literal => Self::Literal,
            ScopeArg::References => Self::References,
        }
    }
}

fn rewrite_scope(mode: RewriteMode) -> RewriteScope {
    match mode {
        RewriteMode::Literal => RewriteScope::Literal,
        RewriteMode::References => RewriteScope::References,
    }
}

/// Publisher settings from the loaded configuration.
pub(crate) fn publish_config(config: &Config) -> PublishConfig {
    PublishConfig {
        bucket_prefix: config.deploy_resolved.bucket_prefix.clone(),
        location: config.bucket.location.clone(),
        main_page_suffix: config.bucket.main_page_suffix.clone(),
        uniform_access: config.bucket.uniform_access,
        cache_control: config.upload.cache_control.clone(),
        scope: rewrite_scope(config.rewrite.scope),
    }
}

/// Create the configured object store.
pub(crate) fn build_store(config: &Config) -> Result<Arc<dyn ObjectStore>, CliError> {
    let storage = &config.storage_resolved;
    match storage.backend {
        StorageBackend::S3 => {
            let store = S3Store::new(S3Config {
                region: storage.region.clone(),
                endpoint: storage.endpoint.clone(),
                public_base_url: storage.public_base_url.clone(),
            })?;
            Ok(Arc::new(store))
        }
        StorageBackend::Fs => {
            let mut store = FsStore::new(storage.output_dir.clone());
            if let Some(base) = &storage.public_base_url {
                store = store.with_public_base_url(base.clone());
            }
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_publish_config_from_defaults() {
        let config = Config::default();
        let publish = publish_config(&config);

        assert_eq!(publish.bucket_prefix, "bucket-");
        assert_eq!(publish.main_page_suffix, "index.html");
        assert_eq!(publish.scope, RewriteScope::Literal);
        assert_eq!(publish.cache_control, sitepush_storage::DEFAULT_CACHE_CONTROL);
    }

    #[test]
    fn test_cli_enums_convert() {
        assert_eq!(StorageBackend::from(BackendArg::Fs), StorageBackend::Fs);
        assert_eq!(
            rewrite_scope(RewriteMode::from(ScopeArg::References)),
            RewriteScope::References
        );
    }

    #[test]
    fn test_build_fs_store_public_url() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sitepush.toml");
        std::fs::write(
            &path,
            "[storage]\nbackend = \"fs\"\npublic_base_url = \"http://localhost:8000\"\n",
        )
        .unwrap();
        let config = Config::load(Some(Path::new(&path)), None).unwrap();

        let store = build_store(&config).unwrap();

        assert_eq!(store.public_url("bucket-blog"), "http://localhost:8000/bucket-blog");
    }
}
