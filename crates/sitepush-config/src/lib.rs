//! Configuration management for sitepush.
//!
//! Parses `sitepush.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `deploy.bucket_prefix`
//! - `storage.region`
//! - `storage.endpoint`
//! - `storage.public_base_url`

mod expand;

use serde::Deserialize;
use sitepush_storage::DEFAULT_CACHE_CONTROL;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the directory holding one subdirectory per site.
    pub sites_dir: Option<PathBuf>,
    /// Override the storage backend.
    pub backend: Option<StorageBackend>,
    /// Override the output directory of the filesystem backend.
    pub output_dir: Option<PathBuf>,
    /// Override the S3 region.
    pub region: Option<String>,
    /// Override the S3-compatible endpoint URL.
    pub endpoint: Option<String>,
    /// Override the filename substitution scope.
    pub rewrite_scope: Option<RewriteMode>,
    /// Override parallel site processing.
    pub parallel: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "sitepush.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment configuration (paths are relative strings from TOML).
    deploy: DeployConfigRaw,
    /// Bucket provisioning settings.
    pub bucket: BucketConfig,
    /// Upload settings.
    pub upload: UploadConfig,
    /// Entry document rewriting settings.
    pub rewrite: RewriteConfig,
    /// Storage backend configuration (paths are relative strings from TOML).
    storage: StorageConfigRaw,

    /// Resolved deploy configuration (set after loading).
    #[serde(skip)]
    pub deploy_resolved: DeployConfig,
    /// Resolved storage configuration (set after loading).
    #[serde(skip)]
    pub storage_resolved: StorageConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw deploy configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DeployConfigRaw {
    sites_dir: Option<String>,
    bucket_prefix: Option<String>,
    parallel: Option<bool>,
}

/// Resolved deploy configuration with absolute paths.
#[derive(Debug)]
pub struct DeployConfig {
    /// Directory containing one subdirectory per site.
    pub sites_dir: PathBuf,
    /// Prefix prepended to site names to form bucket names.
    pub bucket_prefix: String,
    /// Process sites in parallel.
    pub parallel: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            sites_dir: PathBuf::from("websites"),
            bucket_prefix: "bucket-".to_owned(),
            parallel: true,
        }
    }
}

/// Bucket provisioning settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Bucket location.
    pub location: String,
    /// Document served for directory requests.
    pub main_page_suffix: String,
    /// Bucket-level access control only.
    pub uniform_access: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            location: "US".to_owned(),
            main_page_suffix: "index.html".to_owned(),
            uniform_access: true,
        }
    }
}

/// Upload settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Cache-Control header sent with every object.
    pub cache_control: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            cache_control: DEFAULT_CACHE_CONTROL.to_owned(),
        }
    }
}

/// Where asset file names may be substituted in the entry document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Replace every occurrence of the file name.
    #[default]
    Literal,
    /// Replace only inside attribute values and `url(...)`.
    References,
}

/// Entry document rewriting settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Filename substitution scope.
    pub scope: RewriteMode,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Amazon S3 or an S3-compatible service.
    #[default]
    S3,
    /// Local directory, one subdirectory per bucket.
    Fs,
}

/// Raw storage configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StorageConfigRaw {
    backend: Option<StorageBackend>,
    region: Option<String>,
    endpoint: Option<String>,
    output_dir: Option<String>,
    public_base_url: Option<String>,
}

/// Resolved storage configuration.
#[derive(Debug)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// S3 region.
    pub region: String,
    /// S3-compatible endpoint URL.
    pub endpoint: Option<String>,
    /// Output directory of the filesystem backend.
    pub output_dir: PathBuf,
    /// Base URL used when reporting bucket addresses.
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            region: "us-east-1".to_owned(),
            endpoint: None,
            output_dir: PathBuf::from("out"),
            public_base_url: None,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`storage.endpoint`").
        field: String,
        /// Error message (e.g., "${`S3_ENDPOINT`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `sitepush.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated after CLI settings are applied.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails, or
    /// the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(sites_dir) = &settings.sites_dir {
            self.deploy_resolved.sites_dir.clone_from(sites_dir);
        }
        if let Some(backend) = settings.backend {
            self.storage_resolved.backend = backend;
        }
        if let Some(output_dir) = &settings.output_dir {
            self.storage_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(region) = &settings.region {
            self.storage_resolved.region.clone_from(region);
        }
        if let Some(endpoint) = &settings.endpoint {
            self.storage_resolved.endpoint = Some(endpoint.clone());
        }
        if let Some(scope) = settings.rewrite_scope {
            self.rewrite.scope = scope;
        }
        if let Some(parallel) = settings.parallel {
            self.deploy_resolved.parallel = parallel;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            deploy: DeployConfigRaw::default(),
            bucket: BucketConfig::default(),
            upload: UploadConfig::default(),
            rewrite: RewriteConfig::default(),
            storage: StorageConfigRaw::default(),
            deploy_resolved: DeployConfig {
                sites_dir: base.join("websites"),
                ..DeployConfig::default()
            },
            storage_resolved: StorageConfig {
                output_dir: base.join("out"),
                ..StorageConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically at the end of [`Config::load`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_deploy()?;
        self.validate_bucket()?;
        require_non_empty(&self.upload.cache_control, "upload.cache_control")?;
        self.validate_storage()?;
        Ok(())
    }

    /// Validate deploy configuration.
    fn validate_deploy(&self) -> Result<(), ConfigError> {
        let prefix = &self.deploy_resolved.bucket_prefix;
        if !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::Validation(format!(
                "deploy.bucket_prefix may only contain lowercase letters, digits and '-', got {prefix:?}"
            )));
        }
        Ok(())
    }

    /// Validate bucket configuration.
    fn validate_bucket(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.bucket.location, "bucket.location")?;
        require_non_empty(&self.bucket.main_page_suffix, "bucket.main_page_suffix")?;
        if self.bucket.main_page_suffix.contains('/') {
            return Err(ConfigError::Validation(
                "bucket.main_page_suffix cannot contain '/'".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validate storage configuration.
    fn validate_storage(&self) -> Result<(), ConfigError> {
        let storage = &self.storage_resolved;
        if storage.backend == StorageBackend::S3 {
            require_non_empty(&storage.region, "storage.region")?;
        }
        if let Some(endpoint) = &storage.endpoint {
            require_http_url(endpoint, "storage.endpoint")?;
        }
        if let Some(url) = &storage.public_base_url {
            require_http_url(url, "storage.public_base_url")?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.deploy.bucket_prefix, "deploy.bucket_prefix")?;
        expand::expand_opt(&mut self.storage.region, "storage.region")?;
        expand::expand_opt(&mut self.storage.endpoint, "storage.endpoint")?;
        expand::expand_opt(&mut self.storage.public_base_url, "storage.public_base_url")?;
        Ok(())
    }

    /// Resolve raw values against the config directory.
    fn resolve(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));
        let deploy_defaults = DeployConfig::default();
        let storage_defaults = StorageConfig::default();

        self.deploy_resolved = DeployConfig {
            sites_dir: resolve(self.deploy.sites_dir.as_deref(), "websites"),
            bucket_prefix: self
                .deploy
                .bucket_prefix
                .clone()
                .unwrap_or(deploy_defaults.bucket_prefix),
            parallel: self.deploy.parallel.unwrap_or(deploy_defaults.parallel),
        };

        self.storage_resolved = StorageConfig {
            backend: self.storage.backend.unwrap_or_default(),
            region: self
                .storage
                .region
                .clone()
                .unwrap_or(storage_defaults.region),
            endpoint: self.storage.endpoint.clone(),
            output_dir: resolve(self.storage.output_dir.as_deref(), "out"),
            public_base_url: self.storage.public_base_url.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(
            config.deploy_resolved.sites_dir,
            PathBuf::from("/test/websites")
        );
        assert_eq!(config.deploy_resolved.bucket_prefix, "bucket-");
        assert!(config.deploy_resolved.parallel);
        assert_eq!(config.bucket.location, "US");
        assert_eq!(config.bucket.main_page_suffix, "index.html");
        assert!(config.bucket.uniform_access);
        assert_eq!(config.upload.cache_control, DEFAULT_CACHE_CONTROL);
        assert_eq!(config.rewrite.scope, RewriteMode::Literal);
        assert_eq!(config.storage_resolved.backend, StorageBackend::S3);
        assert_eq!(config.storage_resolved.region, "us-east-1");
        assert_eq!(config.storage_resolved.output_dir, PathBuf::from("/test/out"));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bucket.main_page_suffix, "index.html");
        assert_eq!(config.upload.cache_control, DEFAULT_CACHE_CONTROL);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[deploy]
sites_dir = "sites"
bucket_prefix = "web-"
parallel = false

[bucket]
location = "EU"
main_page_suffix = "home.html"
uniform_access = false

[upload]
cache_control = "no-cache"

[rewrite]
scope = "references"

[storage]
backend = "fs"
output_dir = "public"
public_base_url = "http://localhost:8000"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve(Path::new("/project"));

        assert_eq!(
            config.deploy_resolved.sites_dir,
            PathBuf::from("/project/sites")
        );
        assert_eq!(config.deploy_resolved.bucket_prefix, "web-");
        assert!(!config.deploy_resolved.parallel);
        assert_eq!(config.bucket.location, "EU");
        assert_eq!(config.bucket.main_page_suffix, "home.html");
        assert!(!config.bucket.uniform_access);
        assert_eq!(config.upload.cache_control, "no-cache");
        assert_eq!(config.rewrite.scope, RewriteMode::References);
        assert_eq!(config.storage_resolved.backend, StorageBackend::Fs);
        assert_eq!(
            config.storage_resolved.output_dir,
            PathBuf::from("/project/public")
        );
        assert_eq!(
            config.storage_resolved.public_base_url.as_deref(),
            Some("http://localhost:8000")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_unknown_scope_fails() {
        let toml = r#"
[rewrite]
scope = "everything"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[storage]\nbackend = \"s3\"\nregion = \"eu-west-1\"\nendpoint = \"http://localhost:4566\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.storage_resolved.region, "eu-west-1");
        assert_eq!(
            config.storage_resolved.endpoint.as_deref(),
            Some("http://localhost:4566")
        );
        assert_eq!(
            config.deploy_resolved.sites_dir,
            temp.path().join("websites")
        );
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/sitepush.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            sites_dir: Some(PathBuf::from("/custom/sites")),
            backend: Some(StorageBackend::Fs),
            rewrite_scope: Some(RewriteMode::References),
            parallel: Some(false),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(
            config.deploy_resolved.sites_dir,
            PathBuf::from("/custom/sites")
        );
        assert_eq!(config.storage_resolved.backend, StorageBackend::Fs);
        assert_eq!(config.rewrite.scope, RewriteMode::References);
        assert!(!config.deploy_resolved.parallel);
        // Unchanged
        assert_eq!(config.storage_resolved.region, "us-east-1");
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.apply_cli_settings(&CliSettings::default());
        assert_eq!(
            config.deploy_resolved.sites_dir,
            PathBuf::from("/test/websites")
        );
        assert!(config.storage_resolved.endpoint.is_none());
    }

    #[test]
    fn test_expand_env_vars_storage() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("SITEPUSH_CONFIG_TEST_ENDPOINT", "http://minio:9000");
        }
        let toml = r#"
[storage]
endpoint = "${SITEPUSH_CONFIG_TEST_ENDPOINT}"
region = "${SITEPUSH_CONFIG_TEST_REGION_UNSET:-ap-south-1}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();
        config.resolve(Path::new("/project"));

        assert_eq!(
            config.storage_resolved.endpoint.as_deref(),
            Some("http://minio:9000")
        );
        assert_eq!(config.storage_resolved.region, "ap-south-1");
        unsafe {
            std::env::remove_var("SITEPUSH_CONFIG_TEST_ENDPOINT");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("SITEPUSH_CONFIG_TEST_MISSING");
        }
        let toml = r#"
[storage]
public_base_url = "${SITEPUSH_CONFIG_TEST_MISSING}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("storage.public_base_url"));
    }

    // Validation tests

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let result = config.validate();
        assert!(result.is_err(), "Expected validation to fail");
        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(
                msg.contains(s),
                "Expected error to contain '{s}', got: {msg}"
            );
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_cache_control() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.upload.cache_control = "  ".to_owned();
        assert_validation_error(&config, &["upload.cache_control", "empty"]);
    }

    #[test]
    fn test_validate_main_page_suffix() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.bucket.main_page_suffix = "docs/index.html".to_owned();
        assert_validation_error(&config, &["bucket.main_page_suffix"]);
    }

    #[test]
    fn test_validate_bucket_prefix() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.deploy_resolved.bucket_prefix = "Bucket_".to_owned();
        assert_validation_error(&config, &["deploy.bucket_prefix"]);
    }

    #[test]
    fn test_validate_endpoint_scheme() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.storage_resolved.endpoint = Some("localhost:4566".to_owned());
        assert_validation_error(&config, &["storage.endpoint", "http://"]);
    }

    #[test]
    fn test_validate_region_only_required_for_s3() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.storage_resolved.region = String::new();
        assert_validation_error(&config, &["storage.region"]);

        config.storage_resolved.backend = StorageBackend::Fs;
        assert!(config.validate().is_ok());
    }
}
