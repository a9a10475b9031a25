//! `sitepush deploy` command implementation.

use std::path::PathBuf;

use clap::Args;
use sitepush_config::{CliSettings, Config};
use sitepush_deploy::{DeployReport, Publisher, deploy_all};

use super::{BackendArg, ScopeArg, build_store, publish_config};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the deploy command.
#[derive(Args)]
pub(crate) struct DeployArgs {
    /// Path to configuration file (default: auto-discover sitepush.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with one subdirectory per site (overrides config).
    #[arg(short, long)]
    sites_dir: Option<PathBuf>,

    /// Storage backend (overrides config).
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Output directory for the fs backend (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// S3 region (overrides config).
    #[arg(long)]
    region: Option<String>,

    /// S3-compatible endpoint URL (overrides config).
    #[arg(long)]
    endpoint: Option<String>,

    /// Where asset file names are replaced in index.html (overrides config).
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,

    /// Publish sites one after another.
    #[arg(long)]
    sequential: bool,

    /// Print bucket and entry URLs as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl DeployArgs {
    /// Execute the deploy command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the sites directory cannot be
    /// listed, or any site fails to publish.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            sites_dir: self.sites_dir,
            backend: self.backend.map(Into::into),
            output_dir: self.output_dir,
            region: self.region,
            endpoint: self.endpoint,
            rewrite_scope: self.scope.map(Into::into),
            parallel: self.sequential.then_some(false),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        tracing::debug!(config_path = ?config.config_path, "Loaded configuration");

        output.info(&format!(
            "Deploying sites from {}",
            config.deploy_resolved.sites_dir.display()
        ));

        let publisher = Publisher::new(build_store(&config)?, publish_config(&config));
        let report = deploy_all(
            &publisher,
            &config.deploy_resolved.sites_dir,
            config.deploy_resolved.parallel,
        )?;

        print_report(&output, &report);
        if self.json {
            output.data(&report_json(&report)?);
        }

        let failed = report.failures().count();
        if failed > 0 {
            return Err(CliError::SitesFailed {
                failed,
                total: report.sites.len(),
            });
        }
        Ok(())
    }
}

fn print_report(output: &Output, report: &DeployReport) {
    if report.sites.is_empty() {
        output.warning("No sites found");
        return;
    }

    for outcome in &report.sites {
        match &outcome.result {
            Ok(result) => {
                output.success(&format!(
                    "{}: published {} objects to {}",
                    result.site, result.uploaded, result.bucket
                ));
                output.detail(&format!("  bucket: {}", result.base_url));
                match &result.entry_url {
                    Some(url) => output.highlight(&format!("  entry:  {url}")),
                    None => output.warning("  no index.html, no entry URL"),
                }
            }
            Err(e) => output.error(&format!("{}: {e}", outcome.site)),
        }
    }
}

/// Render the report as `{"bucketName": {...}, "siteEndpoints": {...}}`.
fn report_json(report: &DeployReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&serde_json::json!({
        "bucketName": report.bucket_urls(),
        "siteEndpoints": report.site_endpoints(),
    }))
}
