//! `sitepush plan` command implementation.

use std::path::PathBuf;

use clap::Args;
use sitepush_config::{CliSettings, Config};
use sitepush_deploy::{SitePlan, SiteTree, bucket_name_for, discover_sites, plan_site};

use super::{ScopeArg, publish_config};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the plan command.
#[derive(Args)]
pub(crate) struct PlanArgs {
    /// Path to configuration file (default: auto-discover sitepush.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with one subdirectory per site (overrides config).
    #[arg(short, long)]
    sites_dir: Option<PathBuf>,

    /// Where asset file names are replaced in index.html (overrides config).
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl PlanArgs {
    /// Execute the plan command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the sites directory cannot be
    /// listed, or any site cannot be planned.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            sites_dir: self.sites_dir,
            rewrite_scope: self.scope.map(Into::into),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        tracing::debug!(config_path = ?config.config_path, "Loaded configuration");
        let publish = publish_config(&config);

        let site_dirs = discover_sites(&config.deploy_resolved.sites_dir)?;
        if site_dirs.is_empty() {
            output.warning("No sites found");
            return Ok(());
        }

        let mut failed = 0;
        for dir in &site_dirs {
            match SiteTree::scan(dir).and_then(|tree| plan_site(&tree, publish.scope)) {
                Ok(plan) => {
                    let bucket = bucket_name_for(&publish.bucket_prefix, &plan.site);
                    print_plan(&output, &plan, &bucket);
                }
                Err(e) => {
                    failed += 1;
                    output.error(&format!("{}: {e}", dir.display()));
                }
            }
        }

        if failed > 0 {
            return Err(CliError::SitesFailed {
                failed,
                total: site_dirs.len(),
            });
        }
        Ok(())
    }
}

fn print_plan(output: &Output, plan: &SitePlan, bucket: &str) {
    output.highlight(&format!(
        "{} -> {bucket} ({} files)",
        plan.site,
        plan.records.len()
    ));
    for (original, name) in plan.renames.renamed() {
        output.info(&format!("  {original} -> {name}"));
    }
    match &plan.entry {
        Some(entry) => output.success(&format!(
            "  entry: {} -> {}",
            entry.source_path, entry.object_name
        )),
        None => output.warning("  no index.html"),
    }
}
