//! Deployment of every site under a sites root.
//!
//! Sites are independent: each gets its own bucket and a failure in one
//! site never stops the others. Results are collected per site.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::publisher::{PublishError, PublishResult, Publisher};
use crate::site::{SiteTree, discover_sites};

/// Result of publishing one site.
#[derive(Debug)]
pub struct SiteOutcome {
    /// Site name.
    pub site: String,
    /// Site directory.
    pub path: PathBuf,
    /// Publish result or the error that aborted the site.
    pub result: Result<PublishResult, PublishError>,
}

/// Results of a deployment, in site name order.
#[derive(Debug, Default)]
pub struct DeployReport {
    /// One outcome per site.
    pub sites: Vec<SiteOutcome>,
}

impl DeployReport {
    /// Successfully published sites.
    pub fn published(&self) -> impl Iterator<Item = &PublishResult> {
        self.sites.iter().filter_map(|s| s.result.as_ref().ok())
    }

    /// Sites that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &PublishError)> {
        self.sites
            .iter()
            .filter_map(|s| s.result.as_ref().err().map(|e| (s.site.as_str(), e)))
    }

    /// True if any site failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Site name to bucket base URL, for published sites.
    #[must_use]
    pub fn bucket_urls(&self) -> BTreeMap<String, String> {
        self.published()
            .map(|r| (r.site.clone(), r.base_url.clone()))
            .collect()
    }

    /// Site name to entry document URL, for published sites that have one.
    #[must_use]
    pub fn site_endpoints(&self) -> BTreeMap<String, String> {
        self.published()
            .filter_map(|r| Some((r.site.clone(), r.entry_url.clone()?)))
            .collect()
    }
}

fn site_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Assign buckets to sites in order. A site whose bucket name is already
/// taken by an earlier site gets a conflict error instead.
fn claim_buckets(
    publisher: &Publisher,
    site_dirs: Vec<PathBuf>,
) -> Vec<(PathBuf, Option<PublishError>)> {
    let mut owners: HashMap<String, PathBuf> = HashMap::new();
    site_dirs
        .into_iter()
        .map(|path| {
            let bucket = publisher.bucket_name(&site_name(&path));
            let conflict = match owners.get(&bucket) {
                Some(owner) => Some(PublishError::BucketConflict {
                    bucket,
                    site: path.clone(),
                    claimed_by: owner.clone(),
                }),
                None => {
                    owners.insert(bucket, path.clone());
                    None
                }
            };
            (path, conflict)
        })
        .collect()
}

fn publish_site(
    publisher: &Publisher,
    path: PathBuf,
    conflict: Option<PublishError>,
) -> SiteOutcome {
    let site = site_name(&path);
    let result = match conflict {
        Some(e) => Err(e),
        None => SiteTree::scan(&path).and_then(|tree| publisher.publish(&tree)),
    };
    if let Err(e) = &result {
        tracing::warn!(site = %site, error = %e, "Site failed");
    }
    SiteOutcome { site, path, result }
}

/// Publish every site directory under `sites_dir`.
///
/// Bucket names are assigned before any site is published. When two site
/// directories map to the same bucket, the first in name order keeps it and
/// the later one fails with [`PublishError::BucketConflict`].
///
/// With `parallel`, sites are published concurrently on the rayon pool and
/// joined before the report is built. Fails only if the sites root itself
/// cannot be listed.
pub fn deploy_all(
    publisher: &Publisher,
    sites_dir: &Path,
    parallel: bool,
) -> Result<DeployReport, PublishError> {
    let site_dirs = discover_sites(sites_dir)?;
    tracing::info!(
        sites = site_dirs.len(),
        root = %sites_dir.display(),
        parallel,
        "Deploying sites"
    );

    let claimed = claim_buckets(publisher, site_dirs);
    let sites: Vec<SiteOutcome> = if parallel {
        claimed
            .into_par_iter()
            .map(|(path, conflict)| publish_site(publisher, path, conflict))
            .collect()
    } else {
        claimed
            .into_iter()
            .map(|(path, conflict)| publish_site(publisher, path, conflict))
            .collect()
    };

    let report = DeployReport { sites };
    tracing::info!(
        published = report.published().count(),
        failed = report.failures().count(),
        "Deployment finished"
    );
    Ok(report)
}
