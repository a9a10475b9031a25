//! Site publishing for sitepush.
//!
//! Each site directory is published to its own bucket:
//!
//! 1. [`SiteTree::scan`] lists the site's files in a stable order.
//! 2. [`plan_site`] names every file (CSS and JS get a content token) and
//!    rewrites the entry document against the resulting rename map.
//! 3. [`Publisher::publish`] provisions the bucket, uploads every file and
//!    the rewritten entry document, and opens the bucket for public reads.
//!
//! [`deploy_all`] runs the publisher over every site under a sites root and
//! collects one result per site.

mod driver;
mod publisher;
mod site;

pub use driver::{DeployReport, SiteOutcome, deploy_all};
pub use publisher::{
    EntryPlan, PublishConfig, PublishError, PublishResult, Publisher, SitePlan, bucket_name_for,
    plan_site,
};
pub use site::{ENTRY_DOCUMENT, SiteTree, SourceFile, discover_sites};
