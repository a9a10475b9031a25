//! Publishing a single site to its own bucket.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use sitepush_assets::{
    AssetRecord, NameCollision, RenameMap, RewriteScope, hash_bytes, hash_file, name_asset,
    object_name, rewrite,
};
use sitepush_storage::{
    ALL_USERS, BucketSpec, DEFAULT_CACHE_CONTROL, OBJECT_VIEWER_ROLE, ObjectStore, PutObject,
    StoreError,
};

use crate::site::{ENTRY_DOCUMENT, SiteTree};

/// Content-Type of the rewritten entry document.
const ENTRY_CONTENT_TYPE: &str = "text/html";

/// Settings shared by every site of a deployment.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Prepended to the site name to form the bucket name.
    pub bucket_prefix: String,
    /// Bucket location.
    pub location: String,
    /// Document served for directory requests.
    pub main_page_suffix: String,
    /// Bucket-level access control only.
    pub uniform_access: bool,
    /// Cache-Control header sent with every object.
    pub cache_control: String,
    /// Where file names are substituted in the entry document.
    pub scope: RewriteScope,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bucket_prefix: "bucket-".to_owned(),
            location: "US".to_owned(),
            main_page_suffix: "index.html".to_owned(),
            uniform_access: true,
            cache_control: DEFAULT_CACHE_CONTROL.to_owned(),
            scope: RewriteScope::default(),
        }
    }
}

impl PublishConfig {
    /// Bucket settings for a site.
    #[must_use]
    pub fn bucket_spec(&self, site: &str) -> BucketSpec {
        BucketSpec {
            name: bucket_name_for(&self.bucket_prefix, site),
            location: self.location.clone(),
            main_page_suffix: self.main_page_suffix.clone(),
            uniform_access: self.uniform_access,
        }
    }
}

/// Error returned by the publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Name collision: {0}")]
    Collision(#[from] NameCollision),
    #[error("Site directory not found: {}", .0.display())]
    SiteNotFound(PathBuf),
    #[error(
        "Bucket {bucket} for {} is already used by {}",
        site.display(),
        claimed_by.display()
    )]
    BucketConflict {
        bucket: String,
        site: PathBuf,
        claimed_by: PathBuf,
    },
}

/// Derive a bucket name from a prefix and a site name.
///
/// Lowercases the result and replaces anything outside `[a-z0-9-]` with `-`.
#[must_use]
pub fn bucket_name_for(prefix: &str, site: &str) -> String {
    format!("{prefix}{site}")
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// The rewritten entry document of a site.
#[derive(Debug, Clone)]
pub struct EntryPlan {
    /// Relative path of the source `index.html`.
    pub source_path: String,
    /// Rewritten document.
    pub content: String,
    /// Object name of the rewritten document.
    pub object_name: String,
}

/// Everything the publisher decides for a site before talking to storage.
#[derive(Debug, Clone)]
pub struct SitePlan {
    /// Site name.
    pub site: String,
    /// Naming decision per file, in discovery order.
    pub records: Vec<AssetRecord>,
    /// Original path to object name, for every file.
    pub renames: RenameMap,
    /// Rewritten entry document, if the site has one.
    pub entry: Option<EntryPlan>,
}

/// Object name of a rewritten entry document with the given content.
fn entry_object_name(content: &[u8]) -> String {
    object_name(ENTRY_DOCUMENT, Some(&hash_bytes(content)))
}

/// Name every file of a site and rewrite its entry document.
///
/// CSS and JS files are hashed in parallel. The complete rename map is built
/// before the entry document is rewritten.
pub fn plan_site(tree: &SiteTree, scope: RewriteScope) -> Result<SitePlan, PublishError> {
    let records = tree
        .files
        .par_iter()
        .map(|file| {
            name_asset(&file.relative_path, &file.absolute_path).map_err(|source| {
                PublishError::Io {
                    path: file.absolute_path.clone(),
                    source,
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let renames = RenameMap::from_records(&records)?;

    let entry = match tree.entry_document() {
        Some(source) => {
            let bytes = fs::read(&source.absolute_path).map_err(|e| PublishError::Io {
                path: source.absolute_path.clone(),
                source: e,
            })?;
            // Legacy encodings are decoded with replacement characters
            let html = String::from_utf8_lossy(&bytes);
            let content = rewrite(&html, &renames, &tree.directories, scope);
            Some(EntryPlan {
                source_path: source.relative_path.clone(),
                object_name: entry_object_name(content.as_bytes()),
                content,
            })
        }
        None => None,
    };

    Ok(SitePlan {
        site: tree.name.clone(),
        records,
        renames,
        entry,
    })
}

/// Outcome of publishing one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    /// Site name.
    pub site: String,
    /// Bucket the site was published to.
    pub bucket: String,
    /// Public base URL of the bucket.
    pub base_url: String,
    /// Object name of the rewritten entry document.
    pub entry_object: Option<String>,
    /// Public URL of the rewritten entry document.
    pub entry_url: Option<String>,
    /// Number of objects uploaded.
    pub uploaded: usize,
}

/// Publishes sites to an object store.
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    config: PublishConfig,
}

impl Publisher {
    /// Create a publisher writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: PublishConfig) -> Self {
        Self { store, config }
    }

    /// Name of the bucket a site is published to.
    #[must_use]
    pub fn bucket_name(&self, site: &str) -> String {
        bucket_name_for(&self.config.bucket_prefix, site)
    }

    /// Publish a site to its bucket.
    ///
    /// Creates the bucket, uploads every file under its final name, uploads
    /// the rewritten entry document and opens the bucket for public reads.
    /// The first failure aborts the site; nothing already uploaded is removed.
    pub fn publish(&self, tree: &SiteTree) -> Result<PublishResult, PublishError> {
        let spec = self.config.bucket_spec(&tree.name);
        tracing::info!(site = %tree.name, bucket = %spec.name, files = tree.files.len(), "Publishing site");

        self.store.create_bucket(&spec)?;
        let bucket = spec.name.as_str();

        let plan = plan_site(tree, self.config.scope)?;
        for (file, record) in tree.files.iter().zip(&plan.records) {
            let body = fs::read(&file.absolute_path).map_err(|source| PublishError::Io {
                path: file.absolute_path.clone(),
                source,
            })?;
            self.upload(bucket, &record.object_name, body, record.content_type)?;
        }
        let mut uploaded = plan.records.len();

        let entry_object = match &plan.entry {
            Some(entry) => {
                let name = self.upload_entry(bucket, entry)?;
                uploaded += 1;
                Some(name)
            }
            None => {
                tracing::info!(site = %tree.name, "No {ENTRY_DOCUMENT}, skipping entry document");
                None
            }
        };

        self.store
            .grant_public_read(bucket, OBJECT_VIEWER_ROLE, &[ALL_USERS])?;

        let base_url = self.store.public_url(bucket);
        let entry_url = entry_object
            .as_ref()
            .map(|name| format!("{}/{name}", base_url.trim_end_matches('/')));

        tracing::info!(site = %tree.name, bucket, uploaded, "Published site");
        Ok(PublishResult {
            site: tree.name.clone(),
            bucket: spec.name.clone(),
            base_url,
            entry_object,
            entry_url,
            uploaded,
        })
    }

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PublishError> {
        let size = body.len();
        self.store.put_object(PutObject {
            bucket,
            key,
            body,
            content_type,
            cache_control: &self.config.cache_control,
        })?;
        tracing::debug!(bucket, key, size, "Uploaded");
        Ok(())
    }

    /// Stage the rewritten entry document in a temporary file, name it after
    /// the file's hash and upload it. Returns the object name.
    fn upload_entry(&self, bucket: &str, entry: &EntryPlan) -> Result<String, PublishError> {
        let mut staged = tempfile::Builder::new()
            .prefix("sitepush-entry-")
            .suffix(".html")
            .tempfile()
            .map_err(|source| PublishError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let staged_path = staged.path().to_path_buf();
        let staged_io = |source| PublishError::Io {
            path: staged_path.clone(),
            source,
        };

        staged
            .write_all(entry.content.as_bytes())
            .and_then(|()| staged.flush())
            .map_err(staged_io)?;
        let token = hash_file(&staged_path).map_err(staged_io)?;
        let name = object_name(ENTRY_DOCUMENT, Some(&token));
        let body = fs::read(&staged_path).map_err(staged_io)?;

        self.upload(bucket, &name, body, ENTRY_CONTENT_TYPE)?;
        Ok(name)
    }
}
