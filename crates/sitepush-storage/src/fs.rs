//! Filesystem object store.
//!
//! [`FsStore`] lays buckets out as directories so a deployment can be
//! previewed locally or served by any static file server:
//!
//! ```text
//! {root}/
//! +-- bucket-blog/
//!     +-- .sitepush-bucket.json   # website settings, grants, object metadata
//!     +-- index-1a2b3c4d.html
//!     +-- css/
//!         +-- site-5e6f7a8b.css
//! ```
//!
//! Object metadata is kept in memory and the manifest is written when the
//! bucket is created, when access is granted, on [`FsStore::flush`] and when
//! the store is dropped.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::store::{BucketSpec, ObjectStore, PutObject, StoreError, StoreErrorKind};

const BACKEND: &str = "Fs";

/// Per-bucket metadata file, stored next to the objects.
const MANIFEST_FILENAME: &str = ".sitepush-bucket.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct BucketManifest {
    location: String,
    main_page_suffix: String,
    uniform_access: bool,
    /// Role -> granted members.
    #[serde(default)]
    grants: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    objects: BTreeMap<String, ObjectMeta>,
    /// Objects changed since the manifest was last written.
    #[serde(skip)]
    dirty: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    cache_control: String,
    size: u64,
}

/// Object store backed by a local directory.
pub struct FsStore {
    root: PathBuf,
    public_base_url: Option<String>,
    manifests: Mutex<HashMap<String, BucketManifest>>,
}

impl FsStore {
    /// Create a store rooted at `root`. Buckets become subdirectories.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            public_base_url: None,
            manifests: Mutex::new(HashMap::new()),
        }
    }

    /// Report bucket URLs under `base_url` instead of `file://` paths.
    #[must_use]
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into());
        self
    }

    /// Directory holding a bucket's objects.
    #[must_use]
    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, BucketManifest>>, StoreError> {
        self.manifests.lock().map_err(|_| {
            StoreError::new(StoreErrorKind::Other)
                .with_backend(BACKEND)
                .with_message("manifest lock poisoned")
        })
    }

    /// Write every manifest with unsaved object metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest cannot be serialized or written.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut manifests = self.lock()?;
        for (bucket, manifest) in manifests.iter_mut().filter(|(_, m)| m.dirty) {
            self.write_manifest(bucket, manifest)?;
        }
        Ok(())
    }

    fn write_manifest(
        &self,
        bucket: &str,
        manifest: &mut BucketManifest,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| {
            StoreError::new(StoreErrorKind::Other)
                .with_backend(BACKEND)
                .with_bucket(bucket)
                .with_source(e)
        })?;
        fs::write(self.bucket_dir(bucket).join(MANIFEST_FILENAME), json)
            .map_err(|e| io_error(e, bucket, None))?;
        manifest.dirty = false;
        Ok(())
    }

    /// Read an existing manifest left by a previous run, if any.
    fn read_manifest(&self, bucket: &str) -> Option<BucketManifest> {
        let content = fs::read(self.bucket_dir(bucket).join(MANIFEST_FILENAME)).ok()?;
        serde_json::from_slice(&content).ok()
    }
}

impl Drop for FsStore {
    fn drop(&mut self) {
        // A poisoned lock means a writer panicked mid-update; leave the
        // last written manifest in place.
        if self.manifests.is_poisoned() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(
                root = %self.root.display(),
                error = %e,
                "Failed to write bucket manifests"
            );
        }
    }
}

fn io_error(err: std::io::Error, bucket: &str, key: Option<&str>) -> StoreError {
    let mut error = StoreError::io(err).with_backend(BACKEND).with_bucket(bucket);
    if let Some(key) = key {
        error = error.with_key(key);
    }
    error
}

fn validate_bucket_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StoreError::new(StoreErrorKind::InvalidName)
            .with_backend(BACKEND)
            .with_bucket(name));
    }
    Ok(())
}

/// Reject keys that would escape the bucket directory or clash with the manifest.
fn validate_key(bucket: &str, key: &str) -> Result<(), StoreError> {
    let path = Path::new(key);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if key.is_empty() || escapes || key == MANIFEST_FILENAME {
        return Err(StoreError::new(StoreErrorKind::InvalidName)
            .with_backend(BACKEND)
            .with_bucket(bucket)
            .with_key(key));
    }
    Ok(())
}

impl ObjectStore for FsStore {
    fn create_bucket(&self, spec: &BucketSpec) -> Result<(), StoreError> {
        validate_bucket_name(&spec.name)?;
        fs::create_dir_all(self.bucket_dir(&spec.name))
            .map_err(|e| io_error(e, &spec.name, None))?;

        let mut manifests = self.lock()?;
        let manifest = manifests
            .entry(spec.name.clone())
            .or_insert_with(|| self.read_manifest(&spec.name).unwrap_or_default());
        manifest.location.clone_from(&spec.location);
        manifest.main_page_suffix.clone_from(&spec.main_page_suffix);
        manifest.uniform_access = spec.uniform_access;
        self.write_manifest(&spec.name, manifest)?;

        tracing::debug!(bucket = %spec.name, root = %self.root.display(), "Created bucket");
        Ok(())
    }

    fn put_object(&self, object: PutObject<'_>) -> Result<(), StoreError> {
        validate_key(object.bucket, object.key)?;
        if !self.lock()?.contains_key(object.bucket) {
            return Err(StoreError::new(StoreErrorKind::NotFound)
                .with_backend(BACKEND)
                .with_bucket(object.bucket));
        }

        let path = self.bucket_dir(object.bucket).join(object.key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| io_error(e, object.bucket, Some(object.key)))?;
        }
        fs::write(&path, &object.body)
            .map_err(|e| io_error(e, object.bucket, Some(object.key)))?;

        let mut manifests = self.lock()?;
        if let Some(manifest) = manifests.get_mut(object.bucket) {
            manifest.objects.insert(
                object.key.to_owned(),
                ObjectMeta {
                    content_type: object.content_type.to_owned(),
                    cache_control: object.cache_control.to_owned(),
                    size: object.body.len() as u64,
                },
            );
            manifest.dirty = true;
        }
        Ok(())
    }

    fn grant_public_read(
        &self,
        bucket: &str,
        role: &str,
        members: &[&str],
    ) -> Result<(), StoreError> {
        let mut manifests = self.lock()?;
        let Some(manifest) = manifests.get_mut(bucket) else {
            return Err(StoreError::new(StoreErrorKind::NotFound)
                .with_backend(BACKEND)
                .with_bucket(bucket));
        };
        let granted = manifest.grants.entry(role.to_owned()).or_default();
        for member in members {
            if !granted.iter().any(|m| m == member) {
                granted.push((*member).to_owned());
            }
        }
        granted.sort();
        self.write_manifest(bucket, manifest)
    }

    fn public_url(&self, bucket: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{bucket}", base.trim_end_matches('/')),
            None => format!("file://{}", self.bucket_dir(bucket).display()),
        }
    }
}
