//! In-memory object store for testing.
//!
//! Provides [`MemoryStore`] for unit testing publishers without touching disk
//! or the network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use crate::store::{BucketSpec, ObjectStore, PutObject, StoreError, StoreErrorKind};

const BACKEND: &str = "Memory";

/// An object captured by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object content.
    pub body: Vec<u8>,
    /// Content-Type it was uploaded with.
    pub content_type: String,
    /// Cache-Control it was uploaded with.
    pub cache_control: String,
}

/// In-memory store recording every call.
///
/// # Example
///
/// ```ignore
/// use sitepush_storage::{BucketSpec, MemoryStore, ObjectStore};
///
/// let store = MemoryStore::new().with_failing_bucket("bucket-broken");
/// assert!(store.create_bucket(&BucketSpec::new("bucket-broken")).is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BucketSpec>>,
    objects: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    grants: RwLock<HashMap<String, Vec<(String, Vec<String>)>>>,
    failing_buckets: RwLock<HashSet<String>>,
    failing_keys: RwLock<HashSet<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_bucket` fail for the given bucket.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failing_bucket(self, bucket: impl Into<String>) -> Self {
        self.failing_buckets.write().unwrap().insert(bucket.into());
        self
    }

    /// Make `put_object` fail for the given key, in any bucket.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failing_key(self, key: impl Into<String>) -> Self {
        self.failing_keys.write().unwrap().insert(key.into());
        self
    }

    /// Spec a bucket was created with.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<BucketSpec> {
        self.buckets.read().unwrap().get(name).cloned()
    }

    /// Object stored under `key` in `bucket`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects.read().unwrap().get(bucket)?.get(key).cloned()
    }

    /// Sorted object keys of a bucket.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .unwrap()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `(role, members)` grants recorded for a bucket, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn grants(&self, bucket: &str) -> Vec<(String, Vec<String>)> {
        self.grants
            .read()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    fn injected(bucket: &str) -> StoreError {
        StoreError::new(StoreErrorKind::Unavailable)
            .with_backend(BACKEND)
            .with_message("injected failure")
            .with_bucket(bucket)
    }
}

impl ObjectStore for MemoryStore {
    fn create_bucket(&self, spec: &BucketSpec) -> Result<(), StoreError> {
        if self.failing_buckets.read().unwrap().contains(&spec.name) {
            return Err(Self::injected(&spec.name));
        }
        self.buckets
            .write()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn put_object(&self, object: PutObject<'_>) -> Result<(), StoreError> {
        if !self.buckets.read().unwrap().contains_key(object.bucket) {
            return Err(StoreError::new(StoreErrorKind::NotFound)
                .with_backend(BACKEND)
                .with_bucket(object.bucket));
        }
        if self.failing_keys.read().unwrap().contains(object.key) {
            return Err(Self::injected(object.bucket).with_key(object.key));
        }
        self.objects
            .write()
            .unwrap()
            .entry(object.bucket.to_owned())
            .or_default()
            .insert(
                object.key.to_owned(),
                StoredObject {
                    body: object.body,
                    content_type: object.content_type.to_owned(),
                    cache_control: object.cache_control.to_owned(),
                },
            );
        Ok(())
    }

    fn grant_public_read(
        &self,
        bucket: &str,
        role: &str,
        members: &[&str],
    ) -> Result<(), StoreError> {
        if !self.buckets.read().unwrap().contains_key(bucket) {
            return Err(StoreError::new(StoreErrorKind::NotFound)
                .with_backend(BACKEND)
                .with_bucket(bucket));
        }
        self.grants
            .write()
            .unwrap()
            .entry(bucket.to_owned())
            .or_default()
            .push((
                role.to_owned(),
                members.iter().map(|&m| m.to_owned()).collect(),
            ));
        Ok(())
    }

    fn public_url(&self, bucket: &str) -> String {
        format!("https://storage.example.test/{bucket}")
    }
}
