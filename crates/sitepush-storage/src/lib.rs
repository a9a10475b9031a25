//! Object storage abstraction for sitepush.
//!
//! The deployment pipeline only needs three capabilities from a storage
//! provider, captured by the [`ObjectStore`] trait:
//!
//! - create a bucket configured for static website hosting
//! - put an object with a content type and cache-control directive
//! - grant public read access on a bucket
//!
//! # Implementations
//!
//! - [`FsStore`]: writes buckets as directories on disk (local preview)
//! - [`MemoryStore`]: in-memory store for testing (behind `mock` feature flag)
//! - `S3Store` in the `sitepush-storage-s3` crate
//!
//! # Example
//!
//! ```ignore
//! use sitepush_storage::{BucketSpec, FsStore, ObjectStore};
//!
//! let store = FsStore::new("out".into());
//! store.create_bucket(&BucketSpec::new("bucket-blog"))?;
//! println!("{}", store.public_url("bucket-blog"));
//! ```

mod fs;
#[cfg(feature = "mock")]
mod memory;
mod store;

pub use fs::FsStore;
#[cfg(feature = "mock")]
pub use memory::{MemoryStore, StoredObject};
pub use store::{
    ALL_USERS, BucketSpec, DEFAULT_CACHE_CONTROL, ErrorStatus, OBJECT_VIEWER_ROLE, ObjectStore,
    PutObject, StoreError, StoreErrorKind,
};
