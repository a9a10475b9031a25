//! Object store trait and error types.
//!
//! Provides the [`ObjectStore`] trait the publisher drives, along with
//! [`StoreError`] for unified error handling across backends.

use std::fmt;

/// Role granted to the public on published buckets.
pub const OBJECT_VIEWER_ROLE: &str = "roles/storage.objectViewer";

/// Principal meaning "everyone, unauthenticated included".
pub const ALL_USERS: &str = "allUsers";

/// Cache-Control sent with every object unless configured otherwise.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=0, no-cache, no-store, must-revalidate";

/// Bucket settings for static website hosting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    /// Bucket name.
    pub name: String,
    /// Bucket location (e.g. "US", "eu-west-1").
    pub location: String,
    /// Document served for directory requests (e.g. "index.html").
    pub main_page_suffix: String,
    /// Use bucket-level access control only (no per-object ACLs).
    pub uniform_access: bool,
}

impl BucketSpec {
    /// Create a spec with default website settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: "US".to_owned(),
            main_page_suffix: "index.html".to_owned(),
            uniform_access: true,
        }
    }
}

/// A single object upload.
#[derive(Debug)]
pub struct PutObject<'a> {
    /// Target bucket.
    pub bucket: &'a str,
    /// Object name within the bucket.
    pub key: &'a str,
    /// Object content.
    pub body: Vec<u8>,
    /// Content-Type header value.
    pub content_type: &'a str,
    /// Cache-Control header value.
    pub cache_control: &'a str,
}

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// Bucket or object does not exist.
    NotFound,
    /// Credentials missing or insufficient.
    PermissionDenied,
    /// Bucket already exists and is owned by someone else.
    AlreadyExists,
    /// Invalid bucket name or object key.
    InvalidName,
    /// Backend is temporarily unavailable.
    Unavailable,
    /// Too many requests.
    RateLimited,
    /// Operation timed out.
    Timeout,
    /// Other/unknown error category.
    Other,
}

/// Retry guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatus {
    /// Don't retry (bad name, permission denied).
    #[default]
    Permanent,
    /// Retry immediately (timeout, connection reset).
    Temporary,
    /// Retry with backoff (rate limited, service unavailable).
    Persistent,
}

/// Store error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StoreError {
    /// Semantic error category.
    pub kind: StoreErrorKind,
    /// Retry guidance.
    pub status: ErrorStatus,
    /// Bucket context (if applicable).
    pub bucket: Option<String>,
    /// Object key context (if applicable).
    pub key: Option<String>,
    /// Backend identifier (e.g., "Fs", "S3").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            kind,
            status: ErrorStatus::Permanent,
            bucket: None,
            key: None,
            backend: None,
            source: None,
        }
    }

    /// Attach bucket context.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Attach object key context.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set retry status.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a plain message as the error source.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message: String = message.into();
        self.source = Some(message.into());
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a store error from an I/O error.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StoreErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => StoreErrorKind::AlreadyExists,
            std::io::ErrorKind::TimedOut => StoreErrorKind::Timeout,
            _ => StoreErrorKind::Other,
        };
        let status = match err.kind() {
            std::io::ErrorKind::TimedOut => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Self::new(kind).with_status(status).with_source(err)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format: "[Backend] Kind: message (bucket: b, key: k)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StoreErrorKind::NotFound => "Not found",
            StoreErrorKind::PermissionDenied => "Permission denied",
            StoreErrorKind::AlreadyExists => "Already exists",
            StoreErrorKind::InvalidName => "Invalid name",
            StoreErrorKind::Unavailable => "Unavailable",
            StoreErrorKind::RateLimited => "Rate limited",
            StoreErrorKind::Timeout => "Timeout",
            StoreErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => write!(f, " (bucket: {bucket}, key: {key})")?,
            (Some(bucket), None) => write!(f, " (bucket: {bucket})")?,
            (None, Some(key)) => write!(f, " (key: {key})")?,
            (None, None) => {}
        }

        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Storage provider capabilities needed to publish a static site.
///
/// Calls block until the provider has acknowledged the operation. Retries and
/// timeouts are the implementation's business; callers never retry.
pub trait ObjectStore: Send + Sync {
    /// Create a bucket configured for static website hosting.
    ///
    /// Creating a bucket that already exists and belongs to the caller
    /// succeeds.
    fn create_bucket(&self, spec: &BucketSpec) -> Result<(), StoreError>;

    /// Store an object, replacing any existing object with the same key.
    fn put_object(&self, object: PutObject<'_>) -> Result<(), StoreError>;

    /// Grant `role` on the bucket to every principal in `members`.
    fn grant_public_read(&self, bucket: &str, role: &str, members: &[&str])
    -> Result<(), StoreError>;

    /// Public base URL of a bucket (no trailing slash).
    fn public_url(&self, bucket: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_spec_defaults() {
        let spec = BucketSpec::new("bucket-blog");
        assert_eq!(spec.name, "bucket-blog");
        assert_eq!(spec.location, "US");
        assert_eq!(spec.main_page_suffix, "index.html");
        assert!(spec.uniform_access);
    }

    #[test]
    fn test_store_error_new() {
        let err = StoreError::new(StoreErrorKind::NotFound);

        assert_eq!(err.kind, StoreErrorKind::NotFound);
        assert_eq!(err.status, ErrorStatus::Permanent);
        assert!(err.bucket.is_none());
        assert!(err.key.is_none());
        assert!(err.backend.is_none());
    }

    #[test]
    fn test_store_error_with_status() {
        let err = StoreError::new(StoreErrorKind::Timeout).with_status(ErrorStatus::Temporary);

        assert_eq!(err.status, ErrorStatus::Temporary);
    }

    #[test]
    fn test_store_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StoreError::new(StoreErrorKind::NotFound).with_source(io_err);

        assert!(err.downcast_source::<std::io::Error>().is_some());
    }

    #[test]
    fn test_store_error_io_kinds() {
        let err = StoreError::io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind, StoreErrorKind::PermissionDenied);
        assert_eq!(err.status, ErrorStatus::Permanent);

        let err = StoreError::io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(err.kind, StoreErrorKind::Timeout);
        assert_eq!(err.status, ErrorStatus::Temporary);
    }

    #[test]
    fn test_store_error_display_full() {
        let err = StoreError::new(StoreErrorKind::PermissionDenied)
            .with_backend("S3")
            .with_message("access denied")
            .with_bucket("bucket-blog")
            .with_key("main.js");

        assert_eq!(
            err.to_string(),
            "[S3] Permission denied: access denied (bucket: bucket-blog, key: main.js)"
        );
    }

    #[test]
    fn test_store_error_display_minimal() {
        let err = StoreError::new(StoreErrorKind::Other);
        assert_eq!(err.to_string(), "Error");
    }

    #[test]
    fn test_store_error_display_bucket_only() {
        let err = StoreError::new(StoreErrorKind::AlreadyExists).with_bucket("taken");
        assert_eq!(err.to_string(), "Already exists (bucket: taken)");
    }
}
