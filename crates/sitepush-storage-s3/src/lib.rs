//! S3 object store backend for sitepush.
//!
//! [`S3Store`] implements [`ObjectStore`] on top of `aws-sdk-s3`. The trait is
//! blocking, so the store owns a Tokio runtime and drives each SDK call to
//! completion with `block_on`. Retries and timeouts follow the SDK's standard
//! retry policy.
//!
//! Website hosting is configured as follows:
//!
//! - `create_bucket` creates the bucket in the configured region, enforces
//!   bucket-owner object ownership when uniform access is requested, allows
//!   public bucket policies, and sets the website index document
//! - `grant_public_read` attaches a bucket policy allowing `s3:GetObject` to
//!   everyone

use std::error::Error;

use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, IndexDocument, ObjectOwnership,
    OwnershipControls, OwnershipControlsRule, PublicAccessBlockConfiguration,
    WebsiteConfiguration,
};
use sitepush_storage::{
    ALL_USERS, BucketSpec, ErrorStatus, OBJECT_VIEWER_ROLE, ObjectStore, PutObject, StoreError,
    StoreErrorKind,
};
use tokio::runtime::Runtime;

const BACKEND: &str = "S3";

/// Region that rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for the S3 backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// AWS region.
    pub region: String,
    /// S3-compatible endpoint URL.
    pub endpoint: Option<String>,
    /// Base URL used when reporting bucket addresses.
    pub public_base_url: Option<String>,
}

/// Object store backed by Amazon S3 or an S3-compatible service.
pub struct S3Store {
    config: S3Config,
    client: Client,
    runtime: Runtime,
}

impl S3Store {
    /// Create a store, loading AWS credentials from the environment.
    pub fn new(config: S3Config) -> Result<Self, StoreError> {
        let runtime = Runtime::new().map_err(|e| StoreError::io(e).with_backend(BACKEND))?;
        let client = runtime.block_on(build_client(&config));
        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    async fn create_bucket_async(&self, spec: &BucketSpec) -> Result<(), StoreError> {
        let bucket = spec.name.as_str();
        validate_bucket_name(bucket)?;
        if spec.location != self.config.region {
            tracing::debug!(
                bucket,
                location = %spec.location,
                region = %self.config.region,
                "Using client region as bucket location"
            );
        }

        let mut request = self.client.create_bucket().bucket(bucket);
        if self.config.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => {}
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                tracing::debug!(bucket, "Bucket already exists");
            }
            Err(e) => return Err(sdk_error(&e).with_bucket(bucket)),
        }

        if spec.uniform_access {
            let rule = OwnershipControlsRule::builder()
                .object_ownership(ObjectOwnership::BucketOwnerEnforced)
                .build()
                .map_err(build_error)?;
            let controls = OwnershipControls::builder()
                .rules(rule)
                .build()
                .map_err(build_error)?;
            self.client
                .put_bucket_ownership_controls()
                .bucket(bucket)
                .ownership_controls(controls)
                .send()
                .await
                .map_err(|e| sdk_error(&e).with_bucket(bucket))?;
        }

        // Object ACLs stay blocked; access is granted through the bucket policy
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(true)
                    .ignore_public_acls(true)
                    .block_public_policy(false)
                    .restrict_public_buckets(false)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error(&e).with_bucket(bucket))?;

        let index = IndexDocument::builder()
            .suffix(&spec.main_page_suffix)
            .build()
            .map_err(build_error)?;
        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(WebsiteConfiguration::builder().index_document(index).build())
            .send()
            .await
            .map_err(|e| sdk_error(&e).with_bucket(bucket))?;

        Ok(())
    }
}

impl ObjectStore for S3Store {
    fn create_bucket(&self, spec: &BucketSpec) -> Result<(), StoreError> {
        self.runtime.block_on(self.create_bucket_async(spec))?;
        tracing::debug!(bucket = %spec.name, region = %self.config.region, "Created bucket");
        Ok(())
    }

    fn put_object(&self, object: PutObject<'_>) -> Result<(), StoreError> {
        let PutObject {
            bucket,
            key,
            body,
            content_type,
            cache_control,
        } = object;

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(body))
                    .content_type(content_type)
                    .cache_control(cache_control)
                    .send(),
            )
            .map_err(|e| sdk_error(&e).with_bucket(bucket).with_key(key))?;

        tracing::debug!(bucket, key, "Uploaded");
        Ok(())
    }

    fn grant_public_read(
        &self,
        bucket: &str,
        role: &str,
        members: &[&str],
    ) -> Result<(), StoreError> {
        if role != OBJECT_VIEWER_ROLE || !members.contains(&ALL_USERS) {
            return Err(StoreError::new(StoreErrorKind::Other)
                .with_backend(BACKEND)
                .with_bucket(bucket)
                .with_message(format!(
                    "only {OBJECT_VIEWER_ROLE} for {ALL_USERS} can be expressed as a bucket policy"
                )));
        }

        self.runtime
            .block_on(
                self.client
                    .put_bucket_policy()
                    .bucket(bucket)
                    .policy(public_read_policy(bucket))
                    .send(),
            )
            .map_err(|e| sdk_error(&e).with_bucket(bucket))?;
        Ok(())
    }

    fn public_url(&self, bucket: &str) -> String {
        bucket_url(&self.config, bucket)
    }
}

async fn build_client(config: &S3Config) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;

    // Custom endpoints (LocalStack, MinIO) require path-style addressing
    // (endpoint/bucket/key) instead of virtual-hosted-style (bucket.endpoint/key).
    if config.endpoint.is_some() {
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        return Client::from_conf(s3_config);
    }

    Client::new(&sdk_config)
}

/// Check the S3 bucket naming rules before any request is sent: 3 to 63
/// characters of lowercase letters, digits, dots and hyphens, starting and
/// ending with a letter or digit.
fn validate_bucket_name(name: &str) -> Result<(), StoreError> {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let valid = (3..=63).contains(&name.len())
        && name.chars().all(|c| alnum(c) || c == '.' || c == '-')
        && name.starts_with(alnum)
        && name.ends_with(alnum);
    if valid {
        Ok(())
    } else {
        Err(StoreError::new(StoreErrorKind::InvalidName)
            .with_backend(BACKEND)
            .with_bucket(name)
            .with_message("bucket names must be 3-63 characters of a-z, 0-9, '.' and '-'"))
    }
}

/// Public base URL of a bucket.
fn bucket_url(config: &S3Config, bucket: &str) -> String {
    if let Some(base) = &config.public_base_url {
        return format!("{}/{bucket}", base.trim_end_matches('/'));
    }
    if let Some(endpoint) = &config.endpoint {
        return format!("{}/{bucket}", endpoint.trim_end_matches('/'));
    }
    format!("https://{bucket}.s3.{}.amazonaws.com", config.region)
}

/// Bucket policy allowing anonymous reads of every object.
fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadGetObject",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{bucket}/*"),
        }],
    })
    .to_string()
}

/// Map an S3 error code to a kind and retry guidance.
fn classify_code(code: &str) -> (StoreErrorKind, ErrorStatus) {
    match code {
        "NoSuchBucket" | "NoSuchKey" => (StoreErrorKind::NotFound, ErrorStatus::Permanent),
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "AllAccessDisabled" => {
            (StoreErrorKind::PermissionDenied, ErrorStatus::Permanent)
        }
        "BucketAlreadyExists" => (StoreErrorKind::AlreadyExists, ErrorStatus::Permanent),
        "InvalidBucketName" | "KeyTooLongError" => {
            (StoreErrorKind::InvalidName, ErrorStatus::Permanent)
        }
        "SlowDown" | "TooManyRequests" => (StoreErrorKind::RateLimited, ErrorStatus::Persistent),
        "ServiceUnavailable" | "InternalError" => {
            (StoreErrorKind::Unavailable, ErrorStatus::Persistent)
        }
        "RequestTimeout" => (StoreErrorKind::Timeout, ErrorStatus::Temporary),
        _ => (StoreErrorKind::Other, ErrorStatus::Permanent),
    }
}

fn sdk_error<E>(err: &SdkError<E>) -> StoreError
where
    E: Error + ProvideErrorMetadata + 'static,
{
    let (kind, status) = match err {
        SdkError::TimeoutError(_) => (StoreErrorKind::Timeout, ErrorStatus::Temporary),
        SdkError::DispatchFailure(_) => (StoreErrorKind::Unavailable, ErrorStatus::Temporary),
        _ => err.code().map_or(
            (StoreErrorKind::Other, ErrorStatus::Permanent),
            classify_code,
        ),
    };
    StoreError::new(kind)
        .with_status(status)
        .with_backend(BACKEND)
        .with_message(error_chain(err))
}

fn build_error(err: aws_sdk_s3::error::BuildError) -> StoreError {
    StoreError::new(StoreErrorKind::Other)
        .with_backend(BACKEND)
        .with_source(err)
}

/// Walk the error source chain and join all messages.
fn error_chain(err: &dyn Error) -> String {
    let mut msgs = vec![err.to_string()];
    let mut source = err.source();
    while let Some(s) = source {
        msgs.push(s.to_string());
        source = s.source();
    }
    msgs.join(": ")
}
