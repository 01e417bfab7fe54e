// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Object store client seam plus its `aws-sdk-s3` implementation.
//!
//! The write stream and the filesystem adapter only ever talk to
//! [`ObjectStoreClient`]; the client is injected, never global, so sessions
//! against different buckets or credentials can coexist.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::operation::list_objects::ListObjectsOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use crate::config::S3Config;
use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, MAX_DELETE_BATCH, MAX_MULTIPART_PARTS};
use crate::error::{Result, S3FsError};

// -----------------------------------------------------------------------------
// Value types
// -----------------------------------------------------------------------------

/// One finished part of a multipart upload. `e_tag` has its quotes stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// One response from a paginated ListObjects call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// `None` when the response carried no `Contents` element at all.
    pub contents: Option<Vec<String>>,
    pub common_prefixes: Vec<String>,
    pub next_marker: Option<String>,
    pub is_truncated: bool,
}

/// A key the service refused to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Outcome of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteStatus {
    pub requested: usize,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteStatus {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_complete_failure(&self) -> bool {
        self.requested > 0 && self.failed.len() >= self.requested
    }

    pub fn deleted(&self) -> usize {
        self.requested.saturating_sub(self.failed.len())
    }
}

// -----------------------------------------------------------------------------
// Client seam
// -----------------------------------------------------------------------------

/// Primitive object-storage operations consumed by the stream and the adapter.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Upload `body` as one object.
    async fn upload_once(&self, key: &str, body: Bytes) -> Result<()>;

    /// Start a multipart session; returns a non-empty upload id.
    async fn create_multipart_upload(&self, key: &str) -> Result<String>;

    async fn upload_part(
        &self,
        body: Bytes,
        key: &str,
        part_number: i32,
        upload_id: &str,
    ) -> Result<UploadedPart>;

    /// Caller must supply `parts` sorted ascending by part number.
    /// Returns the final object's ETag when the service reports one.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<Option<String>>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteStatus>;

    /// Fetch one page of keys under `prefix`, resuming after `marker`.
    async fn list_objects(&self, prefix: &str, marker: Option<&str>) -> Result<ListingPage>;
}

// -----------------------------------------------------------------------------
// Argument validation (no network)
// -----------------------------------------------------------------------------

pub fn validate_upload_part(key: &str, part_number: i32, upload_id: &str) -> Result<()> {
    if key.is_empty() {
        return Err(S3FsError::validation("key must be a non-empty string"));
    }
    if upload_id.is_empty() {
        return Err(S3FsError::validation("uploadId must be a non-empty string"));
    }
    if !(1..=MAX_MULTIPART_PARTS).contains(&part_number) {
        return Err(S3FsError::validation(format!(
            "partNumber must be an integer in 1..={MAX_MULTIPART_PARTS}, got {part_number}"
        )));
    }
    Ok(())
}

pub fn validate_completion(key: &str, upload_id: &str, parts: &[UploadedPart]) -> Result<()> {
    if key.is_empty() {
        return Err(S3FsError::validation("key must be a non-empty string"));
    }
    if upload_id.is_empty() {
        return Err(S3FsError::validation("uploadId must be a non-empty string"));
    }
    if parts.is_empty() {
        return Err(S3FsError::validation("cannot complete a multipart upload with zero parts"));
    }
    if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
        return Err(S3FsError::validation("parts must be sorted ascending by partNumber"));
    }
    Ok(())
}

/// Remove every `"` from an ETag as returned by the service.
pub fn strip_etag_quotes(e_tag: &str) -> String {
    e_tag.replace('"', "")
}

// -----------------------------------------------------------------------------
// Response mapping
// -----------------------------------------------------------------------------

pub fn page_from_output(out: &ListObjectsOutput) -> ListingPage {
    let contents: Option<Vec<String>> = out.contents.as_ref().map(|objs| {
        objs.iter()
            .filter_map(|o| o.key().map(str::to_owned))
            .collect()
    });
    let common_prefixes: Vec<String> = out
        .common_prefixes()
        .iter()
        .filter_map(|p| p.prefix().map(str::to_owned))
        .collect();
    let is_truncated = out.is_truncated().unwrap_or(false);

    // Without a delimiter ListObjects omits NextMarker; resume after the last key.
    let next_marker = out.next_marker().map(str::to_owned).or_else(|| {
        if !is_truncated {
            return None;
        }
        let last_key = contents.as_ref().and_then(|c| c.last());
        let last_prefix = common_prefixes.last();
        last_key.max(last_prefix).cloned()
    });

    ListingPage {
        contents,
        common_prefixes,
        next_marker,
        is_truncated,
    }
}

pub fn delete_failures_from_output(out: &DeleteObjectsOutput) -> Vec<DeleteFailure> {
    out.errors()
        .iter()
        .map(|e| DeleteFailure {
            key: e.key().unwrap_or_default().to_string(),
            code: e.code().map(str::to_owned),
            message: e.message().map(str::to_owned),
        })
        .collect()
}

// -----------------------------------------------------------------------------
// aws-sdk-s3 implementation
// -----------------------------------------------------------------------------

/// [`ObjectStoreClient`] bound to one bucket.
#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Wrap an SDK client the caller already owns.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build through `aws_config`, which also wires the default HTTP stack,
    /// retry policy and identity cache.
    pub async fn connect(cfg: &S3Config) -> Result<Self> {
        cfg.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .timeout_config(timeout_config(cfg));
        if let Some(creds) = static_credentials(cfg) {
            loader = loader.credentials_provider(creds);
        }
        if let Some(endpoint) = &cfg.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_cfg = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_cfg)
            .force_path_style(cfg.force_path_style)
            .build();
        debug!(
            "S3 client ready: region={} bucket={} endpoint={:?}",
            cfg.region, cfg.bucket, cfg.endpoint_url
        );
        Ok(Self::new(Client::from_conf(s3_config), cfg.bucket.clone()))
    }

    /// Build synchronously from the config alone, without consulting the
    /// environment or profile files.
    pub fn from_static(cfg: &S3Config) -> Result<Self> {
        cfg.validate()?;

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .timeout_config(timeout_config(cfg))
            .force_path_style(cfg.force_path_style);
        if let Some(creds) = static_credentials(cfg) {
            builder = builder.credentials_provider(creds);
        }
        if let Some(endpoint) = &cfg.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Ok(Self::new(Client::from_conf(builder.build()), cfg.bucket.clone()))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn sdk_client(&self) -> &Client {
        &self.client
    }
}

fn timeout_config(cfg: &S3Config) -> TimeoutConfig {
    TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .operation_timeout(cfg.operation_timeout)
        .build()
}

fn static_credentials(cfg: &S3Config) -> Option<Credentials> {
    cfg.credentials.as_ref().map(|c| {
        Credentials::new(
            c.access_key_id.clone(),
            c.secret_access_key.clone(),
            c.session_token.clone(),
            None,
            "s3fs-stream",
        )
    })
}

#[async_trait]
impl ObjectStoreClient for S3Client {
    async fn upload_once(&self, key: &str, body: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(S3FsError::validation("key must be a non-empty string"));
        }
        let len = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| S3FsError::transport("PutObject", e))?;
        debug!("PutObject s3://{}/{} ({} bytes)", self.bucket, key, len);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(S3FsError::validation("key must be a non-empty string"));
        }
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3FsError::transport("CreateMultipartUpload", e))?;
        let upload_id = resp.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            return Err(S3FsError::Session(
                "CreateMultipartUpload returned empty upload_id".into(),
            ));
        }
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        body: Bytes,
        key: &str,
        part_number: i32,
        upload_id: &str,
    ) -> Result<UploadedPart> {
        validate_upload_part(key, part_number, upload_id)?;

        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| S3FsError::transport("UploadPart", e))?;

        let e_tag = resp.e_tag().map(strip_etag_quotes).unwrap_or_default();
        if e_tag.is_empty() {
            return Err(S3FsError::Transport {
                operation: "UploadPart",
                message: "UploadPart returned empty ETag".into(),
            });
        }
        Ok(UploadedPart { part_number, e_tag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<Option<String>> {
        validate_completion(key, upload_id, parts)?;

        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(&p.e_tag)
                    .part_number(p.part_number)
                    .build()
            })
            .collect();
        let cmu = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(cmu)
            .send()
            .await
            .map_err(|e| S3FsError::transport("CompleteMultipartUpload", e))?;
        Ok(resp.e_tag().map(strip_etag_quotes))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        if key.is_empty() || upload_id.is_empty() {
            return Err(S3FsError::validation(
                "abort requires a non-empty key and uploadId",
            ));
        }
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| S3FsError::transport("AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteStatus> {
        let mut status = DeleteStatus {
            requested: keys.len(),
            failed: Vec::new(),
        };

        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objs: Vec<ObjectIdentifier> = chunk
                .iter()
                .map(|k| {
                    ObjectIdentifier::builder()
                        .key(k)
                        .build()
                        .map_err(|e| S3FsError::validation(e.to_string()))
                })
                .collect::<Result<_>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objs))
                .quiet(true)
                .build()
                .map_err(|e| S3FsError::validation(e.to_string()))?;

            match self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
            {
                Ok(resp) => status.failed.extend(delete_failures_from_output(&resp)),
                Err(e) => {
                    let err = S3FsError::transport("DeleteObjects", e);
                    status.failed.extend(chunk.iter().map(|k| DeleteFailure {
                        key: k.clone(),
                        code: None,
                        message: Some(err.to_string()),
                    }));
                }
            }
        }

        debug!(
            "DeleteObjects s3://{}: {} requested, {} failed",
            self.bucket,
            status.requested,
            status.failed.len()
        );
        Ok(status)
    }

    async fn list_objects(&self, prefix: &str, marker: Option<&str>) -> Result<ListingPage> {
        let resp = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_marker(marker.map(str::to_owned))
            .send()
            .await
            .map_err(|e| S3FsError::transport("ListObjects", e))?;
        Ok(page_from_output(&resp))
    }
}
