// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Connection parameters for the S3 client, validated eagerly.

use std::env;
use std::time::Duration;

use crate::constants::DEFAULT_OPERATION_TIMEOUT_SECS;
use crate::error::{Result, S3FsError};

/// Static access-key credentials.
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Runtime parameters used by `S3Client::connect`.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    pub credentials: Option<StaticCredentials>,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph, ...).
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub operation_timeout: Duration,
}

impl S3Config {
    /// Build and validate a config from explicit values.
    pub fn new(
        region: impl Into<String>,
        bucket: impl Into<String>,
        credentials: StaticCredentials,
    ) -> Result<Self> {
        let cfg = Self {
            region: region.into(),
            bucket: bucket.into(),
            credentials: Some(credentials),
            endpoint_url: None,
            force_path_style: false,
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `.env` + process environment.
    ///
    /// Reads `AWS_REGION`, `S3_BUCKET`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`, `AWS_ENDPOINT_URL`, `S3FS_OPERATION_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        // Loads any variables from .env file that are not already set
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env` but reading through `lookup`, so callers can supply
    /// their own variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let region = get("AWS_REGION").ok_or_else(|| {
            S3FsError::Configuration("AWS_REGION is not defined in env vars".into())
        })?;
        let bucket = get("S3_BUCKET").ok_or_else(|| {
            S3FsError::Configuration("S3_BUCKET is not defined in env vars".into())
        })?;
        let credentials = match (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => StaticCredentials {
                access_key_id,
                secret_access_key,
                session_token: get("AWS_SESSION_TOKEN"),
            },
            _ => {
                return Err(S3FsError::Configuration(
                    "Missing AWS_ACCESS_KEY_ID or AWS_SECRET_ACCESS_KEY".into(),
                ));
            }
        };

        let endpoint_url = get("AWS_ENDPOINT_URL");
        let operation_timeout = get("S3FS_OPERATION_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS));

        let cfg = Self {
            region,
            bucket,
            credentials: Some(credentials),
            // S3-compatible endpoints generally need path-style addressing
            force_path_style: endpoint_url.is_some(),
            endpoint_url,
            operation_timeout,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint.into());
        self.force_path_style = true;
        self
    }

    /// Reject configs with missing required values.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(S3FsError::Configuration("region is not provided".into()));
        }
        if self.bucket.trim().is_empty() {
            return Err(S3FsError::Configuration("bucket is not provided".into()));
        }
        match &self.credentials {
            Some(c) if !c.access_key_id.is_empty() && !c.secret_access_key.is_empty() => Ok(()),
            _ => Err(S3FsError::Configuration("AWS credentials are not provided".into())),
        }
    }
}
