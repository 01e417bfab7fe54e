// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy shared by the client, the write stream and the adapter.

use aws_sdk_s3::error::DisplayErrorContext;
use thiserror::Error;

pub type Result<T, E = S3FsError> = std::result::Result<T, E>;

/// All failures surfaced by this crate.
///
/// `Clone` so a single part failure can be handed both to the write that
/// triggered it and to `end()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S3FsError {
    /// Missing region, bucket or credentials at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed call arguments, raised before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation invoked in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// The service call failed or returned a non-success status.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// CreateMultipartUpload did not yield an upload id.
    #[error("session error: {0}")]
    Session(String),

    /// Local I/O failure while feeding a stream from a reader.
    #[error("i/o error: {0}")]
    Io(String),
}

impl S3FsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        S3FsError::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        S3FsError::State(msg.into())
    }

    /// Wrap an SDK error, keeping the full source chain in the message.
    pub fn transport<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error,
    {
        S3FsError::Transport {
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, S3FsError::Transport { .. })
    }
}

impl From<std::io::Error> for S3FsError {
    fn from(e: std::io::Error) -> Self {
        S3FsError::Io(e.to_string())
    }
}
