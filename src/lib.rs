// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: module list and public re-exports.

pub mod config;
pub mod constants;
pub mod error;
pub mod key_path;
pub mod object_writer;
pub mod part_buffer;
pub mod s3_client;
pub mod s3_fs;
pub mod write_stream;

pub use config::{S3Config, StaticCredentials};
pub use error::{Result, S3FsError};
pub use object_writer::ObjectWriter;
pub use s3_client::{
    DeleteFailure, DeleteStatus, ListingPage, ObjectStoreClient, S3Client, UploadedPart,
};
pub use s3_fs::{ReadDir, S3Fs, Status};
pub use write_stream::{
    S3WriteStream, StreamState, UploadOutcome, UploadStrategy, WriteCompletion, WriteStreamOptions,
};
