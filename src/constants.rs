// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized constants for s3fs-stream to avoid hardcoded values throughout the codebase

/// Minimum S3 multipart upload part size (5 MiB - AWS requirement, last part exempt)
pub const MIN_S3_MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Buffered bytes that trigger a part flush (20 MiB)
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20 * 1024 * 1024;

/// Highest part number S3 accepts in one multipart upload
pub const MAX_MULTIPART_PARTS: i32 = 10_000;

/// Default concurrent part upload limit per stream
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// DeleteObjects accepts at most this many keys per request
pub const MAX_DELETE_BATCH: usize = 1_000;

/// Read size used when piping an `AsyncRead` into a write stream (1 MiB)
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1024 * 1024;

/// Default timeout for a single storage operation (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

/// Connect timeout for the SDK HTTP client (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Key separator used to emulate directories
pub const KEY_SEPARATOR: char = '/';
