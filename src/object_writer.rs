// src/object_writer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Sequential-sink capability: accepts ordered writes, reports success or
//! failure per write, and is closed explicitly by `finalize` or `cancel`.

use async_trait::async_trait;

use crate::error::Result;
use crate::write_stream::UploadOutcome;

#[async_trait]
pub trait ObjectWriter: Send {
    /// Write a borrowed chunk; resolves once any flush it triggered resolves.
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Owned variant of `write_chunk`, avoids the copy.
    async fn write_owned_bytes(&mut self, data: Vec<u8>) -> Result<()>;

    /// Close the sink and commit the object.
    async fn finalize(&mut self) -> Result<UploadOutcome>;

    /// Abandon the sink; never fails.
    async fn cancel(&mut self);

    fn bytes_written(&self) -> u64;

    /// Checksum of everything written so far.
    fn checksum(&self) -> Option<String>;
}
