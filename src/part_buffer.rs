// src/part_buffer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Chunk-list accumulator for pending part data.
//!
//! Incoming chunks are kept as-is (`Bytes` is reference counted) and only
//! copied once, when the part is taken for upload. A part built from a single
//! chunk is handed over without any copy.

use bytes::{Bytes, BytesMut};

#[derive(Debug, Default)]
pub struct PartBuffer {
    chunks: Vec<Bytes>,
    len: usize,
}

impl PartBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain everything into one contiguous buffer.
    pub fn take(&mut self) -> Bytes {
        let len = std::mem::take(&mut self.len);
        let mut chunks = std::mem::take(&mut self.chunks);
        match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.pop().unwrap_or_default(),
            _ => {
                let mut out = BytesMut::with_capacity(len);
                for c in &chunks {
                    out.extend_from_slice(c);
                }
                out.freeze()
            }
        }
    }
}
