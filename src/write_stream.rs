// src/write_stream.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Buffered write stream that picks single-shot or multipart upload by volume.
//
// Design:
// - start() opens a multipart session (CreateMultipartUpload).
// - write() buffers; once total bytes >= min part size AND the buffer holds
//   >= flush_threshold, the buffer is spawned as one UploadPart task.
// - end() either flushes the tail, waits for every part, sorts and completes,
//   or (no part was ever flushed) does one PutObject and drops the session.
// - destroy() aborts the session best-effort; part tasks still in flight are
//   detached and their results ignored.
//
// Part numbers are assigned synchronously at flush time; the part tasks may
// resolve in any order.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_MAX_IN_FLIGHT, DEFAULT_STREAM_BUFFER_SIZE,
    MIN_S3_MULTIPART_PART_SIZE,
};
use crate::error::{Result, S3FsError};
use crate::object_writer::ObjectWriter;
use crate::part_buffer::PartBuffer;
use crate::s3_client::{strip_etag_quotes, validate_upload_part, ObjectStoreClient, UploadedPart};

#[derive(Clone, Debug)]
pub struct WriteStreamOptions {
    /// Buffered bytes that trigger a part flush.
    pub flush_threshold: usize,
    /// Smallest part the service accepts (every part but the last).
    pub min_part_size: usize,
    /// Maximum number of concurrent in-flight part uploads.
    pub max_in_flight: usize,
    /// Abort the session automatically if dropped unfinished.
    pub abort_on_drop: bool,
}

impl Default for WriteStreamOptions {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            min_part_size: MIN_S3_MULTIPART_PART_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            abort_on_drop: true,
        }
    }
}

impl WriteStreamOptions {
    pub fn validate(&self) -> Result<()> {
        if self.min_part_size < MIN_S3_MULTIPART_PART_SIZE {
            return Err(S3FsError::validation(
                "min_part_size must be at least 5 MiB for S3 Multipart Upload",
            ));
        }
        if self.flush_threshold < self.min_part_size {
            return Err(S3FsError::validation(
                "flush_threshold must be >= min_part_size",
            ));
        }
        if self.max_in_flight == 0 {
            return Err(S3FsError::validation("max_in_flight must be >= 1"));
        }
        Ok(())
    }
}

/// Lifecycle: `Unstarted -> Started -> Completing -> Completed`, or any
/// non-terminal state `-> Aborted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Unstarted,
    Started,
    Completing,
    Completed,
    Aborted,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Aborted)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStrategy {
    SingleShot,
    Multipart,
}

/// Result info returned by `end()`
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub key: String,
    pub strategy: UploadStrategy,
    pub total_bytes: u64,
    pub parts: usize,
    pub e_tag: Option<String>,
    pub checksum: String,
    pub started_at: SystemTime,
    pub completed_at: SystemTime,
}

/// Completion signal of one `write()`.
///
/// Ready immediately when the write only buffered; otherwise resolves with the
/// result of the part upload the write triggered.
#[must_use = "a write's completion carries the part upload result"]
#[derive(Debug)]
pub struct WriteCompletion {
    rx: Option<oneshot::Receiver<Result<()>>>,
}

impl WriteCompletion {
    fn ready() -> Self {
        Self { rx: None }
    }

    /// True when this write dispatched a part upload.
    pub fn flushed(&self) -> bool {
        self.rx.is_some()
    }
}

impl Future for WriteCompletion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            None => Poll::Ready(Ok(())),
            Some(rx) => Pin::new(rx).poll(cx).map(|res| {
                res.unwrap_or_else(|_| {
                    Err(S3FsError::state("part upload task ended without reporting"))
                })
            }),
        }
    }
}

type PartTask = JoinHandle<Result<UploadedPart>>;

/// Streaming sink for one object key.
pub struct S3WriteStream {
    client: Arc<dyn ObjectStoreClient>,
    key: String,
    opts: WriteStreamOptions,
    state: StreamState,

    // session
    upload_id: Option<String>,
    part_counter: i32,
    uploaded_parts: Arc<Mutex<Vec<UploadedPart>>>,
    pending: Vec<PartTask>,

    // buffering
    buffer: PartBuffer,
    total_bytes: u64,
    hasher: crc32fast::Hasher,
    started_at: SystemTime,

    sem: Arc<Semaphore>,
}

impl std::fmt::Debug for S3WriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3WriteStream")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("upload_id", &self.upload_id)
            .field("part_counter", &self.part_counter)
            .field("buffered", &self.buffer.len())
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

impl Drop for S3WriteStream {
    fn drop(&mut self) {
        if !self.opts.abort_on_drop
            || !matches!(self.state, StreamState::Started | StreamState::Completing)
        {
            return;
        }
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };
        // Best effort abort; we can't async .await here. Fire-and-forget on the runtime.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = Arc::clone(&self.client);
                let key = self.key.clone();
                handle.spawn(async move {
                    if let Err(e) = client.abort_multipart_upload(&key, &upload_id).await {
                        warn!("abort on drop failed for {}: {}", key, e);
                    }
                });
            }
            Err(_) => warn!(
                "stream for {} dropped outside a runtime; upload {} left open",
                self.key, upload_id
            ),
        }
    }
}

impl S3WriteStream {
    /// Bind a stream to `key`. Nothing touches the network until `start()`.
    pub fn new(client: Arc<dyn ObjectStoreClient>, key: impl Into<String>, opts: WriteStreamOptions) -> Self {
        let sem = Arc::new(Semaphore::new(opts.max_in_flight.max(1)));
        Self {
            client,
            key: key.into(),
            opts,
            state: StreamState::Unstarted,
            upload_id: None,
            part_counter: 0,
            uploaded_parts: Arc::new(Mutex::new(Vec::new())),
            pending: Vec::new(),
            buffer: PartBuffer::new(),
            total_bytes: 0,
            hasher: crc32fast::Hasher::new(),
            started_at: SystemTime::now(),
            sem,
        }
    }

    /// Open the multipart session. Must precede any write.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != StreamState::Unstarted {
            return Err(S3FsError::state(format!(
                "start() called in {:?} state",
                self.state
            )));
        }
        self.opts.validate()?;

        let upload_id = self.client.create_multipart_upload(&self.key).await?;
        if upload_id.is_empty() {
            return Err(S3FsError::Session("Upload ID is not retrieved".into()));
        }
        debug!("multipart session {} opened for {}", upload_id, self.key);

        self.upload_id = Some(upload_id);
        self.started_at = SystemTime::now();
        self.state = StreamState::Started;
        Ok(())
    }

    /// Append `chunk`, flushing one part when the policy says so.
    ///
    /// Lifecycle and argument errors are returned here, before any network
    /// activity. Part upload failures arrive through the returned completion.
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> Result<WriteCompletion> {
        self.ensure_writable()?;

        let chunk: Bytes = chunk.into();
        self.hasher.update(&chunk);
        self.total_bytes += chunk.len() as u64;
        self.buffer.push(chunk);

        if self.total_bytes >= self.opts.min_part_size as u64
            && self.buffer.len() >= self.opts.flush_threshold
        {
            return self.flush_part();
        }
        Ok(WriteCompletion::ready())
    }

    /// `write` followed by awaiting its completion: the sequential-producer path.
    pub async fn write_all(&mut self, chunk: impl Into<Bytes>) -> Result<()> {
        self.write(chunk)?.await
    }

    /// Finish the upload.
    ///
    /// Multipart completion is used iff at least one part was flushed; otherwise
    /// the whole buffer goes up in one PutObject.
    pub async fn end(&mut self, final_chunk: Option<Bytes>) -> Result<UploadOutcome> {
        self.ensure_writable()?;

        // The final chunk's own flush, if any, is awaited with the rest below.
        if let Some(chunk) = final_chunk {
            drop(self.write(chunk)?);
        }
        self.state = StreamState::Completing;

        if self.pending.is_empty() {
            return self.upload_single_shot().await;
        }
        self.complete_multipart().await
    }

    /// Abnormal termination. Aborts the remote session best-effort and never
    /// fails; a stream that already completed or aborted is left untouched.
    pub async fn destroy(&mut self, reason: Option<&S3FsError>) {
        if self.state.is_terminal() {
            debug!("destroy() ignored for {}: already {:?}", self.key, self.state);
            return;
        }
        match reason {
            Some(err) => warn!("the stream for {} is being destroyed: {}", self.key, err),
            None => info!("the stream for {} is being destroyed", self.key),
        }
        self.state = StreamState::Aborted;

        // In-flight part uploads are detached, not awaited.
        let detached = self.pending.len();
        self.pending.clear();
        self.buffer.take();
        if detached > 0 {
            debug!("{} part upload(s) detached for {}", detached, self.key);
        }

        if let Some(upload_id) = self.upload_id.take() {
            if let Err(e) = self.client.abort_multipart_upload(&self.key, &upload_id).await {
                warn!("AbortMultipartUpload failed for {} ({}): {}", self.key, upload_id, e);
            }
        }
    }

    /// Pipe `reader` into this stream until EOF, then `end()`.
    /// Any failure destroys the stream before being returned.
    pub async fn copy_from_reader<R>(&mut self, reader: R) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self.pump(reader).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.destroy(Some(&e)).await;
                Err(e)
            }
        }
    }

    async fn pump<R>(&mut self, mut reader: R) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = BytesMut::with_capacity(DEFAULT_STREAM_BUFFER_SIZE);
        loop {
            buf.reserve(DEFAULT_STREAM_BUFFER_SIZE);
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.write_all(buf.split().freeze()).await?;
        }
        self.end(None).await
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of parts dispatched so far (the last assigned part number).
    pub fn parts_dispatched(&self) -> usize {
        self.part_counter as usize
    }

    /// Parts whose upload resolved successfully, in resolution order.
    pub fn uploaded_parts(&self) -> Vec<UploadedPart> {
        self.uploaded_parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn options(&self) -> &WriteStreamOptions {
        &self.opts
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_writable(&self) -> Result<()> {
        match self.state {
            StreamState::Started => Ok(()),
            StreamState::Unstarted => Err(S3FsError::state(
                "uploadId not defined. Have you called \"start\" method after you created this object?",
            )),
            other => Err(S3FsError::state(format!(
                "stream for {} is {:?}; no more writes accepted",
                self.key, other
            ))),
        }
    }

    fn session_id(&self) -> Result<String> {
        self.upload_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| S3FsError::Session("uploadId is missing for this session".into()))
    }

    /// Spawn the current buffer as the next part.
    fn flush_part(&mut self) -> Result<WriteCompletion> {
        let upload_id = self.session_id()?;
        let part_number = self.part_counter + 1;
        validate_upload_part(&self.key, part_number, &upload_id)?;
        self.part_counter = part_number;

        let body = self.buffer.take();
        let len = body.len();
        let client = Arc::clone(&self.client);
        let key = self.key.clone();
        let uploaded = Arc::clone(&self.uploaded_parts);
        let semaphore = Arc::clone(&self.sem);
        let (tx, rx) = oneshot::channel();

        debug!("flushing part {} of {} ({} bytes)", part_number, key, len);
        let handle: PartTask = tokio::spawn(async move {
            let res = match semaphore.acquire_owned().await {
                Ok(_permit) => client
                    .upload_part(body, &key, part_number, &upload_id)
                    .await
                    .map(|resp| UploadedPart {
                        part_number,
                        e_tag: strip_etag_quotes(&resp.e_tag),
                    }),
                Err(_) => Err(S3FsError::state("part upload semaphore closed")),
            };

            match &res {
                Ok(part) => {
                    uploaded
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(part.clone());
                    debug!("part {} of {} uploaded", part_number, key);
                }
                Err(e) => warn!("part {} of {} failed: {}", part_number, key, e),
            }

            // The writer may have stopped listening; that is fine.
            let _ = tx.send(res.as_ref().map(|_| ()).map_err(|e| e.clone()));
            res
        });

        self.pending.push(handle);
        Ok(WriteCompletion { rx: Some(rx) })
    }

    async fn upload_single_shot(&mut self) -> Result<UploadOutcome> {
        let body = self.buffer.take();
        debug!(
            "no part flushed for {}; single-shot upload of {} bytes",
            self.key,
            body.len()
        );
        self.client.upload_once(&self.key, body).await?;
        self.state = StreamState::Completed;

        // The multipart session opened by start() is no longer needed.
        if let Some(upload_id) = self.upload_id.take() {
            if let Err(e) = self.client.abort_multipart_upload(&self.key, &upload_id).await {
                warn!("could not release unused upload {} for {}: {}", upload_id, self.key, e);
            }
        }

        info!("Upload complete: {} ({} bytes, single-shot)", self.key, self.total_bytes);
        Ok(self.outcome(UploadStrategy::SingleShot, 0, None))
    }

    async fn complete_multipart(&mut self) -> Result<UploadOutcome> {
        // Final part may be undersized; the service accepts that for the last one.
        if !self.buffer.is_empty() {
            drop(self.flush_part()?);
        }

        let mut tasks: FuturesUnordered<PartTask> =
            std::mem::take(&mut self.pending).into_iter().collect();
        let mut failure: Option<S3FsError> = None;
        while let Some(joined) = tasks.next().await {
            let res = match joined {
                Ok(res) => res.map(|_| ()),
                Err(join) => Err(S3FsError::Transport {
                    operation: "UploadPart",
                    message: format!("part task join failed: {join}"),
                }),
            };
            if let Err(e) = res {
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            // Session stays open so the caller can destroy() it.
            return Err(e);
        }

        let mut parts = self.uploaded_parts();
        parts.sort_by_key(|p| p.part_number);
        let upload_id = self.session_id()?;

        let e_tag = self
            .client
            .complete_multipart_upload(&self.key, &upload_id, &parts)
            .await?;
        self.state = StreamState::Completed;
        self.upload_id = None;

        info!(
            "Upload complete: {} ({} bytes in {} parts)",
            self.key,
            self.total_bytes,
            parts.len()
        );
        Ok(self.outcome(UploadStrategy::Multipart, parts.len(), e_tag))
    }

    fn outcome(&self, strategy: UploadStrategy, parts: usize, e_tag: Option<String>) -> UploadOutcome {
        UploadOutcome {
            key: self.key.clone(),
            strategy,
            total_bytes: self.total_bytes,
            parts,
            e_tag,
            checksum: self.checksum_string(),
            started_at: self.started_at,
            completed_at: SystemTime::now(),
        }
    }

    fn checksum_string(&self) -> String {
        format!("crc32:{:08x}", self.hasher.clone().finalize())
    }
}

#[async_trait]
impl ObjectWriter for S3WriteStream {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.write_all(Bytes::copy_from_slice(chunk)).await
    }

    async fn write_owned_bytes(&mut self, data: Vec<u8>) -> Result<()> {
        self.write_all(data).await
    }

    async fn finalize(&mut self) -> Result<UploadOutcome> {
        self.end(None).await
    }

    async fn cancel(&mut self) {
        self.destroy(None).await
    }

    fn bytes_written(&self) -> u64 {
        self.total_bytes
    }

    fn checksum(&self) -> Option<String> {
        Some(self.checksum_string())
    }
}
