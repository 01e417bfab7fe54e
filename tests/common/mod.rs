// tests/common/mod.rs
//
// In-memory ObjectStoreClient used by the stream and adapter tests.
// Records every call, assembles multipart objects for real, and can inject
// failures, per-part delays and scripted listing pages.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use s3fs_stream::{
    DeleteFailure, DeleteStatus, ListingPage, ObjectStoreClient, S3FsError, UploadedPart,
};

pub const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    UploadOnce { key: String, len: usize },
    CreateMultipart { key: String },
    UploadPart { key: String, part_number: i32, upload_id: String, len: usize },
    Complete { key: String, upload_id: String, parts: Vec<i32> },
    Abort { key: String, upload_id: String },
    Delete { keys: Vec<String> },
    List { prefix: String, marker: Option<String> },
}

type DelayFn = Box<dyn Fn(i32) -> Duration + Send + Sync>;

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    uploads: HashMap<String, (String, BTreeMap<i32, Bytes>)>,
    calls: Vec<Call>,
    resolution_order: Vec<i32>,
    next_upload: u64,
    scripted_pages: Option<VecDeque<ListingPage>>,
}

pub struct MockClient {
    state: Mutex<State>,
    upload_id_override: Option<String>,
    fail_parts: HashSet<i32>,
    fail_delete_keys: HashSet<String>,
    fail_listing: bool,
    fail_upload_once: bool,
    part_delay: Option<DelayFn>,
    page_size: usize,
}

impl Default for MockClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            upload_id_override: None,
            fail_parts: HashSet::new(),
            fail_delete_keys: HashSet::new(),
            fail_listing: false,
            fail_upload_once: false,
            part_delay: None,
            page_size: 1000,
        }
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// CreateMultipartUpload answers with this id (use "" to simulate a missing id).
    pub fn with_upload_id(mut self, id: &str) -> Self {
        self.upload_id_override = Some(id.to_string());
        self
    }

    pub fn failing_part(mut self, part_number: i32) -> Self {
        self.fail_parts.insert(part_number);
        self
    }

    pub fn failing_delete(mut self, key: &str) -> Self {
        self.fail_delete_keys.insert(key.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn failing_upload_once(mut self) -> Self {
        self.fail_upload_once = true;
        self
    }

    pub fn with_part_delay<F>(mut self, f: F) -> Self
    where
        F: Fn(i32) -> Duration + Send + Sync + 'static,
    {
        self.part_delay = Some(Box::new(f));
        self
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }

    pub fn with_pages(self, pages: Vec<ListingPage>) -> Self {
        self.state.lock().unwrap().scripted_pages = Some(pages.into());
        self
    }

    pub fn with_object(self, key: &str, data: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), Bytes::copy_from_slice(data));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    // ---- inspection ----

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn resolution_order(&self) -> Vec<i32> {
        self.state.lock().unwrap().resolution_order.clone()
    }

    pub fn open_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn upload_once_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::UploadOnce { .. }))
    }

    pub fn part_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::UploadPart { .. }))
    }

    pub fn complete_calls(&self) -> Vec<Vec<i32>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Complete { parts, .. } => Some(parts),
                _ => None,
            })
            .collect()
    }

    pub fn abort_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Abort { upload_id, .. } => Some(upload_id),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { keys } => Some(keys),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn transport(operation: &'static str, message: &str) -> S3FsError {
    S3FsError::Transport { operation, message: message.to_string() }
}

#[async_trait]
impl ObjectStoreClient for MockClient {
    async fn upload_once(&self, key: &str, body: Bytes) -> s3fs_stream::Result<()> {
        self.record(Call::UploadOnce { key: key.to_string(), len: body.len() });
        if self.fail_upload_once {
            return Err(transport("PutObject", "injected failure"));
        }
        self.state.lock().unwrap().objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> s3fs_stream::Result<String> {
        self.record(Call::CreateMultipart { key: key.to_string() });
        let mut st = self.state.lock().unwrap();
        let id = match &self.upload_id_override {
            Some(id) => id.clone(),
            None => {
                st.next_upload += 1;
                format!("upload-{}", st.next_upload)
            }
        };
        if !id.is_empty() {
            st.uploads.insert(id.clone(), (key.to_string(), BTreeMap::new()));
        }
        Ok(id)
    }

    async fn upload_part(
        &self,
        body: Bytes,
        key: &str,
        part_number: i32,
        upload_id: &str,
    ) -> s3fs_stream::Result<UploadedPart> {
        s3fs_stream::s3_client::validate_upload_part(key, part_number, upload_id)?;
        self.record(Call::UploadPart {
            key: key.to_string(),
            part_number,
            upload_id: upload_id.to_string(),
            len: body.len(),
        });

        if let Some(delay) = &self.part_delay {
            tokio::time::sleep(delay(part_number)).await;
        }
        if self.fail_parts.contains(&part_number) {
            return Err(transport("UploadPart", "something fatal"));
        }

        let mut st = self.state.lock().unwrap();
        let Some((_, parts)) = st.uploads.get_mut(upload_id) else {
            return Err(transport("UploadPart", "NoSuchUpload"));
        };
        parts.insert(part_number, body);
        st.resolution_order.push(part_number);
        Ok(UploadedPart {
            part_number,
            e_tag: format!("\"etag-{part_number}\""),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> s3fs_stream::Result<Option<String>> {
        self.record(Call::Complete {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        s3fs_stream::s3_client::validate_completion(key, upload_id, parts)?;

        let mut st = self.state.lock().unwrap();
        let Some((_, stored)) = st.uploads.remove(upload_id) else {
            return Err(transport("CompleteMultipartUpload", "NoSuchUpload"));
        };
        let mut body = BytesMut::new();
        for p in parts {
            if p.e_tag != format!("etag-{}", p.part_number) {
                return Err(transport("CompleteMultipartUpload", "InvalidPart"));
            }
            let Some(data) = stored.get(&p.part_number) else {
                return Err(transport("CompleteMultipartUpload", "InvalidPart"));
            };
            body.extend_from_slice(data);
        }
        st.objects.insert(key.to_string(), body.freeze());
        Ok(Some(format!("etag-complete-{}", parts.len())))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> s3fs_stream::Result<()> {
        self.record(Call::Abort { key: key.to_string(), upload_id: upload_id.to_string() });
        match self.state.lock().unwrap().uploads.remove(upload_id) {
            Some(_) => Ok(()),
            None => Err(transport("AbortMultipartUpload", "NoSuchUpload")),
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> s3fs_stream::Result<DeleteStatus> {
        self.record(Call::Delete { keys: keys.to_vec() });
        let mut st = self.state.lock().unwrap();
        let mut failed = Vec::new();
        for k in keys {
            if self.fail_delete_keys.contains(k) {
                failed.push(DeleteFailure {
                    key: k.clone(),
                    code: Some("AccessDenied".into()),
                    message: None,
                });
            } else {
                st.objects.remove(k);
            }
        }
        Ok(DeleteStatus { requested: keys.len(), failed })
    }

    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> s3fs_stream::Result<ListingPage> {
        self.record(Call::List {
            prefix: prefix.to_string(),
            marker: marker.map(str::to_owned),
        });
        if self.fail_listing {
            return Err(transport("ListObjects", "injected failure"));
        }

        let mut st = self.state.lock().unwrap();
        if let Some(pages) = st.scripted_pages.as_mut() {
            return Ok(pages.pop_front().unwrap_or_default());
        }

        let matching: Vec<String> = st
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| marker.map_or(true, |m| k.as_str() > m))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Ok(ListingPage::default());
        }
        let is_truncated = matching.len() > self.page_size;
        let page: Vec<String> = matching.into_iter().take(self.page_size).collect();
        let next_marker = if is_truncated { page.last().cloned() } else { None };
        Ok(ListingPage {
            contents: Some(page),
            common_prefixes: Vec::new(),
            next_marker,
            is_truncated,
        })
    }
}

/// Deterministic pseudo-random payload so round-trips catch reordering.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2_654_435_761).to_le_bytes()[1] ^ seed)
        .collect()
}
