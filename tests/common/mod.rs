#![allow(dead_code)]

use archive_uploader::{
    ObjectStore, StoreError, UploadConfig,
    models::{
        multipart::PartDescriptor,
        object::{FetchedObject, ObjectLocation, UploadTarget},
    },
    services::object_store::{MIN_PART_SIZE, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    collections::HashMap,
    io::{self, Cursor, Read},
    num::NonZeroU64,
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

pub const BUCKET: &str = "photos";
pub const UPLOAD_ID: &str = "upload-1";

/// One call received by [`MockStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Initiate(String),
    UploadPart { part_number: u32, len: usize, is_last: bool },
    Complete(Vec<u32>),
    Abort(String),
}

/// In-memory store that records every call and fails on request.
#[derive(Default)]
pub struct MockStore {
    blobs: HashMap<String, (Option<String>, Vec<u8>)>,
    calls: Mutex<Vec<Call>>,
    parts: Mutex<Vec<(u32, Bytes)>>,
    pub fail_initiate: bool,
    pub fail_part: Option<u32>,
    pub fail_complete: bool,
    pub fail_abort: bool,
    pub upload_id: Option<String>,
    pub e_tag: Option<String>,
    /// Cancel this token once the given part has been stored.
    pub cancel_after_part: Option<(u32, CancellationToken)>,
}

impl MockStore {
    pub fn with_blob(mut self, key: &str, content_type: &str, body: &[u8]) -> Self {
        self.blobs
            .insert(key.into(), (Some(content_type.into()), body.to_vec()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|&c| pred(c)).count()
    }

    pub fn aborts(&self) -> usize {
        self.count(|c| matches!(c, Call::Abort(_)))
    }

    pub fn upload_calls(&self) -> usize {
        self.count(|c| !matches!(c, Call::Get(_)))
    }

    /// Bytes of every uploaded part concatenated in part order.
    pub fn assembled(&self) -> Vec<u8> {
        let mut parts = self.parts.lock().unwrap().clone();
        parts.sort_by_key(|(n, _)| *n);
        parts.into_iter().flat_map(|(_, b)| b.to_vec()).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Io(io::Error::other(format!("injected {} failure", what)))
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<FetchedObject> {
        self.record(Call::Get(key.into()));
        let (content_type, body) =
            self.blobs
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::ObjectNotFound {
                    bucket: bucket.into(),
                    key: key.into(),
                })?;
        Ok(FetchedObject {
            body: stream::iter(vec![Ok(Bytes::from(body))]).boxed(),
            content_type,
        })
    }

    async fn initiate_multipart_upload(&self, target: &UploadTarget) -> StoreResult<String> {
        self.record(Call::Initiate(target.key.clone()));
        if self.fail_initiate {
            return Err(injected("initiate"));
        }
        Ok(self.upload_id.clone().unwrap_or_else(|| UPLOAD_ID.into()))
    }

    async fn upload_part(
        &self,
        _target: &UploadTarget,
        _upload_id: &str,
        part_number: u32,
        body: Bytes,
        is_last: bool,
    ) -> StoreResult<String> {
        self.record(Call::UploadPart {
            part_number,
            len: body.len(),
            is_last,
        });
        if self.fail_part == Some(part_number) {
            return Err(injected("part"));
        }
        self.parts.lock().unwrap().push((part_number, body));
        if let Some((after, cancel)) = &self.cancel_after_part {
            if *after == part_number {
                cancel.cancel();
            }
        }
        Ok(self
            .e_tag
            .clone()
            .unwrap_or_else(|| format!("\"etag-{}\"", part_number)))
    }

    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<ObjectLocation> {
        self.record(Call::Complete(parts.iter().map(|p| p.part_number).collect()));
        if self.fail_complete {
            return Err(injected("complete"));
        }
        Ok(ObjectLocation {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            e_tag: format!("{}-{}", upload_id, parts.len()),
            url: format!("mock://{}/{}", target.bucket, target.key),
        })
    }

    async fn abort_multipart_upload(
        &self,
        _target: &UploadTarget,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.record(Call::Abort(upload_id.into()));
        if self.fail_abort {
            return Err(injected("abort"));
        }
        Ok(())
    }
}

/// Config with the smallest part size the store accepts.
pub fn small_parts() -> UploadConfig {
    UploadConfig::new(BUCKET).with_part_size(NonZeroU64::new(MIN_PART_SIZE).unwrap())
}

/// Deterministic, poorly compressible bytes so archives span several parts.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

pub fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

/// Entry names and contents of a ZIP archive, in archive order.
pub fn unzip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut entry = zip.by_index(i).unwrap();
            let mut out = Vec::new();
            entry.read_to_end(&mut out).unwrap();
            (entry.name().to_string(), out)
        })
        .collect()
}
