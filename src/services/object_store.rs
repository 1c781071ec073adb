//! Collaborator contract for the object store the pipeline reads from and
//! writes to.
//!
//! The pipeline never talks to a network client directly. It is handed one
//! `Arc<dyn ObjectStore>` per run and reuses it for every call.

use crate::models::{
    multipart::PartDescriptor,
    object::{FetchedObject, ObjectLocation, UploadTarget},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Minimum size the store accepts for any part but the last (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("multipart upload `{0}` not found")]
    NoSuchUpload(String),
    #[error("part {part_number} of upload `{upload_id}` is missing or does not match its ETag")]
    InvalidPart { upload_id: String, part_number: u32 },
    #[error("malformed upload data: {0}")]
    Malformed(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Object-store operations the pipeline depends on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for streaming along with its declared content type.
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<FetchedObject>;

    /// Start a multipart upload and return its upload id.
    async fn initiate_multipart_upload(&self, target: &UploadTarget) -> StoreResult<String>;

    /// Upload one part and return the ETag the store issued for it.
    async fn upload_part(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
        is_last: bool,
    ) -> StoreResult<String>;

    /// Assemble the uploaded parts, given in ascending part order.
    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<ObjectLocation>;

    /// Discard an upload and every part uploaded for it.
    async fn abort_multipart_upload(&self, target: &UploadTarget, upload_id: &str)
    -> StoreResult<()>;
}

/// Resolves a source key to its content.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> StoreResult<FetchedObject>;
}

/// Fetches sources out of one bucket of an [`ObjectStore`].
pub struct BucketFetcher<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
}

impl<'a> BucketFetcher<'a> {
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str) -> Self {
        Self { store, bucket }
    }
}

#[async_trait]
impl BlobFetcher for BucketFetcher<'_> {
    async fn fetch(&self, key: &str) -> StoreResult<FetchedObject> {
        self.store.get(self.bucket, key).await
    }
}
