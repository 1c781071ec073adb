//! src/services/local_store.rs
//!
//! Disk-backed [`ObjectStore`]. Payloads are sharded
//! beneath `base_path/{bucket}/{shard}/{shard}/{key}` with a JSON sidecar
//! (`{key}.meta.json`) holding content type, ETag, tags and visibility.
//! Multipart uploads are staged under `base_path/.multipart/{upload_id}/`,
//! one file per part, and assembled on completion.

use crate::{
    models::{
        metadata::{ObjectMetadata, PendingUpload},
        multipart::PartDescriptor,
        object::{FetchedObject, ObjectLocation, UploadTarget},
    },
    services::object_store::{ObjectStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const STAGING_DIR: &str = ".multipart";
const METADATA_SUFFIX: &str = ".meta.json";
const UPLOAD_RECORD: &str = "upload.json";

/// Disk-backed object store used by the CLI and tests.
#[derive(Clone, Debug)]
pub struct LocalStore {
    /// Base directory on disk where buckets and staged uploads live.
    pub base_path: PathBuf,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the bucket directory or collide with a
    /// metadata sidecar.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.ends_with('/') || key.contains("..") {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.ends_with(METADATA_SUFFIX) {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| StoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    /// Compute the physical base folder path for a bucket.
    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path.
    ///
    /// Combines base_path/bucket/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn metadata_path(object_path: &Path) -> PathBuf {
        let mut raw = object_path.as_os_str().to_owned();
        raw.push(METADATA_SUFFIX);
        PathBuf::from(raw)
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(STAGING_DIR).join(upload_id)
    }

    fn part_path(staging: &Path, part_number: u32) -> PathBuf {
        staging.join(format!("part-{:05}", part_number))
    }

    /// Validate the target and make sure its bucket exists.
    async fn check_target(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        if !fs::try_exists(self.bucket_root(bucket)).await? {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        Ok(())
    }

    /// Create a bucket directory. Creating an existing bucket is a no-op.
    pub async fn create_bucket(&self, name: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;
        Ok(())
    }

    /// Stream-upload an object to disk and write its metadata sidecar.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    ///
    /// Cleans up temp files on errors.
    pub async fn put_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<ObjectMetadata>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.check_target(bucket, key).await?;
        let file_path = self.object_path(bucket, key);
        let tmp_path = self.temp_path_for(&file_path).await?;
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes = 0u64;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let written = match chunk_res {
                Ok(chunk) => {
                    size_bytes += chunk.len() as u64;
                    digest.consume(&chunk);
                    file.write_all(&chunk).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let metadata = ObjectMetadata {
            key: key.to_string(),
            content_type,
            size_bytes,
            etag: format!("{:x}", digest.compute()),
            tags: Vec::new(),
            visibility: Default::default(),
            last_modified: Utc::now(),
        };
        self.commit(file, &tmp_path, &file_path, &metadata).await?;
        Ok(metadata)
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata> {
        self.check_target(bucket, key).await?;
        let file_path = self.object_path(bucket, key);
        let raw = fs::read(Self::metadata_path(&file_path))
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Pick a temp file next to `file_path`, creating parent directories.
    async fn temp_path_for(&self, file_path: &Path) -> StoreResult<PathBuf> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
    }

    /// Flush a fully written temp file, move it into place and write the
    /// sidecar. The temp file is removed on any failure.
    async fn commit(
        &self,
        mut file: File,
        tmp_path: &Path,
        file_path: &Path,
        metadata: &ObjectMetadata,
    ) -> StoreResult<()> {
        let synced = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = synced {
            let _ = fs::remove_file(tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let raw = serde_json::to_vec_pretty(metadata)?;
        fs::write(Self::metadata_path(file_path), raw).await?;
        Ok(())
    }

    async fn read_pending(&self, upload_id: &str) -> StoreResult<PendingUpload> {
        if upload_id.is_empty() || upload_id.contains(['/', '\\', '.']) {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        let record = self.staging_dir(upload_id).join(UPLOAD_RECORD);
        let raw = fs::read(&record).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NoSuchUpload(upload_id.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Load a staged upload and check it belongs to `target`.
    async fn pending_for(&self, target: &UploadTarget, upload_id: &str) -> StoreResult<PendingUpload> {
        let pending = self.read_pending(upload_id).await?;
        if pending.bucket != target.bucket || pending.key != target.key {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(pending)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<FetchedObject> {
        let metadata = self.get_object_metadata(bucket, key).await?;
        let file_path = self.object_path(bucket, key);
        let file = File::open(&file_path)
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))?;

        Ok(FetchedObject {
            body: ReaderStream::new(file).boxed(),
            content_type: metadata.content_type,
        })
    }

    async fn initiate_multipart_upload(&self, target: &UploadTarget) -> StoreResult<String> {
        self.check_target(&target.bucket, &target.key).await?;

        let upload_id = Uuid::new_v4().simple().to_string();
        let staging = self.staging_dir(&upload_id);
        fs::create_dir_all(&staging).await?;

        let pending = PendingUpload {
            upload_id: upload_id.clone(),
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            content_type: target.content_type.clone(),
            tags: target.tags.clone(),
            visibility: target.visibility,
            initiated_at: Utc::now(),
        };
        fs::write(staging.join(UPLOAD_RECORD), serde_json::to_vec_pretty(&pending)?).await?;

        debug!("initiated upload {} for {}/{}", upload_id, target.bucket, target.key);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
        _is_last: bool,
    ) -> StoreResult<String> {
        self.pending_for(target, upload_id).await?;
        if part_number == 0 {
            return Err(StoreError::InvalidPart {
                upload_id: upload_id.to_string(),
                part_number,
            });
        }

        let path = Self::part_path(&self.staging_dir(upload_id), part_number);
        fs::write(&path, &body).await?;
        let etag = format!("\"{:x}\"", md5::compute(&body));
        debug!(
            "stored part {} of upload {} ({} bytes)",
            part_number,
            upload_id,
            body.len()
        );
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> StoreResult<ObjectLocation> {
        let pending = self.pending_for(target, upload_id).await?;
        let staging = self.staging_dir(upload_id);
        let invalid_part = |part_number| StoreError::InvalidPart {
            upload_id: upload_id.to_string(),
            part_number,
        };
        if parts.is_empty() {
            return Err(invalid_part(1));
        }

        let file_path = self.object_path(&pending.bucket, &pending.key);
        let tmp_path = self.temp_path_for(&file_path).await?;
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes = 0u64;
        let mut part_digests = Vec::with_capacity(parts.len() * 16);
        for part in parts {
            let data = match fs::read(Self::part_path(&staging, part.part_number)).await {
                Ok(data) => data,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(if err.kind() == ErrorKind::NotFound {
                        invalid_part(part.part_number)
                    } else {
                        StoreError::Io(err)
                    });
                }
            };
            let digest = md5::compute(&data);
            if format!("\"{:x}\"", digest) != part.e_tag {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(invalid_part(part.part_number));
            }
            if let Err(err) = file.write_all(&data).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
            part_digests.extend_from_slice(&digest.0);
            size_bytes += data.len() as u64;
        }

        let etag = format!("{:x}-{}", md5::compute(&part_digests), parts.len());
        let metadata = ObjectMetadata {
            key: pending.key.clone(),
            content_type: Some(pending.content_type.clone()),
            size_bytes,
            etag: etag.clone(),
            tags: pending.tags.clone(),
            visibility: pending.visibility,
            last_modified: Utc::now(),
        };
        self.commit(file, &tmp_path, &file_path, &metadata).await?;

        if let Err(err) = fs::remove_dir_all(&staging).await {
            debug!("failed to remove staging directory {}: {}", staging.display(), err);
        }

        Ok(ObjectLocation {
            bucket: pending.bucket,
            key: pending.key,
            e_tag: etag,
            url: format!("file://{}", file_path.display()),
        })
    }

    async fn abort_multipart_upload(
        &self,
        target: &UploadTarget,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.pending_for(target, upload_id).await?;
        let staging = self.staging_dir(upload_id);
        fs::remove_dir_all(&staging).await?;
        debug!("aborted upload {}", upload_id);
        Ok(())
    }
}

fn not_found_or_io(err: io::Error, bucket: &str, key: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        StoreError::Io(err)
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalStore {
        LocalStore::new("/tmp/unused")
    }

    #[test]
    fn rejects_unsafe_keys() {
        let store = store();
        for key in ["", "/abs", "a/../b", "dir/", "bad\\key", "x.meta.json"] {
            assert!(
                matches!(store.ensure_key_safe(key), Err(StoreError::InvalidObjectKey)),
                "{key}"
            );
        }
        assert!(store.ensure_key_safe("photos/2025/img.jpg").is_ok());
    }

    #[test]
    fn validates_bucket_names() {
        let store = store();
        for name in ["ab", "Upper", "-lead", "trail.", "a..b", "a.-b", "192.168.0.1"] {
            assert!(store.ensure_bucket_name_safe(name).is_err(), "{name}");
        }
        assert!(store.ensure_bucket_name_safe("fotogo-exports.1").is_ok());
    }

    #[test]
    fn shards_are_stable_hex_pairs() {
        let (a, b) = LocalStore::object_shards("photos", "img.jpg");
        assert_eq!((a.len(), b.len()), (2, 2));
        assert_eq!(LocalStore::object_shards("photos", "img.jpg"), (a, b));
        assert!(is_ipv4_like("10.0.0.255"));
        assert!(!is_ipv4_like("10.0.0.256"));
    }
}
