//! Metadata recorded next to each payload written by the local store.

use super::object::{Tag, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sidecar record describing one stored object.
///
/// The object's bytes live in the sharded payload file; this record holds
/// everything a `get` needs to answer besides the bytes themselves.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectMetadata {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: u64,

    /// MD5 hex digest, or `<md5-of-part-digests>-<parts>` for multipart objects.
    pub etag: String,

    /// Tags supplied at upload time.
    #[serde(default)]
    pub tags: Vec<Tag>,

    #[serde(default)]
    pub visibility: Visibility,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,
}

/// Staging record of an in-progress multipart upload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PendingUpload {
    /// Unique upload ID (returned to the client).
    pub upload_id: String,

    pub bucket: String,
    pub key: String,
    pub content_type: String,

    #[serde(default)]
    pub tags: Vec<Tag>,

    #[serde(default)]
    pub visibility: Visibility,

    /// Timestamp when upload was initiated.
    pub initiated_at: DateTime<Utc>,
}
