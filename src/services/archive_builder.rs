//! Streams fetched source blobs into one ZIP archive held in memory.
//!
//! The build is all-or-nothing: any failure drops the partially written
//! archive, and nothing is handed to the upload stage.

use crate::{
    errors::UploadError,
    models::archive::{ArchiveEntry, SourceEntry},
    services::{
        object_store::{BlobFetcher, StoreError},
        part_planner::PartReader,
    },
};
use bytes::Bytes;
use futures::StreamExt;
use std::{
    collections::HashSet,
    io::{self, Cursor, Write},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Content types accepted as archive entries and their canonical extensions.
const FORMATS: [(&str, &str); 14] = [
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("image/tiff", "tiff"),
    ("image/bmp", "bmp"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("application/json", "json"),
];

/// Canonical extension for a content type, ignoring parameters and case.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    FORMATS
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Last path segment of `key` without its final extension.
///
/// A leading dot (`.profile`) is part of the name, not an extension.
fn base_name(key: &str) -> &str {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}

/// Entry name for `key`, suffixed with `-2`, `-3`, ... when already taken.
fn entry_name(key: &str, extension: &str, taken: &mut HashSet<String>) -> String {
    let stem = base_name(key);
    let mut name = format!("{}.{}", stem, extension);
    let mut n = 2;
    while !taken.insert(name.clone()) {
        name = format!("{}-{}.{}", stem, n, extension);
        n += 1;
    }
    name
}

/// Entries may exceed 4 GiB, so every entry carries a zip64 extra field.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true)
}

fn fetch_error(key: &str, err: io::Error) -> UploadError {
    UploadError::Fetch {
        key: key.to_string(),
        source: StoreError::Io(err),
    }
}

/// A finished archive and the entries written into it.
#[derive(Debug)]
pub struct BuiltArchive {
    bytes: Bytes,
    entries: Vec<ArchiveEntry>,
}

impl BuiltArchive {
    /// Total archive length in bytes.
    pub fn total_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Hand the archive over to a forward-only part reader.
    pub fn into_reader(self) -> PartReader {
        PartReader::new(self.bytes)
    }
}

/// Fetch every source in order and write it as one deflated archive entry.
///
/// Fails with `EmptyArchive` when there are no sources (before any fetch) or
/// when every source turned out to be empty.
pub async fn build(
    source_keys: &[String],
    fetcher: &dyn BlobFetcher,
    cancel: &CancellationToken,
) -> Result<BuiltArchive, UploadError> {
    let Some(last_key) = source_keys.last() else {
        return Err(UploadError::EmptyArchive);
    };

    let options = entry_options();
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = Vec::with_capacity(source_keys.len());
    let mut taken = HashSet::new();

    for key in source_keys {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                upload_id: None,
                abort_failure: None,
            });
        }

        let fetched = fetcher
            .fetch(key)
            .await
            .map_err(|source| UploadError::Fetch {
                key: key.clone(),
                source,
            })?;

        let content_type = fetched.content_type.unwrap_or_default();
        let Some(extension) = extension_for(&content_type) else {
            return Err(UploadError::UnsupportedFormat {
                key: key.clone(),
                content_type,
            });
        };
        let source = SourceEntry {
            key: key.clone(),
            content_type,
        };

        let name = entry_name(&source.key, extension, &mut taken);
        writer
            .start_file(name.as_str(), options)
            .map_err(|err| fetch_error(key, io::Error::other(err)))?;

        let mut byte_length = 0u64;
        let mut body = fetched.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| fetch_error(key, err))?;
            writer
                .write_all(&chunk)
                .map_err(|err| fetch_error(key, err))?;
            byte_length += chunk.len() as u64;
        }

        debug!(
            "archived {} ({}) as {} with {} bytes",
            source.key, source.content_type, name, byte_length
        );
        entries.push(ArchiveEntry { name, byte_length });
    }

    if entries.iter().all(|entry| entry.byte_length == 0) {
        return Err(UploadError::EmptyArchive);
    }

    let cursor = writer
        .finish()
        .map_err(|err| fetch_error(last_key, io::Error::other(err)))?;
    let bytes = Bytes::from(cursor.into_inner());

    info!(
        "built archive with {} entries, {} bytes",
        entries.len(),
        bytes.len()
    );
    Ok(BuiltArchive { bytes, entries })
}
