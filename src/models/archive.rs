//! Entries that exist only while an archive is being built.

/// One fetched input blob and the content type the store declared for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceEntry {
    pub key: String,
    pub content_type: String,
}

/// One named entry inside the built archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name: base name of the source key with the canonical extension.
    pub name: String,

    /// Uncompressed length of the entry.
    pub byte_length: u64,
}
