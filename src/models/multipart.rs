//! Represents multipart upload session state and its parts.

use crate::errors::TokenError;
use serde::{Deserialize, Serialize};

/// Separates the upload id from the part list in an encoded token.
pub const UPLOAD_ID_SEPARATOR: char = '|';

/// Separates the alternating part numbers and ETags in an encoded token.
pub const FIELD_SEPARATOR: char = ',';

/// Result of one successful part upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PartDescriptor {
    /// Part number (1-based).
    pub part_number: u32,

    /// ETag issued by the store for this part.
    pub e_tag: String,
}

impl PartDescriptor {
    /// Build a descriptor that can be carried inside a session token.
    pub fn new(part_number: u32, e_tag: impl Into<String>) -> Result<Self, TokenError> {
        let e_tag = e_tag.into();
        if part_number == 0 {
            return Err(TokenError::InvalidPartNumber(part_number.to_string()));
        }
        if e_tag.is_empty() {
            return Err(TokenError::EmptyETag(part_number));
        }
        if e_tag.contains(&[UPLOAD_ID_SEPARATOR, FIELD_SEPARATOR][..]) {
            return Err(TokenError::ReservedInETag { part_number, etag: e_tag });
        }
        Ok(Self { part_number, e_tag })
    }
}

/// The entire mutable state of a multipart upload session.
///
/// Constructors reject any upload id or ETag that the text encoding cannot
/// carry, so every value of this type survives an encode/decode round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSessionToken {
    upload_id: String,
    parts: Vec<PartDescriptor>,
}

impl UploadSessionToken {
    /// Start a token for a freshly initiated upload with no parts yet.
    pub fn new(upload_id: impl Into<String>) -> Result<Self, TokenError> {
        let upload_id = upload_id.into();
        if upload_id.is_empty() {
            return Err(TokenError::EmptyUploadId);
        }
        if upload_id.contains(UPLOAD_ID_SEPARATOR) {
            return Err(TokenError::ReservedInUploadId(upload_id));
        }
        Ok(Self {
            upload_id,
            parts: Vec::new(),
        })
    }

    /// Build a token from already validated parts, in the order given.
    pub fn with_parts(
        upload_id: impl Into<String>,
        parts: Vec<PartDescriptor>,
    ) -> Result<Self, TokenError> {
        let mut token = Self::new(upload_id)?;
        token.parts = parts;
        Ok(token)
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    /// Part number the next uploaded part must carry.
    pub fn next_part_number(&self) -> u32 {
        self.parts.len() as u32 + 1
    }

    pub fn push(&mut self, part: PartDescriptor) {
        self.parts.push(part);
    }

    /// Check that parts are ascending, contiguous from 1 and duplicate-free.
    ///
    /// Returns `(expected, found)` for the first part that breaks the run.
    pub fn check_ordering(&self) -> Result<(), (u32, u32)> {
        for (idx, part) in self.parts.iter().enumerate() {
            let expected = idx as u32 + 1;
            if part.part_number != expected {
                return Err((expected, part.part_number));
            }
        }
        Ok(())
    }
}
