//! Part boundaries over a finished archive, and the forward-only cursor that
//! hands each part its bytes.

use crate::errors::UploadError;
use bytes::Bytes;
use std::num::NonZeroU64;

/// One scheduled part of a multipart upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedPart {
    /// Zero-based index; the part number sent to the store is `index + 1`.
    pub index: u32,

    /// Whether this part absorbs everything up to the end of the archive.
    pub is_last: bool,

    /// Byte offset of the part within the archive.
    pub offset: u64,

    /// Number of bytes in the part.
    pub length: u64,
}

impl PlannedPart {
    pub fn part_number(&self) -> u32 {
        self.index + 1
    }
}

/// Part schedule for an archive of known length.
///
/// The plan is cheap to copy and every call to [`PartPlan::iter`] starts over
/// from the first part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartPlan {
    total_length: u64,
    part_size: NonZeroU64,
}

impl PartPlan {
    /// Plan parts of `part_size` bytes over `total_length` bytes.
    ///
    /// A zero-length archive cannot be uploaded as a part and fails with
    /// `EmptyArchive`.
    pub fn new(total_length: u64, part_size: NonZeroU64) -> Result<Self, UploadError> {
        if total_length == 0 {
            return Err(UploadError::EmptyArchive);
        }
        Ok(Self {
            total_length,
            part_size,
        })
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn part_size(&self) -> u64 {
        self.part_size.get()
    }

    pub fn iter(&self) -> PartBoundaries {
        PartBoundaries {
            plan: *self,
            position: 0,
            index: 0,
        }
    }

    /// Number of parts the plan yields.
    pub fn part_count(&self) -> u64 {
        self.total_length.div_ceil(self.part_size.get())
    }
}

impl IntoIterator for &PartPlan {
    type Item = PlannedPart;
    type IntoIter = PartBoundaries;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the parts of a [`PartPlan`].
#[derive(Clone, Debug)]
pub struct PartBoundaries {
    plan: PartPlan,
    position: u64,
    index: u32,
}

impl Iterator for PartBoundaries {
    type Item = PlannedPart;

    fn next(&mut self) -> Option<PlannedPart> {
        let total = self.plan.total_length;
        let part_size = self.plan.part_size.get();
        if self.position >= total {
            return None;
        }

        let is_last = self.position >= total.saturating_sub(part_size);
        let length = if is_last {
            total - self.position
        } else {
            part_size
        };
        let part = PlannedPart {
            index: self.index,
            is_last,
            offset: self.position,
            length,
        };

        // The last part ends the plan even if it was shorter than part_size.
        self.position = if is_last { total } else { self.position + part_size };
        self.index += 1;
        Some(part)
    }
}

/// Forward-only cursor over the archive bytes.
///
/// Each part step takes its bytes from the current position and advances it.
/// There is no way to seek backwards; a part that must be re-sent requires a
/// new session.
#[derive(Debug)]
pub struct PartReader {
    remaining: Bytes,
    position: u64,
}

impl PartReader {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            remaining: bytes,
            position: 0,
        }
    }

    /// Current offset from the start of the archive.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining_len(&self) -> u64 {
        self.remaining.len() as u64
    }

    /// Take up to `len` bytes from the cursor.
    pub fn take(&mut self, len: u64) -> Bytes {
        let len = usize::try_from(len)
            .unwrap_or(usize::MAX)
            .min(self.remaining.len());
        let chunk = self.remaining.split_to(len);
        self.position += chunk.len() as u64;
        chunk
    }

    /// Take every byte left in the cursor.
    pub fn take_rest(&mut self) -> Bytes {
        let rest = std::mem::take(&mut self.remaining);
        self.position += rest.len() as u64;
        rest
    }
}
