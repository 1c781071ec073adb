//! Error taxonomy for the archive upload pipeline.
//!
//! Every failure surfaced to a caller is one [`UploadError`] whose variant
//! names the step that failed. The collaborator's own error is kept as the
//! `source()` of the variant, and a failed best-effort abort is attached as
//! secondary context without replacing the original cause.

use crate::services::object_store::StoreError;
use thiserror::Error;

/// Reasons a session token could not be decoded or constructed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("session token is missing the `|` separator")]
    MissingSeparator,
    #[error("upload id is empty")]
    EmptyUploadId,
    #[error("upload id `{0}` contains the reserved character `|`")]
    ReservedInUploadId(String),
    #[error("part list has an odd number of fields ({0})")]
    OddFieldCount(usize),
    #[error("part number `{0}` is not a positive integer")]
    InvalidPartNumber(String),
    #[error("ETag for part {0} is empty")]
    EmptyETag(u32),
    #[error("ETag `{etag}` for part {part_number} contains a reserved character")]
    ReservedInETag { part_number: u32, etag: String },
}

/// Terminal error of one upload attempt.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to fetch source `{key}`")]
    Fetch {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("source `{key}` has unsupported content type `{content_type}`")]
    UnsupportedFormat { key: String, content_type: String },

    #[error("archive is empty")]
    EmptyArchive,

    #[error("failed to initiate multipart upload for `{bucket}/{key}`")]
    Initiation {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
        abort_failure: Option<Box<StoreError>>,
    },

    #[error("failed to upload part {part_number} of upload `{upload_id}`")]
    PartUpload {
        upload_id: String,
        part_number: u32,
        #[source]
        source: StoreError,
        abort_failure: Option<Box<StoreError>>,
    },

    #[error("parts are out of order: expected part {expected}, found part {found}")]
    OrderingViolation {
        upload_id: Option<String>,
        expected: u32,
        found: u32,
        abort_failure: Option<Box<StoreError>>,
    },

    #[error("failed to complete multipart upload `{upload_id}`")]
    Completion {
        upload_id: String,
        #[source]
        source: StoreError,
        abort_failure: Option<Box<StoreError>>,
    },

    #[error("invalid session token")]
    Decode(#[from] TokenError),

    #[error("upload cancelled")]
    Cancelled {
        upload_id: Option<String>,
        abort_failure: Option<Box<StoreError>>,
    },
}

/// Flat classification of [`UploadError`], convenient for matching and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FetchFailure,
    UnsupportedFormat,
    EmptyArchive,
    InitiationFailure,
    PartUploadFailure,
    OrderingViolation,
    CompletionFailure,
    DecodeError,
    Cancelled,
}

impl ErrorKind {
    /// `OrderingViolation` is a completion failure detected locally.
    pub fn is_completion_failure(self) -> bool {
        matches!(self, Self::CompletionFailure | Self::OrderingViolation)
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { .. } => ErrorKind::FetchFailure,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::EmptyArchive => ErrorKind::EmptyArchive,
            Self::Initiation { .. } => ErrorKind::InitiationFailure,
            Self::PartUpload { .. } => ErrorKind::PartUploadFailure,
            Self::OrderingViolation { .. } => ErrorKind::OrderingViolation,
            Self::Completion { .. } => ErrorKind::CompletionFailure,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The failure of the best-effort abort that followed this error, if any.
    pub fn abort_failure(&self) -> Option<&StoreError> {
        match self {
            Self::Initiation { abort_failure, .. }
            | Self::PartUpload { abort_failure, .. }
            | Self::OrderingViolation { abort_failure, .. }
            | Self::Completion { abort_failure, .. }
            | Self::Cancelled { abort_failure, .. } => abort_failure.as_deref(),
            _ => None,
        }
    }

    /// Attach a failed abort as secondary context. Variants raised before a
    /// session exists have nothing to abort and are returned unchanged.
    pub(crate) fn with_abort_failure(mut self, err: StoreError) -> Self {
        match &mut self {
            Self::Initiation { abort_failure, .. }
            | Self::PartUpload { abort_failure, .. }
            | Self::OrderingViolation { abort_failure, .. }
            | Self::Completion { abort_failure, .. }
            | Self::Cancelled { abort_failure, .. } => *abort_failure = Some(Box::new(err)),
            _ => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn abort_failure_does_not_replace_source() {
        let err = UploadError::PartUpload {
            upload_id: "u-1".into(),
            part_number: 2,
            source: StoreError::Io(io::Error::other("connection reset")),
            abort_failure: None,
        }
        .with_abort_failure(StoreError::NoSuchUpload("u-1".into()));

        assert_eq!(err.kind(), ErrorKind::PartUploadFailure);
        assert!(matches!(
            err.abort_failure(),
            Some(StoreError::NoSuchUpload(id)) if id == "u-1"
        ));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection reset"));
    }

    #[test]
    fn pre_session_errors_ignore_abort_context() {
        let err = UploadError::EmptyArchive.with_abort_failure(StoreError::InvalidObjectKey);
        assert!(err.abort_failure().is_none());
    }

    #[test]
    fn ordering_violation_is_a_completion_failure() {
        assert!(ErrorKind::OrderingViolation.is_completion_failure());
        assert!(ErrorKind::CompletionFailure.is_completion_failure());
        assert!(!ErrorKind::PartUploadFailure.is_completion_failure());
    }
}
