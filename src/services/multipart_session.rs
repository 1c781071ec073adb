//! Multipart upload state machine.
//!
//! States move `Idle → Initiated → Uploading → Completed`, and any failure
//! after initiation lands in `Aborted` after a best-effort server-side abort.
//! The session's durable state is its [`UploadSessionToken`]: a session can be
//! rebuilt from the encoded token alone, which is what [`process_chunk`] does
//! for every chunk so that chunk calls never share memory.

use crate::{
    errors::UploadError,
    models::{
        multipart::{PartDescriptor, UploadSessionToken},
        object::{ObjectLocation, UploadTarget},
    },
    services::{
        etag_codec,
        object_store::{ObjectStore, StoreError},
        part_planner::{PartReader, PlannedPart},
    },
};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been sent to the store yet.
    Idle,
    /// The store issued an upload id; no part has been uploaded.
    Initiated(UploadSessionToken),
    /// At least one part has been uploaded.
    Uploading(UploadSessionToken),
    /// The store assembled the object.
    Completed {
        location: ObjectLocation,
        part_count: u32,
    },
    /// The session ended without an object.
    Aborted { upload_id: Option<String> },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Aborted { .. })
    }
}

/// What a processed chunk leaves behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More parts follow; pass this token to the next chunk call.
    Continue(String),
    /// The last part was uploaded and the object assembled.
    Completed(ObjectLocation),
}

pub struct MultipartSession<'a> {
    store: &'a dyn ObjectStore,
    target: &'a UploadTarget,
    state: SessionState,
}

impl<'a> MultipartSession<'a> {
    /// A fresh session that will initiate an upload on its first chunk.
    pub fn new(store: &'a dyn ObjectStore, target: &'a UploadTarget) -> Self {
        Self {
            store,
            target,
            state: SessionState::Idle,
        }
    }

    /// Rebuild a session from the token returned by a previous chunk call.
    pub fn resume(
        store: &'a dyn ObjectStore,
        target: &'a UploadTarget,
        token: &str,
    ) -> Result<Self, UploadError> {
        let token = etag_codec::decode(token)?;
        let state = if token.parts().is_empty() {
            SessionState::Initiated(token)
        } else {
            SessionState::Uploading(token)
        };
        Ok(Self {
            store,
            target,
            state,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn upload_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Initiated(token) | SessionState::Uploading(token) => {
                Some(token.upload_id())
            }
            SessionState::Aborted { upload_id } => upload_id.as_deref(),
            _ => None,
        }
    }

    /// Encoded token of a live session; `None` before initiation and once the
    /// session is terminal.
    pub fn token(&self) -> Option<String> {
        match &self.state {
            SessionState::Initiated(token) | SessionState::Uploading(token) => {
                Some(etag_codec::encode(token))
            }
            _ => None,
        }
    }

    /// Upload one planned part, initiating the upload first when the session
    /// is idle and completing it after the last part.
    ///
    /// Bytes come from `reader`, which must sit at `part.offset`: exactly
    /// `part.length` for a regular part, everything left for the last one.
    /// A token whose parts are already out of order, a misplaced cursor or a
    /// body of the wrong length fails the session before anything is sent.
    pub async fn process_chunk(
        &mut self,
        part: PlannedPart,
        reader: &mut PartReader,
    ) -> Result<ChunkOutcome, UploadError> {
        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        let mut token = match state {
            SessionState::Idle if part.index == 0 => self.initiate().await?,
            SessionState::Idle => {
                self.state = SessionState::Aborted { upload_id: None };
                return Err(UploadError::OrderingViolation {
                    upload_id: None,
                    expected: 1,
                    found: part.part_number(),
                    abort_failure: None,
                });
            }
            SessionState::Initiated(token) | SessionState::Uploading(token) => token,
            SessionState::Completed {
                location,
                part_count,
            } => {
                self.state = SessionState::Completed {
                    location,
                    part_count,
                };
                return Err(UploadError::OrderingViolation {
                    upload_id: None,
                    expected: part_count + 1,
                    found: part.part_number(),
                    abort_failure: None,
                });
            }
            SessionState::Aborted { upload_id } => {
                self.state = SessionState::Aborted {
                    upload_id: upload_id.clone(),
                };
                return Err(UploadError::Cancelled {
                    upload_id,
                    abort_failure: None,
                });
            }
        };

        let upload_id = token.upload_id().to_string();
        let part_number = token.next_part_number();
        let misplaced = token
            .check_ordering()
            .err()
            .or((part.part_number() != part_number).then(|| (part_number, part.part_number())));
        if let Some((expected, found)) = misplaced {
            let err = UploadError::OrderingViolation {
                upload_id: Some(upload_id.clone()),
                expected,
                found,
                abort_failure: None,
            };
            return Err(self.fail(upload_id, err).await);
        }

        if reader.position() != part.offset {
            let err = malformed_part(
                &upload_id,
                part_number,
                format!(
                    "cursor is at byte {} but part {} starts at byte {}",
                    reader.position(),
                    part_number,
                    part.offset
                ),
            );
            return Err(self.fail(upload_id, err).await);
        }

        let body = if part.is_last {
            reader.take_rest()
        } else {
            reader.take(part.length)
        };
        if body.len() as u64 != part.length {
            let err = malformed_part(
                &upload_id,
                part_number,
                format!(
                    "part {} holds {} bytes, planned {}",
                    part_number,
                    body.len(),
                    part.length
                ),
            );
            return Err(self.fail(upload_id, err).await);
        }
        debug!(
            "uploading part {} of {} ({} bytes, last: {})",
            part_number,
            upload_id,
            body.len(),
            part.is_last
        );

        let store = self.store;
        let uploaded = store
            .upload_part(self.target, &upload_id, part_number, body, part.is_last)
            .await
            .and_then(|e_tag| {
                PartDescriptor::new(part_number, e_tag)
                    .map_err(|err| StoreError::Malformed(err.to_string()))
            });
        let descriptor = match uploaded {
            Ok(descriptor) => descriptor,
            Err(source) => {
                let err = UploadError::PartUpload {
                    upload_id: upload_id.clone(),
                    part_number,
                    source,
                    abort_failure: None,
                };
                return Err(self.fail(upload_id, err).await);
            }
        };
        token.push(descriptor);

        if !part.is_last {
            let encoded = etag_codec::encode(&token);
            self.state = SessionState::Uploading(token);
            return Ok(ChunkOutcome::Continue(encoded));
        }

        match complete_upload(store, self.target, &token).await {
            Ok(location) => {
                info!(
                    "completed multipart upload {} with {} parts",
                    upload_id,
                    token.parts().len()
                );
                self.state = SessionState::Completed {
                    location: location.clone(),
                    part_count: token.parts().len() as u32,
                };
                Ok(ChunkOutcome::Completed(location))
            }
            Err(err) => Err(self.fail(upload_id, err).await),
        }
    }

    /// Move the session to `Aborted`, asking the store to discard a live
    /// upload. Aborting an aborted or completed session does nothing.
    ///
    /// The session is `Aborted` even when the store call fails; the failure
    /// is returned so the caller can record it.
    pub async fn abort(&mut self) -> Result<(), StoreError> {
        let upload_id = match &self.state {
            SessionState::Idle => {
                self.state = SessionState::Aborted { upload_id: None };
                return Ok(());
            }
            SessionState::Initiated(token) | SessionState::Uploading(token) => {
                token.upload_id().to_string()
            }
            SessionState::Completed { .. } | SessionState::Aborted { .. } => return Ok(()),
        };

        self.state = SessionState::Aborted {
            upload_id: Some(upload_id.clone()),
        };
        warn!("aborting multipart upload {}", upload_id);
        self.store
            .abort_multipart_upload(self.target, &upload_id)
            .await
    }

    async fn initiate(&mut self) -> Result<UploadSessionToken, UploadError> {
        let store = self.store;
        let target = self.target;
        let upload_id = match store.initiate_multipart_upload(target).await {
            Ok(upload_id) => upload_id,
            Err(source) => {
                self.state = SessionState::Aborted { upload_id: None };
                return Err(UploadError::Initiation {
                    bucket: target.bucket.clone(),
                    key: target.key.clone(),
                    source,
                    abort_failure: None,
                });
            }
        };

        match UploadSessionToken::new(upload_id.as_str()) {
            Ok(token) => {
                info!(
                    "initiated multipart upload {} for {}/{}",
                    upload_id, target.bucket, target.key
                );
                Ok(token)
            }
            Err(err) => {
                // The store did create an upload; do not leave it behind.
                let err = UploadError::Initiation {
                    bucket: target.bucket.clone(),
                    key: target.key.clone(),
                    source: StoreError::Malformed(err.to_string()),
                    abort_failure: None,
                };
                Err(self.fail(upload_id, err).await)
            }
        }
    }

    /// Abort after a failure and return the original error, carrying the
    /// abort's own failure as secondary context.
    async fn fail(&mut self, upload_id: String, err: UploadError) -> UploadError {
        warn!("multipart upload {} failed: {}", upload_id, err);
        self.state = SessionState::Aborted {
            upload_id: Some(upload_id.clone()),
        };
        match self
            .store
            .abort_multipart_upload(self.target, &upload_id)
            .await
        {
            Ok(()) => err,
            Err(abort_err) => {
                warn!(
                    "best-effort abort of multipart upload {} failed: {}",
                    upload_id, abort_err
                );
                err.with_abort_failure(abort_err)
            }
        }
    }
}

fn malformed_part(upload_id: &str, part_number: u32, reason: String) -> UploadError {
    UploadError::PartUpload {
        upload_id: upload_id.to_string(),
        part_number,
        source: StoreError::Malformed(reason),
        abort_failure: None,
    }
}

/// Ask the store to assemble the parts recorded in `token`.
///
/// Parts must be ascending, contiguous from 1 and duplicate-free; otherwise
/// this fails with `OrderingViolation` without calling the store.
pub async fn complete_upload(
    store: &dyn ObjectStore,
    target: &UploadTarget,
    token: &UploadSessionToken,
) -> Result<ObjectLocation, UploadError> {
    if let Err((expected, found)) = token.check_ordering() {
        return Err(UploadError::OrderingViolation {
            upload_id: Some(token.upload_id().to_string()),
            expected,
            found,
            abort_failure: None,
        });
    }

    store
        .complete_multipart_upload(target, token.upload_id(), token.parts())
        .await
        .map_err(|source| UploadError::Completion {
            upload_id: token.upload_id().to_string(),
            source,
            abort_failure: None,
        })
}

/// Process one chunk given only the token returned by the previous call.
///
/// `token` is `None` for the first chunk. Returns the token for the next call
/// or the final location once the last part has been processed.
pub async fn process_chunk(
    store: &dyn ObjectStore,
    target: &UploadTarget,
    token: Option<&str>,
    part: PlannedPart,
    reader: &mut PartReader,
) -> Result<ChunkOutcome, UploadError> {
    let mut session = match token {
        None => MultipartSession::new(store, target),
        Some(token) => MultipartSession::resume(store, target, token)?,
    };
    session.process_chunk(part, reader).await
}
