//! Sequential build-and-upload pipeline.
//!
//! One [`Uploader`] run fetches every source, builds the archive, plans its
//! parts and feeds them one at a time through [`process_chunk`], threading the
//! encoded session token from each call into the next.

use crate::{
    config::UploadConfig,
    errors::UploadError,
    models::object::{ObjectLocation, UploadTarget},
    services::{
        archive_builder,
        multipart_session::{ChunkOutcome, MultipartSession, process_chunk},
        object_store::{BucketFetcher, ObjectStore},
        part_planner::{PartPlan, PartReader},
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds archives from sources in one bucket and uploads them to the same
/// bucket through an injected store client.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, config: UploadConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to stop runs between sources or between parts.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Archive `source_keys` (in order) and upload the result as `output_key`.
    ///
    /// Nothing is uploaded unless the whole archive could be built. Once an
    /// upload has been initiated, every failure aborts it before the error is
    /// returned.
    pub async fn build_and_upload(
        &self,
        source_keys: &[String],
        output_key: &str,
    ) -> Result<ObjectLocation, UploadError> {
        let store = self.store.as_ref();
        info!(
            "archiving {} sources from {} into {}",
            source_keys.len(),
            self.config.bucket,
            output_key
        );

        let fetcher = BucketFetcher::new(store, &self.config.bucket);
        let archive = archive_builder::build(source_keys, &fetcher, &self.cancel).await?;
        for entry in archive.entries() {
            debug!("archive entry {} ({} bytes)", entry.name, entry.byte_length);
        }
        let plan = PartPlan::new(archive.total_length(), self.config.part_size)?;
        info!(
            "uploading {} bytes in {} parts of up to {} bytes",
            plan.total_length(),
            plan.part_count(),
            plan.part_size()
        );

        let target = self.config.target(output_key);
        let mut reader = archive.into_reader();
        let location = self.upload_parts(&target, &plan, &mut reader).await?;
        info!("uploaded {}/{} to {}", location.bucket, location.key, location.url);
        Ok(location)
    }

    async fn upload_parts(
        &self,
        target: &UploadTarget,
        plan: &PartPlan,
        reader: &mut PartReader,
    ) -> Result<ObjectLocation, UploadError> {
        let store = self.store.as_ref();
        let mut token: Option<String> = None;

        for part in plan {
            if self.cancel.is_cancelled() {
                let err = self
                    .abort_with(target, token.as_deref(), |upload_id| {
                        UploadError::Cancelled {
                            upload_id,
                            abort_failure: None,
                        }
                    })
                    .await;
                return Err(err);
            }
            match process_chunk(store, target, token.as_deref(), part, reader).await? {
                ChunkOutcome::Continue(next) => token = Some(next),
                ChunkOutcome::Completed(location) => return Ok(location),
            }
        }

        // A plan always ends with its last part; reaching here means the
        // session never completed and must not be left open.
        let parts = plan.part_count() as u32;
        let err = self
            .abort_with(target, token.as_deref(), |upload_id| {
                UploadError::OrderingViolation {
                    upload_id,
                    expected: parts,
                    found: parts.saturating_sub(1),
                    abort_failure: None,
                }
            })
            .await;
        Err(err)
    }

    /// Abort the session described by `token` (if any) and build the error to
    /// report from its upload id. A failed store abort is attached to that
    /// error as secondary context.
    async fn abort_with(
        &self,
        target: &UploadTarget,
        token: Option<&str>,
        make_err: impl FnOnce(Option<String>) -> UploadError,
    ) -> UploadError {
        let Some(token) = token else {
            return make_err(None);
        };
        let mut session = match MultipartSession::resume(self.store.as_ref(), target, token) {
            Ok(session) => session,
            Err(err) => return err,
        };
        let err = make_err(session.upload_id().map(str::to_string));
        match session.abort().await {
            Ok(()) => err,
            Err(abort_err) => {
                warn!("abort after interrupted upload failed: {}", abort_err);
                err.with_abort_failure(abort_err)
            }
        }
    }
}
