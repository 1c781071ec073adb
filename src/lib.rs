//! Builds a ZIP archive from objects in a store and uploads it back as a
//! multipart upload, one part at a time.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::UploadConfig;
pub use errors::{ErrorKind, TokenError, UploadError};
pub use services::{
    local_store::LocalStore,
    multipart_session::{ChunkOutcome, MultipartSession, process_chunk},
    object_store::{BlobFetcher, ObjectStore, StoreError},
    orchestrator::Uploader,
};
