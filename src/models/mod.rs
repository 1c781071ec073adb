//! Core data models for the archive upload pipeline.
//!
//! Request-scoped targets and store answers live in `object`, the session
//! state threaded between chunk calls in `multipart`, archive bookkeeping in
//! `archive`, and the local store's on-disk records in `metadata`.

pub mod archive;
pub mod metadata;
pub mod multipart;
pub mod object;
