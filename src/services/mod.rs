pub mod archive_builder;
pub mod etag_codec;
pub mod local_store;
pub mod multipart_session;
pub mod object_store;
pub mod orchestrator;
pub mod part_planner;
