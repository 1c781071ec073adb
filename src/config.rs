use crate::{
    models::object::{Tag, UploadTarget, Visibility},
    services::object_store::MIN_PART_SIZE,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, num::NonZeroU64};

/// Default part size (100 MiB).
pub const DEFAULT_PART_SIZE: u64 = 100 * 1024 * 1024;

/// Content type recorded on uploaded archives unless overridden.
pub const DEFAULT_CONTENT_TYPE: &str = "application/zip";

/// Options for one build-and-upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bucket holding the sources and receiving the archive.
    pub bucket: String,
    pub part_size: NonZeroU64,
    pub content_type: String,
    pub tags: Vec<Tag>,
    pub visibility: Visibility,
}

impl UploadConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            part_size: NonZeroU64::new(DEFAULT_PART_SIZE).unwrap_or(NonZeroU64::MIN),
            content_type: DEFAULT_CONTENT_TYPE.into(),
            tags: Vec::new(),
            visibility: Visibility::default(),
        }
    }

    pub fn with_part_size(mut self, part_size: NonZeroU64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Upload target for `key` in the configured bucket.
    pub fn target(&self, key: &str) -> UploadTarget {
        UploadTarget {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: self.content_type.clone(),
            tags: self.tags.clone(),
            visibility: self.visibility,
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_dir: String,
    pub upload: UploadConfig,
    pub output_key: String,
    pub sources: Vec<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Archive objects into one ZIP and upload it in parts")]
pub struct Args {
    /// Source object keys, archived in the order given
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Key of the uploaded archive
    #[arg(long, short = 'o')]
    pub output_key: String,

    /// Bucket holding the sources and receiving the archive (overrides ARCHIVE_UPLOADER_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Directory backing the local object store (overrides ARCHIVE_UPLOADER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Part size in bytes, at least 5 MiB (overrides ARCHIVE_UPLOADER_PART_SIZE)
    #[arg(long)]
    pub part_size: Option<u64>,

    /// Content type recorded on the archive
    #[arg(long, default_value = DEFAULT_CONTENT_TYPE)]
    pub content_type: String,

    /// Tag recorded on the archive as key=value; may be repeated
    #[arg(long = "tag")]
    pub tags: Vec<Tag>,

    /// Access policy of the archive: private or public-read
    #[arg(long, default_value_t = Visibility::Private)]
    pub visibility: Visibility,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_storage =
            env::var("ARCHIVE_UPLOADER_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_bucket = env::var("ARCHIVE_UPLOADER_BUCKET").ok();
        let env_part_size = match env::var("ARCHIVE_UPLOADER_PART_SIZE") {
            Ok(value) => Some(value.parse::<u64>().with_context(|| {
                format!("parsing ARCHIVE_UPLOADER_PART_SIZE value `{}`", value)
            })?),
            Err(env::VarError::NotPresent) => None,
            Err(err) => return Err(err).context("reading ARCHIVE_UPLOADER_PART_SIZE"),
        };

        // --- Merge ---
        let bucket = args
            .bucket
            .or(env_bucket)
            .context("no bucket given: pass --bucket or set ARCHIVE_UPLOADER_BUCKET")?;
        let part_size = parse_part_size(args.part_size.or(env_part_size).unwrap_or(DEFAULT_PART_SIZE))?;

        let mut upload = UploadConfig::new(bucket)
            .with_part_size(part_size)
            .with_content_type(args.content_type)
            .with_visibility(args.visibility);
        for tag in args.tags {
            upload = upload.with_tag(tag);
        }

        Ok(Self {
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            upload,
            output_key: args.output_key,
            sources: args.sources,
        })
    }
}

/// Only a session's last part may be smaller than the store minimum, so the
/// configured size must meet it.
fn parse_part_size(value: u64) -> Result<NonZeroU64> {
    if value < MIN_PART_SIZE {
        bail!(
            "part size {} is below the store minimum of {} bytes",
            value,
            MIN_PART_SIZE
        );
    }
    NonZeroU64::new(value).context("part size must be positive")
}
