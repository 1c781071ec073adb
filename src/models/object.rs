//! Request-scoped upload targets and what the store hands back.

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::{fmt, io, str::FromStr};

/// A user-defined tag attached to the uploaded object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl FromStr for Tag {
    type Err = String;

    /// Parse `key=value`; the key must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Tag::new(key, value)),
            _ => Err(format!("tag `{}` must look like key=value", s)),
        }
    }
}

/// Canned access policy applied to the uploaded object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    #[default]
    Private,
    PublicRead,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::PublicRead => write!(f, "public-read"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "public-read" => Ok(Visibility::PublicRead),
            other => Err(format!(
                "visibility `{}` is not one of: private, public-read",
                other
            )),
        }
    }
}

/// Where and how the finished archive is written.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    /// Destination bucket.
    pub bucket: String,

    /// Destination object key.
    pub key: String,

    /// Content type recorded on the uploaded object.
    pub content_type: String,

    /// Tags recorded on the uploaded object.
    pub tags: Vec<Tag>,

    /// Access policy of the uploaded object.
    pub visibility: Visibility,
}

/// Final location of a completed upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,

    /// ETag of the assembled object.
    pub e_tag: String,

    /// Store-specific address of the object (URL or path).
    pub url: String,
}

/// Streaming body of a fetched object.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// A fetched source blob: its body and the content type the store declared.
pub struct FetchedObject {
    pub body: ObjectBody,
    pub content_type: Option<String>,
}

impl fmt::Debug for FetchedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedObject")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_and_visibility() {
        assert_eq!("expireMonth=1".parse::<Tag>(), Ok(Tag::new("expireMonth", "1")));
        assert_eq!("empty=".parse::<Tag>(), Ok(Tag::new("empty", "")));
        assert!("=1".parse::<Tag>().is_err());
        assert!("novalue".parse::<Tag>().is_err());

        assert_eq!("PUBLIC-READ".parse::<Visibility>(), Ok(Visibility::PublicRead));
        assert_eq!(Visibility::PublicRead.to_string(), "public-read");
        assert!("world-writable".parse::<Visibility>().is_err());
    }
}
