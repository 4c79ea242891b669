//! Media resolution for source-site posts: identifier parsing, content
//! retrieval over the page or direct API path, image/video discovery and
//! playlist enrichment.

pub mod markup;
pub mod normalize;
pub mod resolver;
pub mod source;
pub mod video;

pub use markup::ContentMedia;
pub use normalize::{MediaCollector, canonicalize, format_size};
pub use resolver::{MediaResolver, ResolvedMedia};
pub use source::SourceIdentifier;
pub use video::VideoDetail;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::error::{MSG_NO_MEDIA_FOUND, MSG_UNRECOGNIZED_SOURCE, TransferError};
use crate::fetcher::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// One image or video surfaced to the user.
///
/// Images are identified by `canonical_url`, videos by `native_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub canonical_url: String,
    pub thumbnail_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub quality_label: Option<String>,
    pub size_bytes: Option<u64>,
    pub native_id: Option<String>,
}

/// A video found in content markup, before its playlist is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: String,
    pub poster: Option<String>,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unrecognized source url: {0}")]
    UnrecognizedSource(String),

    #[error("no images, videos or text found")]
    NoContentFound,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<ResolveError> for TransferError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnrecognizedSource(_) => {
                TransferError::UnrecognizedSource(MSG_UNRECOGNIZED_SOURCE.to_string())
            }
            ResolveError::NoContentFound => {
                TransferError::NoContentFound(MSG_NO_MEDIA_FOUND.to_string())
            }
            ResolveError::Fetch(err) => err.into(),
        }
    }
}

fn default_api_headers() -> BTreeMap<String, String> {
    [
        ("accept", "application/json"),
        ("x-api-version", "3.0.91"),
        ("x-app-version", "8.0.0"),
        ("x-app-za", "OS=iOS&Release=17.0&Model=iPhone15,2&VersionName=8.0.0"),
        ("x-app-build", "release"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Endpoints and timings of the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Mobile API generation, called with `api_headers`.
    pub api_v3_base: String,
    /// Web API generation, called without extra headers.
    pub api_v4_base: String,
    pub api_headers: BTreeMap<String, String>,
    /// Playlist endpoint; the video id is appended as a path segment.
    pub lens_base: String,
    /// Host of watermark-free originals built from image tokens.
    pub image_cdn_base: String,
    /// Only image URLs containing this marker are kept.
    pub image_host_marker: String,
    pub tab_timeout: Duration,
    pub settle: Duration,
    pub question_page_limit: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_v3_base: "https://api.zhihu.com".to_string(),
            api_v4_base: "https://www.zhihu.com/api/v4".to_string(),
            api_headers: default_api_headers(),
            lens_base: "https://lens.zhihu.com/api/v4/videos".to_string(),
            image_cdn_base: "https://pic1.zhimg.com".to_string(),
            image_host_marker: "zhimg.com".to_string(),
            tab_timeout: Duration::from_secs(25),
            settle: Duration::from_secs(2),
            question_page_limit: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_map_to_taxonomy() {
        let err: TransferError = ResolveError::UnrecognizedSource("x".into()).into();
        assert_eq!(err.kind(), "UnrecognizedSource");
        assert_eq!(err.message(), MSG_UNRECOGNIZED_SOURCE);

        let err: TransferError = ResolveError::NoContentFound.into();
        assert_eq!(err.kind(), "NoContentFound");
    }

    #[test]
    fn media_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
    }
}
