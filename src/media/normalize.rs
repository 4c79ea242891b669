//! URL canonicalization and de-duplication for media references.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::media::{MediaKind, MediaReference, VideoRef};

static SOURCE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\?source=[^&]*$").unwrap());

/// Trims, rejects empty and `data:` values, and upgrades protocol-relative URLs.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() || url.starts_with("data:") {
        return None;
    }
    if let Some(rest) = url.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    Some(url.to_string())
}

/// Removes a trailing `?source=...` tracking parameter.
pub fn strip_source_param(url: &str) -> String {
    SOURCE_PARAM.replace(url, "").into_owned()
}

/// Normalizes, strips tracking and requires an absolute http(s) URL.
/// Applying it twice yields the same result as applying it once.
pub fn canonicalize(raw: &str) -> Option<String> {
    let url = strip_source_param(&normalize_url(raw)?);
    let parsed = url::Url::parse(&url).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(url)
}

/// Full-resolution, watermark-free image URL for an original-image token.
pub fn no_watermark_url(cdn_base: &str, token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(format!("{}/{}_r.jpg", cdn_base.trim_end_matches('/'), token))
}

/// Human-readable byte size: `N B`, then one decimal in KB, MB or GB.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let n = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if n < KB * KB {
        format!("{:.1} KB", n / KB)
    } else if n < KB * KB * KB {
        format!("{:.1} MB", n / (KB * KB))
    } else {
        format!("{:.1} GB", n / (KB * KB * KB))
    }
}

/// Collects image references and video ids, keeping the first occurrence of each.
#[derive(Debug, Clone)]
pub struct MediaCollector {
    host_marker: String,
    seen_images: HashSet<String>,
    seen_videos: HashSet<String>,
    images: Vec<MediaReference>,
    videos: Vec<VideoRef>,
}

impl MediaCollector {
    /// Only image URLs containing `host_marker` (case-insensitive) are kept.
    pub fn new(host_marker: &str) -> Self {
        Self {
            host_marker: host_marker.to_ascii_lowercase(),
            seen_images: HashSet::new(),
            seen_videos: HashSet::new(),
            images: Vec::new(),
            videos: Vec::new(),
        }
    }

    /// Adds an image. Returns whether it was new.
    pub fn push_image(&mut self, url: &str, thumbnail: Option<&str>, width: u32, height: u32) -> bool {
        let Some(canonical) = canonicalize(url) else {
            return false;
        };
        if !canonical.to_ascii_lowercase().contains(&self.host_marker) {
            return false;
        }
        if !self.seen_images.insert(canonical.clone()) {
            return false;
        }
        let thumbnail = thumbnail
            .and_then(normalize_url)
            .unwrap_or_else(|| canonical.clone());
        self.images.push(MediaReference {
            kind: MediaKind::Image,
            canonical_url: canonical,
            thumbnail_url: Some(thumbnail),
            width,
            height,
            quality_label: None,
            size_bytes: None,
            native_id: None,
        });
        true
    }

    pub fn push_video(&mut self, id: &str, poster: Option<&str>) -> bool {
        let id = id.trim();
        if id.is_empty() || !self.seen_videos.insert(id.to_string()) {
            return false;
        }
        self.videos.push(VideoRef {
            id: id.to_string(),
            poster: poster.and_then(normalize_url),
        });
        true
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn into_parts(self) -> (Vec<MediaReference>, Vec<VideoRef>) {
        (self.images, self.videos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_protocol_relative_and_data() {
        assert_eq!(
            normalize_url("  //pic1.zhimg.com/a.jpg ").as_deref(),
            Some("https://pic1.zhimg.com/a.jpg")
        );
        assert_eq!(normalize_url("data:image/png;base64,AA"), None);
        assert_eq!(normalize_url("   "), None);
    }

    #[test]
    fn strips_trailing_source_param_only() {
        assert_eq!(
            strip_source_param("https://pic1.zhimg.com/v2-a_r.jpg?source=1940ef5c"),
            "https://pic1.zhimg.com/v2-a_r.jpg"
        );
        assert_eq!(
            strip_source_param("https://x.zhimg.com/a.jpg?source=1&w=2"),
            "https://x.zhimg.com/a.jpg?source=1&w=2"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for raw in [
            "//pic2.zhimg.com/v2-abc_720w.jpg?source=172ae18b",
            "https://pic1.zhimg.com/v2-abc_r.jpg",
            "http://example.com/a.png?source=x",
        ] {
            let once = canonicalize(raw).unwrap();
            assert_eq!(canonicalize(&once).as_deref(), Some(once.as_str()));
        }
        assert_eq!(canonicalize("/relative/a.png"), None);
        assert_eq!(canonicalize("javascript:alert(1)"), None);
    }

    #[test]
    fn token_builds_watermark_free_url() {
        assert_eq!(
            no_watermark_url("https://pic1.zhimg.com/", " v2-abc123 ").as_deref(),
            Some("https://pic1.zhimg.com/v2-abc123_r.jpg")
        );
        assert_eq!(no_watermark_url("https://pic1.zhimg.com", ""), None);
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn collector_keeps_first_occurrence() {
        let mut collector = MediaCollector::new("zhimg.com");
        assert!(collector.push_image("https://pic1.zhimg.com/a.jpg", Some("//pic1.zhimg.com/a_t.jpg"), 10, 20));
        assert!(!collector.push_image("https://pic1.zhimg.com/a.jpg?source=abc", Some("https://other"), 0, 0));
        assert!(!collector.push_image("https://example.com/b.jpg", None, 0, 0));
        assert!(collector.push_video("42", Some("//poster")));
        assert!(!collector.push_video(" 42 ", None));

        let (images, videos) = collector.into_parts();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].thumbnail_url.as_deref(), Some("https://pic1.zhimg.com/a_t.jpg"));
        assert_eq!((images[0].width, images[0].height), (10, 20));
        assert_eq!(videos[0].poster.as_deref(), Some("https://poster"));
    }
}

#[cfg(feature = "fuzz")]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(
            url in r"(https?:)?//pic[1-4]\.zhimg\.com/v2-[a-z0-9]{1,12}(_r|_b|_720w)?\.(jpg|png)(\?source=[a-z0-9]{0,8})?"
        ) {
            let once = canonicalize(&url);
            prop_assert!(once.is_some());
            prop_assert_eq!(once.as_deref().and_then(canonicalize), once);
        }

        #[test]
        fn collector_drops_exactly_the_duplicates(ids in prop::collection::vec(0u8..8, 0..24)) {
            let mut collector = MediaCollector::new("zhimg.com");
            for id in &ids {
                collector.push_image(&format!("https://pic1.zhimg.com/{id}.jpg?source=x"), None, 0, 0);
            }
            let distinct: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(collector.image_count(), distinct.len());
        }
    }
}
