//! Moves inline `data:` images out of a body before it reaches an editor.

pub mod client;
pub mod compress;
pub mod datauri;

pub use client::{PlatformUploader, SessionCookies};
pub use compress::{CompressionLimits, ShrinkLimits};
pub use datauri::DataUri;

use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::fetcher::FetchError;
use crate::fill::prepare::escape_html;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

static INLINE_IMG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*(?:"(data:image/[^"]*)"|'(data:image/[^']*)')[^>]*>"#)
        .unwrap()
});

static ALT_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\balt\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

pub const DEFAULT_IMAGE_LABEL: &str = "图片";

/// An inline image tag located in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImageTag {
    pub start: usize,
    pub end: usize,
    pub src: String,
    pub alt: Option<String>,
}

impl InlineImageTag {
    pub fn label(&self) -> &str {
        self.alt
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(DEFAULT_IMAGE_LABEL)
    }

    /// Paragraph that stands in for an image that could not be hosted.
    pub fn placeholder(&self) -> String {
        format!("<p>[{}]</p>", self.label())
    }
}

fn first_group(caps: &Captures<'_>) -> Option<String> {
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

/// Every `<img>` whose `src` is an inline `data:image/` URI, in document order.
pub fn find_inline_images(html: &str) -> Vec<InlineImageTag> {
    INLINE_IMG_TAG
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let src = first_group(&caps)?;
            let alt = ALT_ATTR
                .captures(whole.as_str())
                .and_then(|a| first_group(&a));
            Some(InlineImageTag {
                start: whole.start(),
                end: whole.end(),
                src,
                alt,
            })
        })
        .collect()
}

/// Applies tag replacements from the last position to the first so earlier
/// offsets stay valid while the string is rewritten.
fn rewrite_tags(html: &str, mut replacements: Vec<(InlineImageTag, String)>) -> String {
    replacements.sort_by_key(|(tag, _)| tag.start);
    let mut out = html.to_string();
    for (tag, replacement) in replacements.into_iter().rev() {
        out.replace_range(tag.start..tag.end, &replacement);
    }
    out
}

/// Replaces every inline image with its `[alt]` placeholder paragraph.
pub fn strip_inline_images(html: &str) -> String {
    let replacements = find_inline_images(html)
        .into_iter()
        .map(|tag| {
            let placeholder = tag.placeholder();
            (tag, placeholder)
        })
        .collect();
    rewrite_tags(html, replacements)
}

/// The image tag with its inline `src` value swapped for `hosted_url`,
/// escaped for use inside an attribute.
pub fn point_src_at(tag_markup: &str, inline_src: &str, hosted_url: &str) -> String {
    tag_markup.replacen(inline_src, &escape_html(hosted_url), 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalizedBody {
    pub html: String,
    pub uploaded: usize,
    pub failed: usize,
}

/// Uploads every inline image and points its `src` at the hosted copy.
/// Images that cannot be hosted become `[alt]` placeholders, so no inline
/// `data:` image survives in the returned body.
#[instrument(skip_all)]
pub async fn externalize_inline_images(
    uploader: &PlatformUploader,
    html: &str,
    limits: &CompressionLimits,
) -> ExternalizedBody {
    let tags = find_inline_images(html);
    let total = tags.len();
    let mut replacements = Vec::with_capacity(total);
    let mut uploaded = 0;

    for (index, tag) in tags.into_iter().enumerate() {
        let hosted = match datauri::parse(&tag.src) {
            Ok(original) => {
                let image = compress::compress_for_upload(&original, limits);
                let file_name = format!("img{}.{}", index, datauri::extension_for(&image.mime));
                uploader.upload(&image, &file_name).await
            }
            Err(err) => {
                warn!(index, error = %err, "skipping undecodable inline image");
                None
            }
        };
        let replacement = match hosted {
            Some(url) => {
                uploaded += 1;
                point_src_at(&html[tag.start..tag.end], &tag.src, &url)
            }
            None => tag.placeholder(),
        };
        replacements.push((tag, replacement));
    }

    info!(uploaded, total, "inline image upload finished");
    ExternalizedBody {
        html: rewrite_tags(html, replacements),
        uploaded,
        failed: total - uploaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<p>a</p><img src="data:image/png;base64,AAA" alt="chart"><p>b</p><IMG alt='x' src='data:image/gif;base64,BBB'/><img src="https://cdn/x.png">"#;

    #[test]
    fn finds_inline_images_only() {
        let tags = find_inline_images(BODY);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].src, "data:image/png;base64,AAA");
        assert_eq!(tags[0].alt.as_deref(), Some("chart"));
        assert_eq!(tags[1].label(), "x");
        assert!(BODY[tags[1].start..tags[1].end].starts_with("<IMG"));
    }

    #[test]
    fn strip_replaces_with_alt_placeholders() {
        let stripped = strip_inline_images(BODY);
        assert!(!stripped.contains("data:image"));
        assert!(stripped.contains("<p>[chart]</p>"));
        assert!(stripped.contains("<p>[x]</p>"));
        assert!(stripped.contains(r#"<img src="https://cdn/x.png">"#));
    }

    #[test]
    fn hosted_url_is_escaped_inside_src() {
        let tag = r#"<img src="data:image/png;base64,AAA" alt="chart">"#;
        assert_eq!(
            point_src_at(tag, "data:image/png;base64,AAA", r#"https://h/x.png?a=1&b="2""#),
            r#"<img src="https://h/x.png?a=1&amp;b=&quot;2&quot;" alt="chart">"#
        );
        assert_eq!(
            point_src_at(tag, "data:image/png;base64,AAA", "https://h/y.png"),
            r#"<img src="https://h/y.png" alt="chart">"#
        );
    }

    #[test]
    fn placeholder_defaults_label() {
        let stripped = strip_inline_images(r#"<img src="data:image/png;base64,A">"#);
        assert_eq!(stripped, "<p>[图片]</p>");
    }
}
