//! Media and text extraction from answer/article content markup.
//!
//! Two readers exist. The structured reader trusts the content layout
//! (`<figure>` and `<noscript>` images only) and is used for content fetched
//! from inside a logged-in page. The layered reader is used for content from
//! the direct API path and also scans attributes and bare URLs, since that
//! markup is sometimes truncated or restructured.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::media::normalize::{MediaCollector, canonicalize, no_watermark_url, normalize_url};
use crate::media::{MediaReference, ResolverConfig, VideoRef};

static FIGURE_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("figure img").unwrap());
static NOSCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("noscript").unwrap());
static NOSCRIPT_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("noscript img").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static VIDEO_BOX: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.video-box").unwrap());

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());
static TAG_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s=/<>"']+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#).unwrap()
});
static TOKEN_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)data-original-token\s*=\s*["']([^"']+)["']"#).unwrap());
static ORIGINAL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:data-original|data-actualsrc)\s*=\s*["']([^"']+)["']"#).unwrap()
});
static VIDEO_HREF_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)video/(\d+)").unwrap());
static VIDEO_URL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)zhihu\.com/video/(\d+)").unwrap());

const TEXT_EXCLUDED: [&str; 4] = ["figure", "noscript", "script", "style"];

/// Media references and plain text found in one piece of content markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentMedia {
    pub images: Vec<MediaReference>,
    pub videos: Vec<VideoRef>,
    pub text: String,
}

/// Value of `name` in a single serialized start tag.
pub fn tag_attr(tag: &str, name: &str) -> Option<String> {
    TAG_ATTR.captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string())
    })
}

fn dimension(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u32)
        .unwrap_or(0)
}

fn first_attr<'a>(el: &'a ElementRef<'_>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| el.value().attr(n))
        .find(|v| !v.trim().is_empty())
}

fn collect_structured_img(
    img: &ElementRef<'_>,
    originals: &[&str],
    keep_thumbnail: bool,
    config: &ResolverConfig,
    collector: &mut MediaCollector,
) {
    let token_url = img
        .value()
        .attr("data-original-token")
        .and_then(|t| no_watermark_url(&config.image_cdn_base, t));
    let original = first_attr(img, originals).unwrap_or_default();
    let Some(best) = token_url.or_else(|| canonicalize(original)) else {
        return;
    };
    let thumbnail = if keep_thumbnail {
        img.value()
            .attr("src")
            .and_then(normalize_url)
            .or_else(|| normalize_url(original))
    } else {
        None
    };
    collector.push_image(
        &best,
        thumbnail.as_deref(),
        dimension(img.value().attr("data-rawwidth")),
        dimension(img.value().attr("data-rawheight")),
    );
}

fn collect_videos(html: &str, document: &Html, collector: &mut MediaCollector) {
    for anchor in document.select(&VIDEO_BOX) {
        let id = anchor
            .value()
            .attr("data-lens-id")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let href = anchor.value().attr("href")?;
                VIDEO_HREF_ID
                    .captures(href)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            });
        if let Some(id) = id {
            collector.push_video(&id, anchor.value().attr("data-poster"));
        }
    }
    for caps in VIDEO_URL_ID.captures_iter(html) {
        if let Some(id) = caps.get(1) {
            collector.push_video(id.as_str(), None);
        }
    }
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child)
            && !TEXT_EXCLUDED.contains(&child_el.value().name())
        {
            collect_text(child_el, out);
        }
    }
}

/// Body text with media and script containers removed, whitespace collapsed.
pub fn text_content(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut out = String::new();
    collect_text(document.root_element(), &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Structured reader: `<figure>` images and images inside `<noscript>`.
pub fn structured_media(html: &str, config: &ResolverConfig) -> ContentMedia {
    let document = Html::parse_fragment(html);
    let mut collector = MediaCollector::new(&config.image_host_marker);

    for img in document.select(&FIGURE_IMG) {
        collect_structured_img(
            &img,
            &["data-original", "data-actualsrc", "src"],
            true,
            config,
            &mut collector,
        );
    }

    // Depending on the parser's scripting flag, <noscript> holds either
    // elements or a raw markup string; both shapes are read.
    for img in document.select(&NOSCRIPT_IMG) {
        collect_structured_img(&img, &["data-original", "src"], false, config, &mut collector);
    }
    for noscript in document.select(&NOSCRIPT) {
        let inner: String = noscript.text().collect();
        if !inner.contains("<img") {
            continue;
        }
        let inner_doc = Html::parse_fragment(&inner);
        for img in inner_doc.select(&IMG) {
            collect_structured_img(&img, &["data-original", "src"], false, config, &mut collector);
        }
    }

    collect_videos(html, &document, &mut collector);
    let (images, videos) = collector.into_parts();
    ContentMedia {
        images,
        videos,
        text: text_content(html),
    }
}

/// Layered reader over raw markup: image tags, stray token attributes,
/// stray original-source attributes, then bare image-host URLs.
pub fn layered_media(html: &str, config: &ResolverConfig) -> ContentMedia {
    let mut collector = MediaCollector::new(&config.image_host_marker);
    let mut seen_tokens: HashSet<String> = HashSet::new();

    let mut add_token = |token: &str, collector: &mut MediaCollector| {
        let token = token.trim();
        if token.is_empty() || !seen_tokens.insert(token.to_string()) {
            return;
        }
        if let Some(url) = no_watermark_url(&config.image_cdn_base, token) {
            collector.push_image(&url, None, 0, 0);
        }
    };

    for tag in IMG_TAG.find_iter(html).map(|m| m.as_str()) {
        let token = tag_attr(tag, "data-original-token").unwrap_or_default();
        let original = tag_attr(tag, "data-original")
            .or_else(|| tag_attr(tag, "data-actualsrc"))
            .or_else(|| tag_attr(tag, "src"))
            .unwrap_or_default();
        let best = no_watermark_url(&config.image_cdn_base, &token).or_else(|| canonicalize(&original));
        let thumbnail = tag_attr(tag, "src").unwrap_or_else(|| original.clone());
        if let Some(best) = best {
            collector.push_image(
                &best,
                Some(&thumbnail),
                dimension(tag_attr(tag, "data-rawwidth").as_deref()),
                dimension(tag_attr(tag, "data-rawheight").as_deref()),
            );
        }
        add_token(&token, &mut collector);
    }

    for caps in TOKEN_ATTR.captures_iter(html) {
        if let Some(token) = caps.get(1) {
            add_token(token.as_str(), &mut collector);
        }
    }

    for caps in ORIGINAL_ATTR.captures_iter(html) {
        if let Some(url) = caps.get(1) {
            collector.push_image(url.as_str(), None, 0, 0);
        }
    }

    let host_url = Regex::new(&format!(
        r#"(?i)https?://[^"'<>\s]*{}/[^"'<>\s]+"#,
        regex::escape(&config.image_host_marker)
    ));
    if let Ok(host_url) = host_url {
        for m in host_url.find_iter(html) {
            collector.push_image(m.as_str(), None, 0, 0);
        }
    }

    let document = Html::parse_fragment(html);
    collect_videos(html, &document, &mut collector);
    let (images, videos) = collector.into_parts();
    ContentMedia {
        images,
        videos,
        text: text_content(html),
    }
}
