//! Last-resort image discovery when no `<img>` survived extraction.

use kuchiki::NodeRef;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::browser::PageContext;
use crate::dom;
use crate::extractor::inline::SOURCE_ATTRIBUTES;

static IMAGE_URL_IN_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^"'<>\s]+?\.(?:png|jpe?g|gif|webp|bmp|svg)(?:\?[^"'<>\s]*)?"#).unwrap()
});
static IMAGE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:png|jpe?g|gif|webp|bmp|svg)(?:[?#]|$)").unwrap());

pub const GALLERY_HEADING: &str = "图片提取兜底结果：";

/// Insertion-ordered set of candidate URLs.
#[derive(Debug, Default)]
struct Candidates {
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl Candidates {
    fn push(&mut self, raw: &str) {
        if let Some(url) = normalize_candidate(raw)
            && self.seen.insert(url.clone())
        {
            self.urls.push(url);
        }
    }
}

/// Strips quotes, upgrades protocol-relative and plain-http URLs to https.
pub fn normalize_candidate(raw: &str) -> Option<String> {
    let url = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if url.is_empty() {
        return None;
    }
    if let Some(rest) = url.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if let Some(rest) = url.strip_prefix("http://") {
        return Some(format!("https://{rest}"));
    }
    Some(url.to_string())
}

/// Inline payloads, or http(s)/blob URLs that do not look like page chrome.
pub fn is_likely_content_image(url: &str, chrome_markers: &[String]) -> bool {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return true;
    }
    if !(lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("blob:")) {
        return false;
    }
    !chrome_markers.iter().any(|m| lower.contains(m.as_str()))
}

fn has_image_extension(url: &str) -> bool {
    IMAGE_EXTENSION.is_match(url)
}

/// Image URLs found in `root`: image sources, lazy-load attributes on any
/// element, image-looking `src`/`href` values, and CSS backgrounds.
pub fn collect_from_dom(page: &dyn PageContext, root: &NodeRef) -> Vec<String> {
    let mut out = Candidates::default();

    for img in dom::select_all(root, "img") {
        for attr in SOURCE_ATTRIBUTES {
            if let Some(v) = dom::non_empty_attr(&img, attr) {
                out.push(&v);
            }
        }
        if let Some(current) = page.current_source(&img) {
            out.push(&current);
        }
    }

    for el in dom::select_all(root, "*") {
        if dom::is_tag(&el, "img") {
            continue;
        }
        for attr in SOURCE_ATTRIBUTES.iter().copied().chain(["href"]) {
            let Some(v) = dom::non_empty_attr(&el, attr) else {
                continue;
            };
            // `src` and `href` on other elements point at scripts, frames
            // and pages unless the URL itself names an image.
            if matches!(attr, "src" | "href") && !has_image_extension(&v) {
                continue;
            }
            out.push(&v);
        }
        if let Some(url) = page
            .computed_style(&el)
            .background_image
            .as_deref()
            .and_then(dom::style::css_url)
        {
            out.push(&url);
        }
    }
    out.urls
}

/// Absolute image URLs with a known image extension in serialized markup.
pub fn collect_from_source(html: &str) -> Vec<String> {
    let mut out = Candidates::default();
    for m in IMAGE_URL_IN_SOURCE.find_iter(html) {
        out.push(m.as_str());
    }
    out.urls
}

/// Merged, filtered and capped candidate list from both scans.
pub fn scan_image_urls(
    page: &dyn PageContext,
    chrome_markers: &[String],
    cap: usize,
) -> Vec<String> {
    let doc = page.document();
    let root = dom::body_of(&doc).unwrap_or_else(|| doc.clone());
    let mut merged = Candidates::default();
    for url in collect_from_dom(page, &root)
        .into_iter()
        .chain(collect_from_source(&doc.to_string()))
    {
        merged.push(&url);
    }
    merged
        .urls
        .into_iter()
        .filter(|u| is_likely_content_image(u, chrome_markers))
        .take(cap)
        .collect()
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Appends the URLs to `body` as a visible gallery.
pub fn append_gallery(body: &str, urls: &[String]) -> String {
    let gallery: String = urls
        .iter()
        .map(|u| format!(r#"<p><img src="{}" /></p>"#, escape_attr(u)))
        .collect();
    let body = if body.trim().is_empty() { "<p></p>" } else { body };
    format!("{body}<hr/><p>{GALLERY_HEADING}</p>{gallery}")
}
