use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which extraction tier produced the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    /// The scored container.
    #[default]
    Container,
    /// The whole document body, after the container had no images.
    WholeBody,
    /// Image URLs scanned from attributes and markup, appended as a gallery.
    RawScan,
    /// Only page screenshots were available.
    ScreenshotOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub has_body: bool,
    pub body_text_len: usize,
    pub img_count: usize,
    pub canvas_count: usize,
    pub body_has_img_tag: bool,
    pub img_tag_count: usize,
    pub fallback: FallbackTier,
    pub screenshot_count: usize,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub title: String,
    pub cover_url: String,
    #[serde(rename = "bodyHtml")]
    pub body_markup: String,
    #[serde(rename = "_debug")]
    pub diagnostics: Diagnostics,
}

impl ExtractedDocument {
    pub fn has_content(&self) -> bool {
        !self.body_markup.trim().is_empty() || !self.title.trim().is_empty()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Heuristic tables and timings of the page extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    /// Most to least specific.
    pub title_selectors: Vec<String>,
    pub body_selectors: Vec<String>,
    /// Removed from the page title when no title element matches.
    pub title_suffix_pattern: String,
    pub max_title_chars: usize,
    pub min_container_text: usize,
    pub image_weight: f64,
    pub area_divisor: f64,
    pub area_cap: f64,
    pub container_scroll_pause: Duration,
    pub document_scroll_pause: Duration,
    pub scroll_reset_pause: Duration,
    pub image_load_timeout: Duration,
    /// Editor bookkeeping attributes stripped from captured markup.
    pub tracking_attributes: Vec<String>,
    /// URL substrings that mark an image as page chrome.
    pub chrome_image_markers: Vec<String>,
    pub gallery_cap: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            title_selectors: strings(&[
                r#"[class*="doc-title"]"#,
                r#"[class*="allInOne-title"]"#,
                r#"[class*="aio-title"]"#,
                r#"h1[class*="title"]"#,
                ".header-title",
                "h1",
                r#"[class*="title"]"#,
            ]),
            body_selectors: strings(&[
                r#"[class*="doc-content"]"#,
                r#"[class*="allInOne-content"]"#,
                r#"[class*="aio-content"]"#,
                r#"[class*="document-content"]"#,
                r#"[class*="read-only"]"#,
                r#"[class*="editor-content"]"#,
                r#"[class*="ql-editor"]"#,
                r#"[class*="ProseMirror"]"#,
                "[contenteditable]",
                "main",
                "article",
                r#"[class*="content"]"#,
                r#"[class*="editor"]"#,
                r#"[class*="doc-body"]"#,
            ]),
            title_suffix_pattern: r"(?i)\s*[-|–—]\s*(腾讯文档|QQ文档|docs\.qq\.com).*$".to_string(),
            max_title_chars: 200,
            min_container_text: 20,
            image_weight: 800.0,
            area_divisor: 500.0,
            area_cap: 5000.0,
            container_scroll_pause: Duration::from_millis(180),
            document_scroll_pause: Duration::from_millis(120),
            scroll_reset_pause: Duration::from_millis(300),
            image_load_timeout: Duration::from_millis(1500),
            tracking_attributes: strings(&["data-record-id", "data-block-id", "data-reactid"]),
            chrome_image_markers: strings(&["icon", "avatar", "logo", "emoji"]),
            gallery_cap: 20,
        }
    }
}
