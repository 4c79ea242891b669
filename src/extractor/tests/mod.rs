use std::fs;
use std::time::Duration;
use url::Url;

use crate::dom::StaticPage;
use crate::extractor::{ExtractorConfig, FallbackTier, extract_page};
use crate::upload::compress::tests::png_bytes;
use crate::upload::datauri;

fn fixture(name: &str) -> String {
    fs::read_to_string(format!("src/extractor/tests/fixtures/{name}"))
        .expect("Failed to read test fixture")
}

fn page(html: &str) -> StaticPage {
    StaticPage::new(Url::parse("https://docs.qq.com/doc/DAbc123").unwrap(), html)
}

fn fast_config() -> ExtractorConfig {
    ExtractorConfig {
        container_scroll_pause: Duration::ZERO,
        document_scroll_pause: Duration::ZERO,
        scroll_reset_pause: Duration::ZERO,
        image_load_timeout: Duration::from_millis(10),
        ..ExtractorConfig::default()
    }
}

#[tokio::test]
async fn test_extract_document_container() {
    let page = page(&fixture("doc.html")).with_resource("/img/chart.png", "image/png", png_bytes(6, 4));
    let doc = extract_page(&page, &fast_config()).await;

    assert_eq!(doc.title, "Release notes 2.4");
    assert!(doc.body_markup.contains("new import pipeline"));
    assert!(!doc.body_markup.contains("<script"));
    assert!(!doc.body_markup.contains("<style"));
    assert!(!doc.body_markup.contains("data-block-id"));
    assert!(!doc.body_markup.contains("File Edit View"));
    assert!(!doc.body_markup.contains("<canvas"));
    assert!(datauri::is_inline_image(&doc.cover_url));

    let diag = &doc.diagnostics;
    assert!(diag.has_body);
    assert!(diag.body_text_len > 50);
    assert_eq!(diag.img_count, 2);
    assert_eq!(diag.canvas_count, 0);
    assert_eq!(diag.img_tag_count, 2);
    assert!(diag.body_has_img_tag);
    assert_eq!(diag.fallback, FallbackTier::Container);
    assert_eq!(diag.url, "https://docs.qq.com/doc/DAbc123");
}

#[tokio::test]
async fn test_background_hero_becomes_inline_image() {
    let page = page(&fixture("hero.html")).with_resource("/img/hero.png", "image/png", png_bytes(16, 9));
    let doc = extract_page(&page, &fast_config()).await;

    assert_eq!(doc.title, "Launch week");
    assert_eq!(doc.diagnostics.fallback, FallbackTier::WholeBody);
    assert!(doc.body_markup.contains(r#"<img src="data:image/png;base64,"#));
    assert!(doc.body_markup.contains("Five days, five launches"));
    assert!(doc.cover_url.starts_with("data:image/png;base64,"));
    // the scored container itself had no media
    assert_eq!(doc.diagnostics.img_count, 0);
}

#[tokio::test]
async fn test_background_inside_container_is_inlined_in_place() {
    let html = r#"<article>
        <div class="banner" style="background-image:url(/img/hero.png)"></div>
        <p>Container text that is comfortably longer than the minimum.</p>
    </article>"#;
    let page = page(html).with_resource("/img/hero.png", "image/png", png_bytes(8, 8));
    let doc = extract_page(&page, &fast_config()).await;

    assert_eq!(doc.diagnostics.fallback, FallbackTier::Container);
    assert!(doc.body_markup.contains("background-image:none"));
    assert_eq!(doc.diagnostics.img_tag_count, 1);
}

#[tokio::test]
async fn test_unreachable_images_fall_back_to_gallery() {
    let html = r#"<head><title>Gallery - 腾讯文档</title></head><body>
        <main><p>Photos from the offsite, with captions below each one.</p></main>
        <section style="background-image:url(https://cdn.example.com/cover.jpg)"></section>
        <div class="reaction" data-src="https://cdn.example.com/emoji/smile.png"></div>
    </body>"#;
    let doc = extract_page(&page(html), &fast_config()).await;

    assert_eq!(doc.title, "Gallery");
    assert_eq!(doc.diagnostics.fallback, FallbackTier::RawScan);
    assert_eq!(doc.cover_url, "https://cdn.example.com/cover.jpg");
    assert!(doc.body_markup.starts_with("<p>Photos from the offsite"));
    assert!(doc.body_markup.contains("图片提取兜底结果"));
    assert!(!doc.body_markup.contains("smile.png"));
    assert_eq!(doc.diagnostics.img_tag_count, 1);
}

#[tokio::test]
async fn test_empty_page_is_not_an_error() {
    let doc = extract_page(&page(&fixture("empty.html")), &fast_config()).await;

    assert!(!doc.has_content());
    assert!(!doc.diagnostics.has_body);
    assert_eq!(doc.diagnostics.body_text_len, 0);
    assert!(!doc.diagnostics.body_has_img_tag);
}

#[tokio::test]
async fn test_malformed_html() {
    let html = "<html><head><title>Broken</title><body><article><p>Unclosed tags<div>More content that keeps going";
    let doc = extract_page(&page(html), &fast_config()).await;

    assert_eq!(doc.title, "Broken");
    assert!(doc.body_markup.contains("Unclosed tags"));
}

#[test]
fn test_serialized_shape() {
    let doc = crate::extractor::ExtractedDocument {
        title: "t".into(),
        body_markup: "<p>b</p>".into(),
        ..Default::default()
    };
    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["bodyHtml"], "<p>b</p>");
    assert_eq!(json["coverUrl"], "");
    assert_eq!(json["_debug"]["fallback"], "container");
    assert_eq!(json["_debug"]["hasBody"], false);
}

#[cfg(feature = "fuzz")]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_extract_never_panics(html in ".*") {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let doc = rt.block_on(extract_page(&page(&html), &fast_config()));
            prop_assert!(!doc.body_markup.contains("<script"));
        }
    }
}
