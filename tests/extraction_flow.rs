mod helpers;

use contentshare::{
    TransferError,
    error::MSG_EMPTY_PAGE,
    extractor::{ExtractError, FallbackTier},
    orchestrator::{Orchestrator, screenshot::SCREENSHOT_ONLY_INTRO},
    upload::datauri,
};
use helpers::{FakeBrowser, fast_extractor, fast_orchestrator, png_bytes};

const DOC_URL: &str = "https://docs.qq.com/doc/DRetry";

fn loading_frame() -> String {
    "<html><body><article>loading...</article></body></html>".to_string()
}

fn article_frame(text_len: usize) -> String {
    format!(
        "<html><head><title>周报</title></head><body><article><p>{}</p></article></body></html>",
        "字".repeat(text_len)
    )
}

#[tokio::test]
async fn test_content_accepted_on_fourth_attempt() {
    let browser = FakeBrowser::new().with_steps(
        DOC_URL,
        vec![
            vec![loading_frame()],
            vec![loading_frame()],
            vec![loading_frame()],
            vec![article_frame(200)],
        ],
    );
    let config = fast_orchestrator();
    let extractor = fast_extractor();
    let orchestrator = Orchestrator::new(&browser, &config, &extractor);

    let doc = orchestrator.extract_url(DOC_URL).await.unwrap();

    assert!(doc.diagnostics.body_text_len > 50);
    assert!(doc.body_markup.contains(&"字".repeat(200)));
    // accepted without images, so the page is also captured
    assert_eq!(doc.diagnostics.screenshot_count, 2);
    assert!(doc.cover_url.starts_with("data:image/jpeg"));
    assert!(browser.frame_calls() >= 4);
    assert!(browser.open_tabs().is_empty());
    assert_eq!(browser.closed_tabs(), vec![1]);
}

#[tokio::test]
async fn test_frame_with_image_wins() {
    let image = datauri::encode(Some("image/png"), &png_bytes(60, 40));
    let with_image = format!(
        r#"<html><body><article><p>{}</p><img src="{image}" alt="chart"></article></body></html>"#,
        "图".repeat(60)
    );
    let browser = FakeBrowser::new().with_steps(DOC_URL, vec![vec![article_frame(300), with_image]]);
    let config = fast_orchestrator();
    let extractor = fast_extractor();

    let doc = Orchestrator::new(&browser, &config, &extractor)
        .extract_url(DOC_URL)
        .await
        .unwrap();

    assert!(doc.diagnostics.body_has_img_tag);
    assert_eq!(doc.diagnostics.body_text_len, 60);
    assert_eq!(doc.diagnostics.screenshot_count, 0);
    assert_eq!(browser.frame_calls(), 1);
}

#[tokio::test]
async fn test_empty_page_falls_back_to_screenshots() {
    let browser = FakeBrowser::new().with_page(DOC_URL, &loading_frame());
    let config = fast_orchestrator();
    let extractor = fast_extractor();

    let doc = Orchestrator::new(&browser, &config, &extractor)
        .extract_url(DOC_URL)
        .await
        .unwrap();

    assert_eq!(doc.diagnostics.fallback, FallbackTier::ScreenshotOnly);
    assert!(doc.body_markup.starts_with(SCREENSHOT_ONLY_INTRO));
    assert!(doc.body_markup.contains("<p>截图 1</p>"));
    assert!(browser.open_tabs().is_empty());
}

#[tokio::test]
async fn test_empty_page_without_capture_fails() {
    let browser = FakeBrowser::new()
        .with_page(DOC_URL, &loading_frame())
        .without_capture();
    let config = fast_orchestrator();
    let extractor = fast_extractor();

    let err = Orchestrator::new(&browser, &config, &extractor)
        .extract_url(DOC_URL)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::EmptyPage));
    assert_eq!(TransferError::from(err).message(), MSG_EMPTY_PAGE);
    assert!(browser.open_tabs().is_empty());
}

#[tokio::test]
async fn test_tab_that_never_loads_is_closed() {
    let browser = FakeBrowser::new().with_page(DOC_URL, &article_frame(100)).stalled();
    let config = fast_orchestrator();
    let extractor = fast_extractor();

    let err = Orchestrator::new(&browser, &config, &extractor)
        .extract_url(DOC_URL)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Browser(_)));
    assert_eq!(TransferError::from(err).kind(), "NetworkOrPageError");
    assert!(browser.open_tabs().is_empty());
    assert_eq!(browser.frame_calls(), 0);
}
