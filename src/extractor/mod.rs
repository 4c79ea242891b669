//! Page-side extraction of a title, cover and self-contained body.
//!
//! Everything here runs against a [`PageContext`] and never reaches outside
//! it, so the same code drives a live frame or a [`crate::dom::StaticPage`].

pub mod cleaner;
pub mod fallback;
pub mod inline;
pub mod lazyload;
pub mod model;
pub mod reader;

#[cfg(test)]
mod tests;

pub use model::{Diagnostics, ExtractedDocument, ExtractorConfig, FallbackTier};

use kuchiki::NodeRef;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::browser::{BrowserError, PageContext};
use crate::dom;
use crate::error::{MSG_EMPTY_PAGE, MSG_RETRIES_EXHAUSTED, TransferError};

const COVER_SELECTOR: &str = r#"img[src^="data:"], img[src^="http"]"#;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Every attempt came back without text or title and no screenshot could be taken.
    #[error("page is empty and no screenshot could be captured")]
    EmptyPage,

    /// No attempt produced a result and no screenshot could be taken.
    #[error("no extraction attempt produced a result")]
    RetriesExhausted,

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl From<ExtractError> for TransferError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::EmptyPage => TransferError::NoContentFound(MSG_EMPTY_PAGE.to_string()),
            ExtractError::RetriesExhausted => {
                TransferError::NoContentFound(MSG_RETRIES_EXHAUSTED.to_string())
            }
            ExtractError::Browser(err) => err.into(),
        }
    }
}

fn first_cover(root: &NodeRef) -> Option<String> {
    dom::select_first(root, COVER_SELECTOR).and_then(|img| dom::non_empty_attr(&img, "src"))
}

/// Scrolls, inlines and sanitizes `root`, returning its captured markup.
async fn capture(page: &dyn PageContext, root: &NodeRef, config: &ExtractorConfig) -> String {
    lazyload::materialize(page, root, config).await;
    inline::inline_media(page, root, config).await;
    cleaner::sanitize(&dom::inner_html(root), &config.tracking_attributes)
}

/// Extracts the document shown in one frame.
///
/// Tiers run until the body carries an image: the scored container, then
/// the whole document body, then a raw scan for image URLs appended as a
/// gallery. Never fails; an empty document is a valid answer that the
/// caller's retry loop judges through its diagnostics.
#[instrument(skip_all, fields(url = %page.url()))]
pub async fn extract_page(page: &dyn PageContext, config: &ExtractorConfig) -> ExtractedDocument {
    let title = reader::find_title(page, config);
    let mut body = String::new();
    let mut cover = String::new();
    let mut diagnostics = Diagnostics {
        url: page.url().to_string(),
        ..Diagnostics::default()
    };

    if let Some(container) = reader::find_body_container(page, config) {
        body = capture(page, &container, config).await;
        cover = first_cover(&container).unwrap_or_default();
        diagnostics.has_body = true;
        diagnostics.body_text_len = dom::trimmed_len(&container.text_contents());
        diagnostics.img_count = dom::select_all(&container, "img").len();
        diagnostics.canvas_count = dom::select_all(&container, "canvas").len();
    }

    if !dom::has_img_tag(&body)
        && let Some(doc_body) = dom::body_of(&page.document())
    {
        let whole = capture(page, &doc_body, config).await;
        if dom::has_img_tag(&whole) {
            debug!("container had no images, using the whole body");
            body = whole;
            diagnostics.fallback = FallbackTier::WholeBody;
            if cover.is_empty() {
                cover = first_cover(&doc_body).unwrap_or_default();
            }
        }
    }

    if !dom::has_img_tag(&body) {
        let urls = fallback::scan_image_urls(page, &config.chrome_image_markers, config.gallery_cap);
        if let Some(first) = urls.first() {
            debug!(found = urls.len(), "appending scanned images");
            if cover.is_empty() {
                cover = first.clone();
            }
            body = fallback::append_gallery(&body, &urls);
            diagnostics.fallback = FallbackTier::RawScan;
        }
    }

    diagnostics.body_has_img_tag = dom::has_img_tag(&body);
    diagnostics.img_tag_count = dom::count_img_tags(&body);
    info!(
        text_len = diagnostics.body_text_len,
        images = diagnostics.img_tag_count,
        fallback = ?diagnostics.fallback,
        "page extracted"
    );

    ExtractedDocument {
        title,
        cover_url: cover,
        body_markup: body,
        diagnostics,
    }
}
