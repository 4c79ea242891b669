//! Turns images, canvases and CSS backgrounds into self-contained `<img>` tags.

use kuchiki::NodeRef;
use tracing::{debug, instrument};

use crate::browser::{PageContext, PageRequest};
use crate::dom::{self, style::InlineStyle};
use crate::extractor::model::ExtractorConfig;
use crate::upload::datauri;

/// Attributes lazy loaders keep the real source in, after `src`.
pub const SOURCE_ATTRIBUTES: [&str; 5] = ["src", "data-src", "data-original", "data-origin", "data-actualsrc"];
const CLEARED_ATTRIBUTES: [&str; 6] = ["srcset", "loading", "data-src", "data-original", "data-origin", "data-actualsrc"];
const BACKGROUND_IMG_STYLE: &str = "max-width:100%;display:block;margin:8px 0;";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStats {
    pub images: usize,
    pub canvases: usize,
    pub backgrounds: usize,
}

/// Effective source of an image: markup attributes first, then what the
/// browser resolved.
pub fn resolve_image_source(page: &dyn PageContext, img: &NodeRef) -> Option<String> {
    SOURCE_ATTRIBUTES
        .iter()
        .find_map(|a| dom::non_empty_attr(img, a))
        .or_else(|| page.current_source(img))
}

/// Credentialed fetch of a resource, encoded as a `data:` URI.
pub async fn fetch_as_data_uri(page: &dyn PageContext, src: &str) -> Option<String> {
    match page.fetch(PageRequest::with_session(src)).await {
        Ok(response) => response.to_data_uri(),
        Err(err) => {
            debug!(src, error = %err, "resource fetch failed");
            None
        }
    }
}

async fn inline_image(page: &dyn PageContext, img: &NodeRef, config: &ExtractorConfig) -> bool {
    let Some(src) = resolve_image_source(page, img) else {
        return false;
    };
    if datauri::is_data_uri(&src) {
        return false;
    }
    if dom::non_empty_attr(img, "src").is_none() {
        dom::set_attr(img, "src", &src);
    }

    let loaded = page
        .wait_for_image(img, config.image_load_timeout)
        .await
        .filter(|s| s.natural_width > 0 && s.natural_height > 0);
    let mut data = match loaded {
        Some(_) => page.rasterize(img).await,
        None => None,
    };
    if data.is_none() {
        data = fetch_as_data_uri(page, &src).await;
    }
    let Some(data) = data else {
        debug!(src, "image left as remote reference");
        return false;
    };

    dom::set_attr(img, "src", &data);
    for attr in CLEARED_ATTRIBUTES {
        dom::remove_attr(img, attr);
    }
    true
}

async fn inline_canvas(page: &dyn PageContext, canvas: &NodeRef) -> bool {
    let Some(data) = page.rasterize(canvas).await else {
        return false;
    };
    let img = dom::new_element_with("img", &[("src", &data)]);
    if let Some(layout) = page.layout(canvas) {
        let mut style = InlineStyle::default();
        if layout.width > 0.0 {
            style.set("width", &format!("{}px", layout.width.round()));
        }
        if layout.height > 0.0 {
            style.set("height", &format!("{}px", layout.height.round()));
        }
        if !style.is_empty() {
            style.apply(&img);
        }
    }
    dom::replace_node(canvas, img);
    true
}

async fn inline_background(page: &dyn PageContext, el: &NodeRef) -> bool {
    let Some(url) = page
        .computed_style(el)
        .background_image
        .as_deref()
        .and_then(dom::style::css_url)
    else {
        return false;
    };
    let data = if datauri::is_data_uri(&url) {
        Some(url)
    } else {
        fetch_as_data_uri(page, &url).await
    };
    let Some(data) = data else {
        return false;
    };

    let img = dom::new_element_with("img", &[("src", &data), ("style", BACKGROUND_IMG_STYLE)]);
    let mut style = InlineStyle::of(el);
    style.set("background-image", "none");
    style.apply(el);
    el.prepend(img);
    true
}

/// Inlines every image, canvas and background image under `root`.
#[instrument(skip_all)]
pub async fn inline_media(page: &dyn PageContext, root: &NodeRef, config: &ExtractorConfig) -> InlineStats {
    let mut stats = InlineStats::default();

    for img in dom::select_all(root, "img") {
        if inline_image(page, &img, config).await {
            stats.images += 1;
        }
    }

    for canvas in dom::select_all(root, "canvas") {
        if inline_canvas(page, &canvas).await {
            stats.canvases += 1;
        }
    }

    for el in dom::select_all(root, "*") {
        if inline_background(page, &el).await {
            stats.backgrounds += 1;
        }
    }

    debug!(?stats, "media inlined");
    stats
}
