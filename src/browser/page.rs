use async_trait::async_trait;
use bytes::Bytes;
use kuchiki::NodeRef;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::dom;
use crate::fetcher::FetchError;
use crate::upload::datauri;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutBox {
    pub width: f64,
    pub height: f64,
}

impl LayoutBox {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedStyle {
    pub display: Option<String>,
    pub visibility: Option<String>,
    pub background_image: Option<String>,
}

impl ComputedStyle {
    pub fn is_hidden(&self) -> bool {
        self.display
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("none"))
            || self
                .visibility
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case("hidden"))
    }
}

#[derive(Debug, Clone)]
pub enum ScrollTarget {
    Document,
    Element(NodeRef),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_height: f64,
    pub client_height: f64,
}

/// Intrinsic size of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    pub natural_width: u32,
    pub natural_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Include,
    Omit,
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    pub credentials: Credentials,
    pub headers: Vec<(String, String)>,
}

impl PageRequest {
    /// Same-origin style request that carries the page's session.
    pub fn with_session(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: Credentials::Include,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct PageFetch {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl PageFetch {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Encodes the body as a `data:` URI, sniffing the type when the header is absent.
    pub fn to_data_uri(&self) -> Option<String> {
        if !self.is_success() || self.body.is_empty() {
            return None;
        }
        Some(datauri::encode(self.content_type.as_deref(), &self.body))
    }
}

/// One frame of a loaded page, as seen by content-side logic.
///
/// Implementations are single-threaded: the document handle is an
/// `Rc`-based tree and must never cross threads.
#[async_trait(?Send)]
pub trait PageContext {
    fn document(&self) -> NodeRef;

    fn url(&self) -> Url;

    fn title(&self) -> String {
        dom::select_first(&self.document(), "title")
            .map(|t| t.text_contents().trim().to_string())
            .unwrap_or_default()
    }

    /// Rendered box, or `None` when the node takes no part in layout.
    fn layout(&self, node: &NodeRef) -> Option<LayoutBox>;

    fn computed_style(&self, node: &NodeRef) -> ComputedStyle;

    fn scroll_metrics(&self, target: &ScrollTarget) -> ScrollMetrics;

    async fn scroll_to(&self, target: &ScrollTarget, y: f64);

    /// The source the browser actually picked for an image, if known.
    fn current_source(&self, _img: &NodeRef) -> Option<String> {
        None
    }

    /// Waits until the image has loaded or errored. `None` on error or timeout.
    async fn wait_for_image(&self, img: &NodeRef, timeout: Duration) -> Option<ImageState>;

    /// Exports a canvas, or draws a loaded image onto one, as a `data:` URI.
    /// `None` when the pixels are tainted or there is nothing to draw.
    async fn rasterize(&self, node: &NodeRef) -> Option<String>;

    async fn fetch(&self, request: PageRequest) -> Result<PageFetch, FetchError>;
}
