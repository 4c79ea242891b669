//! A `PageContext` over a parsed HTML string.
//!
//! There is no layout engine, so rendering facts come from markup:
//! - boxes come from inline `width`/`height` (or the attributes), else 640x32;
//! - `data-scroll-height` on an element (or `<body>` for the document) sets
//!   its scroll height;
//! - `data-natural-width`/`data-natural-height` mark an image as loaded;
//! - `data-current-src` is the source the browser picked;
//! - `data-canvas` holds the bitmap of a `<canvas>` as a `data:` URI;
//! - `data-tainted` makes an image unreadable to rasterization.
//!
//! Fetches are answered from registered resources first, then by the optional
//! HTTP client.

use async_trait::async_trait;
use bytes::Bytes;
use kuchiki::NodeRef;
use reqwest::Client;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::browser::{
    ComputedStyle, ImageState, LayoutBox, PageContext, PageFetch, PageRequest, ScrollMetrics,
    ScrollTarget,
};
use crate::dom::{self, style};
use crate::fetcher::FetchError;
use crate::upload::datauri;

pub const DEFAULT_BOX: LayoutBox = LayoutBox {
    width: 640.0,
    height: 32.0,
};
const VIEWPORT_HEIGHT: f64 = 800.0;

#[derive(Debug, Clone)]
struct Resource {
    content_type: Option<String>,
    body: Bytes,
}

pub struct StaticPage {
    url: Url,
    document: NodeRef,
    resources: HashMap<String, Resource>,
    client: Option<Client>,
    scrolls: RefCell<Vec<f64>>,
}

impl StaticPage {
    pub fn new(url: Url, html: &str) -> Self {
        Self {
            url,
            document: dom::parse_document(html),
            resources: HashMap::new(),
            client: None,
            scrolls: RefCell::new(Vec::new()),
        }
    }

    /// Registers a response for `url` (resolved against the page URL).
    pub fn with_resource(mut self, url: &str, content_type: &str, body: impl Into<Bytes>) -> Self {
        let key = self.absolute(url).unwrap_or_else(|| url.to_string());
        self.resources.insert(
            key,
            Resource {
                content_type: Some(content_type.to_string()),
                body: body.into(),
            },
        );
        self
    }

    /// Lets unregistered fetches go to the network.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Every scroll position requested so far, in order.
    pub fn scroll_log(&self) -> Vec<f64> {
        self.scrolls.borrow().clone()
    }

    fn absolute(&self, url: &str) -> Option<String> {
        if datauri::is_data_uri(url) {
            return Some(url.to_string());
        }
        self.url.join(url).ok().map(|u| u.to_string())
    }

    fn resource(&self, url: &str) -> Option<&Resource> {
        self.resources.get(&self.absolute(url)?)
    }

    /// Bytes behind an image source: an inline payload or a registered resource.
    fn image_bytes(&self, src: &str) -> Option<(Option<String>, Bytes)> {
        if datauri::is_data_uri(src) {
            let data = datauri::parse(src).ok()?;
            return Some((Some(data.mime), data.bytes));
        }
        let res = self.resource(src)?;
        Some((res.content_type.clone(), res.body.clone()))
    }

    fn effective_src(img: &NodeRef) -> Option<String> {
        dom::non_empty_attr(img, "data-current-src").or_else(|| dom::non_empty_attr(img, "src"))
    }
}

fn natural_size(img: &NodeRef) -> Option<ImageState> {
    let width = dom::attr(img, "data-natural-width")?.trim().parse().ok()?;
    let height = dom::attr(img, "data-natural-height")?.trim().parse().ok()?;
    Some(ImageState {
        natural_width: width,
        natural_height: height,
    })
}

fn decoded_size(bytes: &[u8]) -> Option<ImageState> {
    let img = image::load_from_memory(bytes).ok()?;
    Some(ImageState {
        natural_width: img.width(),
        natural_height: img.height(),
    })
}

#[async_trait(?Send)]
impl PageContext for StaticPage {
    fn document(&self) -> NodeRef {
        self.document.clone()
    }

    fn url(&self) -> Url {
        self.url.clone()
    }

    fn layout(&self, node: &NodeRef) -> Option<LayoutBox> {
        style::rendered_box(node, DEFAULT_BOX)
    }

    fn computed_style(&self, node: &NodeRef) -> ComputedStyle {
        style::computed_style(node)
    }

    fn scroll_metrics(&self, target: &ScrollTarget) -> ScrollMetrics {
        let declared = |node: &NodeRef| {
            dom::attr(node, "data-scroll-height").and_then(|v| v.trim().parse::<f64>().ok())
        };
        match target {
            ScrollTarget::Document => {
                let body = dom::body_of(&self.document);
                let height = body.as_ref().and_then(declared).unwrap_or(VIEWPORT_HEIGHT);
                ScrollMetrics {
                    scroll_height: height,
                    client_height: VIEWPORT_HEIGHT,
                }
            }
            ScrollTarget::Element(node) => {
                let client = self.layout(node).map_or(0.0, |b| b.height);
                ScrollMetrics {
                    scroll_height: declared(node).unwrap_or(client),
                    client_height: client,
                }
            }
        }
    }

    async fn scroll_to(&self, _target: &ScrollTarget, y: f64) {
        self.scrolls.borrow_mut().push(y);
        tokio::task::yield_now().await;
    }

    fn current_source(&self, img: &NodeRef) -> Option<String> {
        dom::non_empty_attr(img, "data-current-src")
    }

    async fn wait_for_image(&self, img: &NodeRef, _timeout: Duration) -> Option<ImageState> {
        if let Some(state) = natural_size(img) {
            return Some(state);
        }
        let src = Self::effective_src(img)?;
        let (_, bytes) = self.image_bytes(&src)?;
        decoded_size(&bytes)
    }

    async fn rasterize(&self, node: &NodeRef) -> Option<String> {
        if dom::is_tag(node, "canvas") {
            return dom::non_empty_attr(node, "data-canvas");
        }
        if dom::has_attr(node, "data-tainted") {
            return None;
        }
        let src = Self::effective_src(node)?;
        let (content_type, bytes) = self.image_bytes(&src)?;
        decoded_size(&bytes)?;
        Some(datauri::encode(content_type.as_deref(), &bytes))
    }

    async fn fetch(&self, request: PageRequest) -> Result<PageFetch, FetchError> {
        if let Some(res) = self.resource(&request.url) {
            return Ok(PageFetch {
                status: 200,
                content_type: res.content_type.clone(),
                body: res.body.clone(),
            });
        }
        let Some(client) = &self.client else {
            debug!(url = %request.url, "no resource registered");
            return Ok(PageFetch {
                status: 404,
                content_type: None,
                body: Bytes::new(),
            });
        };
        let url = self.url.join(&request.url)?;
        let mut builder = client.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;
        Ok(PageFetch {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> StaticPage {
        StaticPage::new(Url::parse("https://docs.example.com/doc/1").unwrap(), html)
    }

    #[tokio::test]
    async fn fetch_answers_from_registered_resources() {
        let page = page("<p>x</p>").with_resource("/api/a", "application/json", r#"{"a":1}"#);
        let hit = page
            .fetch(PageRequest::with_session("https://docs.example.com/api/a"))
            .await
            .unwrap();
        assert!(hit.is_success());
        let miss = page.fetch(PageRequest::with_session("/api/b")).await.unwrap();
        assert_eq!(miss.status, 404);
    }

    #[tokio::test]
    async fn tainted_images_cannot_be_rasterized() {
        let png = crate::upload::compress::tests::png_bytes(4, 4);
        let page = page(r#"<img id="a" src="/a.png"><img id="b" data-tainted src="/a.png">"#)
            .with_resource("/a.png", "image/png", png);
        let doc = page.document();
        let a = dom::select_first(&doc, "#a").unwrap();
        let b = dom::select_first(&doc, "#b").unwrap();
        assert!(page.rasterize(&a).await.unwrap().starts_with("data:image/png;base64,"));
        assert!(page.rasterize(&b).await.is_none());
        assert_eq!(
            page.wait_for_image(&a, Duration::from_millis(1)).await,
            Some(ImageState {
                natural_width: 4,
                natural_height: 4
            })
        );
    }

    #[test]
    fn layout_follows_hidden_ancestors() {
        let page = page(r#"<div style="display:none"><p id="x">t</p></div><p id="y" style="height:90px">t</p>"#);
        let doc = page.document();
        assert!(page.layout(&dom::select_first(&doc, "#x").unwrap()).is_none());
        let y = page.layout(&dom::select_first(&doc, "#y").unwrap()).unwrap();
        assert_eq!((y.width, y.height), (640.0, 90.0));
    }

    #[test]
    fn document_scroll_height_comes_from_body() {
        let page = page(r#"<body data-scroll-height="3000"><p>x</p></body>"#);
        let m = page.scroll_metrics(&ScrollTarget::Document);
        assert_eq!((m.scroll_height, m.client_height), (3000.0, VIEWPORT_HEIGHT));
    }
}
