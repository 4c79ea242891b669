//! Turns image URLs that only load inside a source document into `data:` payloads.
//!
//! Each URL is fetched with the document's session first. Whatever still
//! fails is matched against the images the document actually renders.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::browser::{BrowserError, PageContext, PageRequest, ScrollTarget, TabLease};
use crate::dom;
use crate::orchestrator::Orchestrator;
use crate::upload::datauri;

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub min_step: f64,
    pub step_ratio: f64,
    pub scroll_pause: Duration,
    pub reset_pause: Duration,
    /// Smallest natural width and height worth harvesting.
    pub min_natural_size: u32,
    pub max_images: usize,
    pub image_wait: Duration,
    /// Largest `|Δw|+|Δh|` accepted when matching by size.
    pub max_size_distance: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            min_step: 300.0,
            step_ratio: 0.9,
            scroll_pause: Duration::from_millis(120),
            reset_pause: Duration::from_millis(250),
            min_natural_size: 40,
            max_images: 80,
            image_wait: Duration::from_millis(1500),
            max_size_distance: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertConfig {
    pub convert_limit: usize,
    pub auto_import_limit: usize,
    /// Source documents whose own tab is reused or opened for conversion.
    pub source_origins: Vec<String>,
    /// Context opened when the source document is not one of `source_origins`.
    pub default_context_url: String,
    pub context_settle: Duration,
    pub harvest: HarvestConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            convert_limit: 12,
            auto_import_limit: 30,
            source_origins: vec!["https://docs.qq.com/".to_string()],
            default_context_url: "https://docs.qq.com/".to_string(),
            context_settle: Duration::from_millis(1200),
            harvest: HarvestConfig::default(),
        }
    }
}

impl ConvertConfig {
    fn known_origin(&self, url: &str) -> Option<&str> {
        self.source_origins
            .iter()
            .find(|o| url.starts_with(o.as_str()))
            .map(String::as_str)
    }
}

/// An image the source document rendered, with its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub src: String,
    /// Origin and path, without query or fragment.
    pub normalized: String,
    pub data: String,
    pub width: u32,
    pub height: u32,
    pub query_width: u32,
    pub query_height: u32,
}

impl RenderedImage {
    fn dedupe_key(&self) -> String {
        format!("{}|{}x{}", self.normalized, self.width, self.height)
    }

    fn effective_size(&self) -> (u32, u32) {
        let w = if self.width > 0 { self.width } else { self.query_width };
        let h = if self.height > 0 { self.height } else { self.query_height };
        (w, h)
    }
}

/// `origin + path` of `url`, or the part before `?`/`#` when it does not parse.
pub fn normalize_image_url(url: &str, base: Option<&Url>) -> String {
    let parsed = match base {
        Some(base) => base.join(url),
        None => Url::parse(url),
    };
    match parsed {
        Ok(u) if u.has_host() => format!("{}{}", u.origin().ascii_serialization(), u.path()),
        _ => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

/// The `w`/`h` query parameters, zero when absent or unparsable.
pub fn query_size(url: &str, base: Option<&Url>) -> (u32, u32) {
    let parsed = match base {
        Some(base) => base.join(url),
        None => Url::parse(url),
    };
    let Ok(u) = parsed else {
        return (0, 0);
    };
    let param = |name: &str| {
        u.query_pairs()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse::<f64>().ok())
            .map_or(0, |v| v.max(0.0) as u32)
    };
    (param("w"), param("h"))
}

/// `data:` payload of `url` fetched with the page's session.
async fn fetch_in_page(page: &dyn PageContext, url: &str) -> Option<String> {
    match page.fetch(PageRequest::with_session(url)).await {
        Ok(response) => response.to_data_uri(),
        Err(err) => {
            debug!(url, error = %err, "in-page fetch failed");
            None
        }
    }
}

async fn materialize(page: &dyn PageContext, config: &HarvestConfig) {
    let metrics = page.scroll_metrics(&ScrollTarget::Document);
    let step = config
        .min_step
        .max((metrics.client_height * config.step_ratio).floor());
    let mut y = 0.0;
    while y < metrics.scroll_height {
        page.scroll_to(&ScrollTarget::Document, y).await;
        tokio::time::sleep(config.scroll_pause).await;
        y += step;
    }
    page.scroll_to(&ScrollTarget::Document, 0.0).await;
    tokio::time::sleep(config.reset_pause).await;
}

/// Images one frame renders at a useful size, with their bytes.
pub async fn harvest_frame(page: &dyn PageContext, config: &HarvestConfig) -> Vec<RenderedImage> {
    materialize(page, config).await;

    let base = page.url();
    let mut out = Vec::new();
    let mut considered = 0;
    for img in dom::select_all(&page.document(), "img") {
        if considered >= config.max_images {
            break;
        }
        let Some(src) = page
            .current_source(&img)
            .or_else(|| dom::non_empty_attr(&img, "src"))
            .or_else(|| dom::non_empty_attr(&img, "data-src"))
        else {
            continue;
        };
        let Some(state) = page.wait_for_image(&img, config.image_wait).await else {
            continue;
        };
        if state.natural_width < config.min_natural_size
            || state.natural_height < config.min_natural_size
        {
            continue;
        }
        considered += 1;

        let data = match fetch_in_page(page, &src).await {
            Some(data) => Some(data),
            None => page.rasterize(&img).await,
        };
        let Some(data) = data.filter(|d| datauri::is_data_uri(d)) else {
            continue;
        };
        let (query_width, query_height) = query_size(&src, Some(&base));
        out.push(RenderedImage {
            normalized: normalize_image_url(&src, Some(&base)),
            src,
            data,
            width: state.natural_width,
            height: state.natural_height,
            query_width,
            query_height,
        });
    }
    out
}

fn dedupe(images: Vec<RenderedImage>) -> Vec<RenderedImage> {
    let mut seen = HashSet::new();
    images
        .into_iter()
        .filter(|img| seen.insert(img.dedupe_key()))
        .collect()
}

/// Assigns each URL a rendered image: by URL, then by closest requested
/// size, then the next unused image. Each image is used at most once.
pub fn match_rendered_images(
    urls: &[String],
    images: &[RenderedImage],
    max_size_distance: u32,
) -> BTreeMap<String, String> {
    let mut used = vec![false; images.len()];
    let mut result = BTreeMap::new();

    for url in urls {
        let normalized = normalize_image_url(url, None);
        let (want_w, want_h) = query_size(url, None);

        let by_url = images.iter().enumerate().position(|(i, img)| {
            !used[i]
                && (img.normalized == normalized
                    || img.src.contains(&normalized)
                    || normalized.contains(&img.normalized))
        });

        let by_size = || {
            if want_w == 0 || want_h == 0 {
                return None;
            }
            images
                .iter()
                .enumerate()
                .filter(|(i, _)| !used[*i])
                .filter_map(|(i, img)| {
                    let (w, h) = img.effective_size();
                    (w > 0 && h > 0).then(|| (i, w.abs_diff(want_w) + h.abs_diff(want_h)))
                })
                .min_by_key(|(_, score)| *score)
                .filter(|(_, score)| *score < max_size_distance)
                .map(|(i, _)| i)
        };

        let chosen = by_url
            .or_else(by_size)
            .or_else(|| used.iter().position(|u| !u));
        if let Some(i) = chosen {
            used[i] = true;
            result.insert(url.clone(), images[i].data.clone());
        }
    }
    result
}

fn limited(urls: &[String], limit: usize) -> Vec<String> {
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

impl Orchestrator<'_> {
    /// A tab showing the source document, or the default context for
    /// sources the configuration does not know.
    async fn context_tab(&self, source_url: &str) -> Result<TabLease, BrowserError> {
        let cfg = &self.config.convert;
        let target = match cfg.known_origin(source_url) {
            Some(_) => source_url,
            None => cfg.default_context_url.as_str(),
        };
        if let Some(tab) = self.browser.find_tab(target).await? {
            return Ok(TabLease::borrowed(tab));
        }
        let lease = TabLease::open(self.browser, target, false, self.config.tab_load_timeout).await?;
        tokio::time::sleep(cfg.context_settle).await;
        Ok(lease)
    }

    async fn harvest(&self, lease: &TabLease) -> Vec<RenderedImage> {
        let frames = match self.browser.frames(lease.tab().id).await {
            Ok(frames) => frames,
            Err(err) => {
                debug!(error = %err, "cannot reach document frames");
                return Vec::new();
            }
        };
        let mut all = Vec::new();
        for frame in &frames {
            all.extend(harvest_frame(frame.as_ref(), &self.config.convert.harvest).await);
        }
        dedupe(all)
    }

    /// Converts up to the configured number of URLs. Every requested URL
    /// appears in the result, `None` when nothing could be recovered.
    #[instrument(skip_all, fields(source = %source_url, requested = urls.len()))]
    pub async fn convert_images(
        &self,
        urls: &[String],
        source_url: &str,
    ) -> Result<BTreeMap<String, Option<String>>, BrowserError> {
        let urls = limited(urls, self.config.convert.convert_limit);
        if urls.is_empty() {
            return Ok(BTreeMap::new());
        }

        let lease = self.context_tab(source_url).await?;
        let result = self.convert_in(&lease, &urls).await;
        lease.release(self.browser).await;
        Ok(result)
    }

    async fn convert_in(&self, lease: &TabLease, urls: &[String]) -> BTreeMap<String, Option<String>> {
        let frames = match self.browser.frames(lease.tab().id).await {
            Ok(frames) => frames,
            Err(err) => {
                debug!(error = %err, "cannot reach context frames");
                Vec::new()
            }
        };

        let mut result = BTreeMap::new();
        let mut failed = Vec::new();
        for url in urls {
            let data = match frames.first() {
                Some(main) => fetch_in_page(main.as_ref(), url).await,
                None => None,
            };
            if data.is_none() {
                failed.push(url.clone());
            }
            result.insert(url.clone(), data);
        }

        if !failed.is_empty() {
            let rendered = self.harvest(lease).await;
            let matched =
                match_rendered_images(&failed, &rendered, self.config.convert.harvest.max_size_distance);
            info!(failed = failed.len(), rendered = rendered.len(), matched = matched.len(), "recovered rendered images");
            for (url, data) in matched {
                result.insert(url, Some(data));
            }
        }
        result
    }

    /// Pulls images out of a known source document by matching them against
    /// what the document renders; unmatched URLs take the remaining images in order.
    #[instrument(skip_all, fields(source = %source_url, requested = urls.len()))]
    pub async fn auto_import_images(
        &self,
        source_url: &str,
        urls: &[String],
    ) -> Result<BTreeMap<String, String>, BrowserError> {
        let source_url = source_url.trim();
        let urls = limited(urls, self.config.convert.auto_import_limit);
        if urls.is_empty() || self.config.convert.known_origin(source_url).is_none() {
            return Ok(BTreeMap::new());
        }

        let lease = self.context_tab(source_url).await?;
        let rendered = self.harvest(&lease).await;
        lease.release(self.browser).await;

        let mut result =
            match_rendered_images(&urls, &rendered, self.config.convert.harvest.max_size_distance);
        let mut spare = rendered
            .iter()
            .map(|r| r.data.as_str())
            .filter(|d| datauri::is_inline_image(d));
        for url in &urls {
            if result.contains_key(url) {
                continue;
            }
            let taken: HashSet<&str> = result.values().map(String::as_str).collect();
            if let Some(data) = spare.by_ref().find(|d| !taken.contains(d)) {
                result.insert(url.clone(), data.to_string());
            }
        }
        Ok(result)
    }
}
