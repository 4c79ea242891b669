use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::browser::{Browser, PageRequest, TabLease};
use crate::fetcher::fetch_json;
use crate::media::markup::{ContentMedia, layered_media, structured_media};
use crate::media::normalize::MediaCollector;
use crate::media::source::SourceIdentifier;
use crate::media::video::{VideoDetail, fetch_video_detail};
use crate::media::{MediaReference, ResolveError, ResolverConfig, VideoRef};

/// Everything resolved for one source post.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMedia {
    pub images: Vec<MediaReference>,
    pub videos: Vec<VideoDetail>,
    pub text_content: String,
}

impl ResolvedMedia {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty() && self.text_content.trim().is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ContentItem {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Vec<ContentItem>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|c| !c.trim().is_empty())
}

impl ContentResponse {
    /// Content of a single post, or the joined answers of a question page.
    fn joined(self, id: &SourceIdentifier) -> Option<String> {
        if id.is_question() {
            let parts: Vec<String> = self.data.into_iter().filter_map(|i| i.content).collect();
            non_blank(Some(parts.join("\n")))
        } else {
            non_blank(self.content)
        }
    }

    /// Content of a single post, or the first answer of a question page.
    fn first(self, id: &SourceIdentifier) -> Option<String> {
        if id.is_question() {
            non_blank(self.data.into_iter().next().and_then(|i| i.content))
        } else {
            non_blank(self.content)
        }
    }
}

/// Resolves a source URL into images, videos and text.
///
/// The page path needs a browser and runs the site's own content API from
/// inside a background tab, so the call carries the user's session. Without
/// a browser, or when that path finds no images, the public APIs are called
/// directly.
pub struct MediaResolver<'a> {
    browser: Option<&'a dyn Browser>,
    client: Client,
    config: ResolverConfig,
}

impl<'a> MediaResolver<'a> {
    pub fn new(client: Client, config: ResolverConfig) -> Self {
        Self {
            browser: None,
            client,
            config,
        }
    }

    pub fn with_browser(mut self, browser: &'a dyn Browser) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn resolve_media(&self, url: &str) -> Result<ResolvedMedia, ResolveError> {
        let id = SourceIdentifier::parse(url)?;

        let mut primary = ContentMedia::default();
        if let Some(browser) = self.browser {
            match self.page_content(browser, &id, url).await {
                Some(content) => primary = structured_media(&content, &self.config),
                None => debug!("page path returned no content"),
            }
        }

        let mut images = primary.images;
        let mut video_refs = primary.videos;
        let mut text_content = primary.text;

        if images.is_empty() {
            info!("no images from page path, trying direct api");
            if let Some(content) = self.direct_content(&id).await {
                let fallback = layered_media(&content, &self.config);
                images = fallback.images;
                video_refs = merge_video_refs(&self.config, video_refs, fallback.videos);
                if text_content.is_empty() {
                    text_content = fallback.text;
                }
            }
        }

        let mut videos = Vec::with_capacity(video_refs.len());
        for video in &video_refs {
            if let Some(detail) = fetch_video_detail(&self.client, &self.config.lens_base, video).await {
                videos.push(detail);
            }
        }

        let resolved = ResolvedMedia {
            images,
            videos,
            text_content,
        };
        if resolved.is_empty() {
            return Err(ResolveError::NoContentFound);
        }
        info!(
            images = resolved.images.len(),
            videos = resolved.videos.len(),
            text_len = resolved.text_content.chars().count(),
            "media resolved"
        );
        Ok(resolved)
    }

    /// Same-origin API call from a background tab on the source page.
    /// The tab is closed on every exit path.
    #[instrument(skip_all)]
    async fn page_content(
        &self,
        browser: &dyn Browser,
        id: &SourceIdentifier,
        page_url: &str,
    ) -> Option<String> {
        let lease = match TabLease::open(browser, page_url, false, self.config.tab_timeout).await {
            Ok(lease) => lease,
            Err(err) => {
                warn!(error = %err, "could not open source tab");
                return None;
            }
        };
        tokio::time::sleep(self.config.settle).await;
        let content = self.fetch_in_page(browser, &lease, id).await;
        lease.release(browser).await;
        content
    }

    async fn fetch_in_page(
        &self,
        browser: &dyn Browser,
        lease: &TabLease,
        id: &SourceIdentifier,
    ) -> Option<String> {
        let frames = match browser.frames(lease.tab().id).await {
            Ok(frames) => frames,
            Err(err) => {
                warn!(error = %err, "could not reach source page");
                return None;
            }
        };
        let page = frames.into_iter().next()?;
        let api_url = page
            .url()
            .join(&id.page_api_path(self.config.question_page_limit))
            .ok()?;
        let response = match page.fetch(PageRequest::with_session(api_url.as_str())).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!(status = response.status, "page api returned an error status");
                return None;
            }
            Err(err) => {
                debug!(error = %err, "page api call failed");
                return None;
            }
        };
        match response.json::<ContentResponse>() {
            Ok(data) => data.joined(id),
            Err(err) => {
                debug!(error = %err, "page api returned unreadable json");
                None
            }
        }
    }

    /// Mobile API first with its version headers, then the web API.
    #[instrument(skip_all)]
    async fn direct_content(&self, id: &SourceIdentifier) -> Option<String> {
        let [v3, v4] = id.direct_api_urls(&self.config);
        let headers: Vec<(&str, &str)> = self
            .config
            .api_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        for (url, headers) in [(v3, headers.as_slice()), (v4, &[][..])] {
            match fetch_json::<ContentResponse>(&self.client, &url, headers).await {
                Ok(data) => {
                    if let Some(content) = data.first(id) {
                        return Some(content);
                    }
                    debug!(%url, "api returned no content");
                }
                Err(err) => debug!(%url, error = %err, "api call failed"),
            }
        }
        None
    }
}

fn merge_video_refs(config: &ResolverConfig, first: Vec<VideoRef>, second: Vec<VideoRef>) -> Vec<VideoRef> {
    let mut collector = MediaCollector::new(&config.image_host_marker);
    for video in first.iter().chain(second.iter()) {
        collector.push_video(&video.id, video.poster.as_deref());
    }
    collector.into_parts().1
}
