//! Request/response message contract between a UI surface and the engine.
//!
//! Messages are JSON objects tagged by `type`. Every request gets exactly one
//! response; failures are reported in-band, never as transport errors.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::browser::Browser;
use crate::config::Config;
use crate::error::TransferError;
use crate::extractor::ExtractedDocument;
use crate::fill::FillResult;
use crate::media::{MediaResolver, ResolvedMedia};
use crate::orchestrator::{LogNotifier, Notifier, Orchestrator, Publisher, SyncRequest};
use crate::platforms::PlatformTable;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Extract {
        url: String,
    },
    #[serde(alias = "ZHIHU_PARSE_MEDIA")]
    ResolveMedia {
        url: String,
    },
    ConvertImages {
        #[serde(default)]
        urls: Vec<String>,
        #[serde(rename = "sourceDocUrl", default)]
        source_doc_url: String,
    },
    AutoImportDocImages {
        #[serde(rename = "sourceDocUrl", default)]
        source_doc_url: String,
        #[serde(rename = "imageUrls", default)]
        image_urls: Vec<String>,
    },
    Sync(SyncRequest),
}

impl Request {
    fn name(&self) -> &'static str {
        match self {
            Request::Extract { .. } => "EXTRACT",
            Request::ResolveMedia { .. } => "RESOLVE_MEDIA",
            Request::ConvertImages { .. } => "CONVERT_IMAGES",
            Request::AutoImportDocImages { .. } => "AUTO_IMPORT_DOC_IMAGES",
            Request::Sync(_) => "SYNC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    ExtractResult(ExtractedDocument),
    ExtractError {
        kind: &'static str,
        error: String,
    },
    ResolveResult(ResolvedMedia),
    ResolveError {
        kind: &'static str,
        error: String,
    },
    ConvertImagesResult {
        results: BTreeMap<String, Option<String>>,
    },
    AutoImportDocImagesResult {
        results: BTreeMap<String, String>,
    },
    SyncResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        results: Option<BTreeMap<String, FillResult>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Response {
    fn extract_error(err: impl Into<TransferError>) -> Self {
        let err = err.into();
        Response::ExtractError {
            kind: err.kind(),
            error: err.message().to_string(),
        }
    }

    fn resolve_error(err: impl Into<TransferError>) -> Self {
        let err = err.into();
        Response::ResolveError {
            kind: err.kind(),
            error: err.message().to_string(),
        }
    }
}

/// Routes contract messages to the engine components.
pub struct ContentShareService<'a> {
    browser: &'a dyn Browser,
    config: &'a Config,
    platforms: PlatformTable,
    client: Client,
    notifier: Arc<dyn Notifier>,
}

impl<'a> ContentShareService<'a> {
    pub fn new(browser: &'a dyn Browser, config: &'a Config, platforms: PlatformTable, client: Client) -> Self {
        Self {
            browser,
            config,
            platforms,
            client,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn platforms(&self) -> &PlatformTable {
        &self.platforms
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(self.browser, self.config.orchestrator(), self.config.extractor())
    }

    #[instrument(skip_all, fields(request = request.name()))]
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Extract { url } => match self.orchestrator().extract_url(&url).await {
                Ok(doc) => Response::ExtractResult(doc),
                Err(err) => {
                    warn!(error = %err, "extraction failed");
                    Response::extract_error(err)
                }
            },
            Request::ResolveMedia { url } => {
                let resolver = MediaResolver::new(self.client.clone(), self.config.resolver().clone())
                    .with_browser(self.browser);
                match resolver.resolve_media(&url).await {
                    Ok(media) => Response::ResolveResult(media),
                    Err(err) => {
                        warn!(error = %err, "media resolution failed");
                        Response::resolve_error(err)
                    }
                }
            }
            Request::ConvertImages { urls, source_doc_url } => {
                let results = self
                    .orchestrator()
                    .convert_images(&urls, &source_doc_url)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(error = %err, "image conversion failed");
                        BTreeMap::new()
                    });
                Response::ConvertImagesResult { results }
            }
            Request::AutoImportDocImages {
                source_doc_url,
                image_urls,
            } => {
                let results = self
                    .orchestrator()
                    .auto_import_images(&source_doc_url, &image_urls)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(error = %err, "auto import failed");
                        BTreeMap::new()
                    });
                Response::AutoImportDocImagesResult { results }
            }
            Request::Sync(request) => self.sync(&request).await,
        }
    }

    async fn sync(&self, request: &SyncRequest) -> Response {
        let publisher = Publisher::new(self.browser, &self.platforms, self.client.clone())
            .with_timing(self.config.orchestrator())
            .with_fill_config(self.config.fill().clone())
            .with_compression(*self.config.upload())
            .with_notifier(self.notifier.clone());
        match publisher.sync(request).await {
            Ok(report) => {
                info!(all_succeeded = report.all_succeeded(), "sync reported");
                Response::SyncResult {
                    success: true,
                    results: Some(report.results),
                    error: None,
                }
            }
            Err(err) => Response::SyncResult {
                success: false,
                results: None,
                error: Some(TransferError::from(err).message().to_string()),
            },
        }
    }
}
