//! Publishes one document to several platforms, one tab per platform, in order.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::browser::{Browser, BrowserError, TabLease};
use crate::error::{MSG_NO_PLATFORMS, MSG_SYNC_ADVISORY, MSG_UNKNOWN_PLATFORM, TransferError};
use crate::fill::{self, FillConfig, FillResult, prepare};
use crate::orchestrator::OrchestratorConfig;
use crate::platforms::{EndpointUpload, PlatformTable, PlatformTarget, RemoteImagePolicy, UploadStrategy};
use crate::upload::{self, CompressionLimits, PlatformUploader, SessionCookies};

const ADVISORY_TITLE: &str = "内容分发";

/// Receives the advisory raised when some platform did not fill.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, title: &str, message: &str) {
        (**self).notify(title, message);
    }
}

/// Writes advisories to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        warn!(title, "{message}");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub title: String,
    #[serde(rename = "bodyHtml")]
    pub body_markup: String,
    #[serde(default)]
    pub cover_url: String,
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub results: BTreeMap<String, FillResult>,
}

impl SyncReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|r| r.success)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("no platform selected")]
    NoPlatforms,
}

impl From<SyncError> for TransferError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NoPlatforms => TransferError::NoFillTarget(MSG_NO_PLATFORMS.to_string()),
        }
    }
}

/// Opens each platform's editor, prepares the body for it and fills it.
///
/// Editor tabs stay open afterwards so the user can review and publish.
pub struct Publisher<'a> {
    browser: &'a dyn Browser,
    platforms: &'a PlatformTable,
    client: Client,
    fill: FillConfig,
    compression: CompressionLimits,
    tab_load_timeout: Duration,
    settle: Duration,
    notifier: Box<dyn Notifier + 'a>,
}

impl<'a> Publisher<'a> {
    pub fn new(browser: &'a dyn Browser, platforms: &'a PlatformTable, client: Client) -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            browser,
            platforms,
            client,
            fill: FillConfig::default(),
            compression: CompressionLimits::default(),
            tab_load_timeout: defaults.tab_load_timeout,
            settle: defaults.sync_settle,
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_timing(mut self, config: &OrchestratorConfig) -> Self {
        self.tab_load_timeout = config.tab_load_timeout;
        self.settle = config.sync_settle;
        self
    }

    pub fn with_fill_config(mut self, config: FillConfig) -> Self {
        self.fill = config;
        self
    }

    pub fn with_compression(mut self, limits: CompressionLimits) -> Self {
        self.compression = limits;
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'a) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Fills every requested platform in order. One platform failing never
    /// stops the others; any failure raises a single advisory.
    #[instrument(skip_all, fields(platforms = request.platforms.len()))]
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        if request.platforms.is_empty() {
            return Err(SyncError::NoPlatforms);
        }

        let mut report = SyncReport::default();
        for key in &request.platforms {
            let result = match self.platforms.get(key) {
                Some(target) => self.sync_platform(target, request).await,
                None => {
                    warn!(platform = %key, "unknown platform");
                    FillResult::failed(key, MSG_UNKNOWN_PLATFORM)
                }
            };
            report.results.insert(key.clone(), result);
        }

        if !report.all_succeeded() {
            self.notifier.notify(ADVISORY_TITLE, MSG_SYNC_ADVISORY);
        }
        info!(
            succeeded = report.results.values().filter(|r| r.success).count(),
            total = report.results.len(),
            "sync finished"
        );
        Ok(report)
    }

    async fn sync_platform(&self, target: &PlatformTarget, request: &SyncRequest) -> FillResult {
        match self.try_sync_platform(target, request).await {
            Ok(result) => result,
            Err(err) => {
                warn!(platform = %target.key, error = %err, "platform sync failed");
                FillResult::failed(&target.key, err.to_string())
            }
        }
    }

    async fn try_sync_platform(
        &self,
        target: &PlatformTarget,
        request: &SyncRequest,
    ) -> Result<FillResult, BrowserError> {
        let lease = TabLease::open(self.browser, &target.editor_url, true, self.tab_load_timeout).await?;
        let tab = lease.hand_off();
        tokio::time::sleep(self.settle).await;

        let body = self.prepare_body(target, &request.body_markup).await;
        let editor = self.browser.editor(tab.id).await?;
        Ok(fill::fill(target, &request.title, &body, editor.as_ref(), &self.fill).await)
    }

    /// Hosts inline images on platforms with an upload endpoint and applies
    /// the platform's remote-image policy.
    async fn prepare_body(&self, target: &PlatformTarget, body: &str) -> String {
        let mut body = match &target.upload {
            UploadStrategy::Endpoint(endpoint) if !upload::find_inline_images(body).is_empty() => {
                self.externalize(endpoint, body).await
            }
            _ => body.to_string(),
        };

        if target.remote_images == RemoteImagePolicy::LinkOut {
            let (linked, summary) = prepare::link_out_images(&body);
            debug!(?summary, "remote images linked out");
            body = linked;
        }
        body
    }

    async fn externalize(&self, endpoint: &EndpointUpload, body: &str) -> String {
        let cookies = match self.browser.cookies(&endpoint.session_url).await {
            Ok(cookies) => cookies,
            Err(err) => {
                warn!(error = %err, "session cookies unavailable, dropping inline images");
                return upload::strip_inline_images(body);
            }
        };
        let uploader = PlatformUploader::new(self.client.clone(), endpoint.clone(), SessionCookies::new(cookies));
        upload::externalize_inline_images(&uploader, body, &self.compression)
            .await
            .html
    }
}
