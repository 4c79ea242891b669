//! Seams to the browser host: tabs, frames, editors, session cookies, capture.
//!
//! The orchestration code only ever talks to these traits. A concrete
//! implementation drives a real browser; tests drive simulated pages.

pub mod editor;
pub mod page;
pub mod tab;

pub use editor::{ClipboardPayload, EditorFile, EditorHost};
pub use page::{
    ComputedStyle, Credentials, ImageState, LayoutBox, PageContext, PageFetch, PageRequest,
    ScrollMetrics, ScrollTarget,
};
pub use tab::{TabLease, wait_for_tab_complete};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::TransferError;

pub type TabId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabEvent {
    pub tab: TabId,
    pub status: TabStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("tab {0} not found")]
    TabNotFound(TabId),

    #[error("tab load timed out after {0:?}")]
    LoadTimeout(Duration),

    #[error("tab event stream closed")]
    EventsClosed,

    #[error("script injection failed: {0}")]
    Injection(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("browser error: {0}")]
    Other(String),
}

impl From<BrowserError> for TransferError {
    fn from(err: BrowserError) -> Self {
        TransferError::NetworkOrPage(err.to_string())
    }
}

#[async_trait(?Send)]
pub trait Browser {
    async fn create_tab(&self, url: &str, active: bool) -> Result<TabInfo, BrowserError>;

    /// Tab status updates. Receivers only see events sent after subscribing.
    fn subscribe(&self) -> broadcast::Receiver<TabEvent>;

    async fn tab_status(&self, tab: TabId) -> Result<TabStatus, BrowserError>;

    /// Brings the tab and its window to the foreground.
    async fn focus(&self, tab: &TabInfo) -> Result<(), BrowserError>;

    /// An already-open tab whose URL starts with `url_prefix`.
    async fn find_tab(&self, url_prefix: &str) -> Result<Option<TabInfo>, BrowserError>;

    /// Every frame of the tab, main frame first.
    async fn frames(&self, tab: TabId) -> Result<Vec<Box<dyn PageContext>>, BrowserError>;

    /// The main frame of the tab, with editing capabilities.
    async fn editor(&self, tab: TabId) -> Result<Box<dyn EditorHost>, BrowserError>;

    async fn cookies(&self, url: &str) -> Result<Vec<Cookie>, BrowserError>;

    /// JPEG capture of the visible viewport as a `data:` URI.
    async fn capture_visible(&self, tab: &TabInfo, jpeg_quality: u8)
    -> Result<String, BrowserError>;

    async fn close_tab(&self, tab: TabId) -> Result<(), BrowserError>;
}
