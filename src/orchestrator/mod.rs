//! Drives pages across browser tabs: extraction with retries and screenshot
//! fallback, image conversion through a source-document tab, and
//! multi-platform publishing.

pub mod convert;
pub mod extract;
pub mod retry;
pub mod screenshot;
pub mod sync;

pub use convert::{ConvertConfig, HarvestConfig, RenderedImage};
pub use extract::{ExtractionState, Verdict};
pub use retry::RetrySchedule;
pub use screenshot::ScreenshotConfig;
pub use sync::{LogNotifier, Notifier, Publisher, SyncError, SyncReport, SyncRequest};

use std::time::Duration;

use crate::browser::Browser;
use crate::extractor::ExtractorConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub tab_load_timeout: Duration,
    pub retry: RetrySchedule,
    /// Captured text must be longer than this for an attempt to be accepted.
    pub accept_text_len: usize,
    pub screenshots: ScreenshotConfig,
    /// Also append screenshots to accepted results that already carry images.
    pub screenshot_accepted_with_images: bool,
    /// Pause after an editor tab loads, before filling.
    pub sync_settle: Duration,
    pub convert: ConvertConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tab_load_timeout: Duration::from_secs(30),
            retry: RetrySchedule::default(),
            accept_text_len: 50,
            screenshots: ScreenshotConfig::default(),
            screenshot_accepted_with_images: false,
            sync_settle: Duration::from_secs(3),
            convert: ConvertConfig::default(),
        }
    }
}

/// Tab-level operations over one browser.
pub struct Orchestrator<'a> {
    browser: &'a dyn Browser,
    config: &'a OrchestratorConfig,
    extractor: &'a ExtractorConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        config: &'a OrchestratorConfig,
        extractor: &'a ExtractorConfig,
    ) -> Self {
        Self {
            browser,
            config,
            extractor,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.config
    }
}
