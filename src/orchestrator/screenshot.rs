//! Segmented viewport captures used when structural extraction is weak.

use std::time::Duration;
use tracing::{debug, instrument};

use crate::browser::{Browser, ScrollTarget, TabInfo};

const SCREENSHOT_HEADING: &str = "页面截图兜底：";
pub const SCREENSHOT_ONLY_INTRO: &str = "<p>未提取到结构化正文，已附加页面截图：</p>";

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotConfig {
    pub max_shots: usize,
    /// Share of the viewport height scrolled between shots.
    pub step_ratio: f64,
    /// Viewports shorter than this are treated as this tall.
    pub min_viewport: f64,
    pub settle: Duration,
    pub jpeg_quality: u8,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            max_shots: 5,
            step_ratio: 0.9,
            min_viewport: 400.0,
            settle: Duration::from_millis(450),
            jpeg_quality: 70,
        }
    }
}

/// Scroll offsets to capture for a page `total` high seen through `viewport`.
pub fn scroll_targets(total: f64, viewport: f64, config: &ScreenshotConfig) -> Vec<f64> {
    let viewport = viewport.max(config.min_viewport);
    let step = (viewport * config.step_ratio).floor().max(1.0);
    let mut targets = Vec::new();
    let mut y = 0.0;
    while y < total && targets.len() < config.max_shots {
        targets.push(y);
        y += step;
    }
    if targets.is_empty() {
        targets.push(0.0);
    }
    targets
}

/// Captures the page top to bottom. Failed captures are skipped; a tab whose
/// frames cannot be reached yields no shots.
#[instrument(skip_all, fields(tab = tab.id))]
pub async fn capture_page(
    browser: &dyn Browser,
    tab: &TabInfo,
    config: &ScreenshotConfig,
) -> Vec<String> {
    let frames = match browser.frames(tab.id).await {
        Ok(frames) => frames,
        Err(err) => {
            debug!(error = %err, "no frames to scroll for screenshots");
            return Vec::new();
        }
    };
    let Some(main) = frames.first() else {
        return Vec::new();
    };

    let metrics = main.scroll_metrics(&ScrollTarget::Document);
    let mut shots = Vec::new();
    for y in scroll_targets(metrics.scroll_height, metrics.client_height, config) {
        main.scroll_to(&ScrollTarget::Document, y).await;
        tokio::time::sleep(config.settle).await;
        match browser.capture_visible(tab, config.jpeg_quality).await {
            Ok(shot) => shots.push(shot),
            Err(err) => debug!(y, error = %err, "capture failed"),
        }
    }
    main.scroll_to(&ScrollTarget::Document, 0.0).await;
    shots
}

/// Appends numbered screenshots below a rule.
pub fn append_screenshot_gallery(body: &str, shots: &[String]) -> String {
    let mut out = if body.trim().is_empty() {
        "<p></p>".to_string()
    } else {
        body.to_string()
    };
    out.push_str(&format!("<hr/><p>{SCREENSHOT_HEADING}</p>"));
    for (i, shot) in shots.iter().enumerate() {
        out.push_str(&format!(
            "<p>截图 {}</p><p><img src=\"{}\" /></p>",
            i + 1,
            shot.replace('"', "&quot;")
        ));
    }
    out
}
