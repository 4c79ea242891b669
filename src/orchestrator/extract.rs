use tracing::{debug, info, instrument, warn};

use crate::browser::{TabInfo, TabLease};
use crate::extractor::{ExtractError, ExtractedDocument, FallbackTier, extract_page};
use crate::orchestrator::screenshot::{self, SCREENSHOT_ONLY_INTRO};
use crate::orchestrator::{Orchestrator, RetrySchedule};

/// Where an extraction run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Created,
    Loading,
    Waiting { attempt: usize },
    Extracting { attempt: usize },
    Evaluating { attempt: usize },
    Accepted,
    ScreenshotFallback,
    Failed,
}

/// Decision taken after an attempt is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Retry,
    Exhausted,
}

fn enter(state: ExtractionState) {
    debug!(?state, "extraction state");
}

fn rank_key(doc: &ExtractedDocument) -> (bool, usize) {
    (doc.diagnostics.body_has_img_tag, doc.diagnostics.body_text_len)
}

/// Best frame result: one with an image tag first, then the longest text.
/// The earlier frame wins a tie.
pub fn rank_frames(results: Vec<ExtractedDocument>) -> Option<ExtractedDocument> {
    let mut best: Option<ExtractedDocument> = None;
    for doc in results {
        if best.as_ref().is_none_or(|b| rank_key(&doc) > rank_key(b)) {
            best = Some(doc);
        }
    }
    best
}

pub fn evaluate(
    best: Option<&ExtractedDocument>,
    attempt: usize,
    schedule: &RetrySchedule,
    accept_text_len: usize,
) -> Verdict {
    if best.is_some_and(|d| d.diagnostics.body_text_len > accept_text_len) {
        Verdict::Accept
    } else if attempt + 1 < schedule.attempts() {
        Verdict::Retry
    } else {
        Verdict::Exhausted
    }
}

fn attach_screenshots(doc: &mut ExtractedDocument, shots: &[String]) {
    let Some(first) = shots.first() else {
        return;
    };
    doc.body_markup = screenshot::append_screenshot_gallery(&doc.body_markup, shots);
    if doc.cover_url.is_empty() {
        doc.cover_url = first.clone();
    }
    doc.diagnostics.screenshot_count = shots.len();
}

fn screenshot_only(title: String, url: String, shots: &[String]) -> ExtractedDocument {
    let mut doc = ExtractedDocument {
        title,
        body_markup: screenshot::append_screenshot_gallery(SCREENSHOT_ONLY_INTRO, shots),
        cover_url: shots.first().cloned().unwrap_or_default(),
        ..ExtractedDocument::default()
    };
    doc.diagnostics.url = url;
    doc.diagnostics.fallback = FallbackTier::ScreenshotOnly;
    doc.diagnostics.screenshot_count = shots.len();
    doc.diagnostics.body_has_img_tag = !shots.is_empty();
    doc.diagnostics.img_tag_count = shots.len();
    doc
}

/// Best partial answer once every attempt has been spent.
///
/// A last result with text or a title is returned with any screenshots
/// appended. Otherwise screenshots alone stand in for the page, and with
/// no screenshots the run fails.
pub fn finish_exhausted(
    last: Option<ExtractedDocument>,
    shots: Vec<String>,
) -> Result<ExtractedDocument, ExtractError> {
    match last {
        Some(mut doc) if doc.has_content() => {
            attach_screenshots(&mut doc, &shots);
            Ok(doc)
        }
        Some(doc) if !shots.is_empty() => Ok(screenshot_only(doc.title, doc.diagnostics.url, &shots)),
        Some(_) => Err(ExtractError::EmptyPage),
        None if !shots.is_empty() => Ok(screenshot_only(String::new(), String::new(), &shots)),
        None => Err(ExtractError::RetriesExhausted),
    }
}

impl Orchestrator<'_> {
    /// Opens `url` in a foreground tab and extracts its document, retrying
    /// while single-page apps mount their content. The tab is closed on
    /// every exit path.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract_url(&self, url: &str) -> Result<ExtractedDocument, ExtractError> {
        enter(ExtractionState::Created);
        enter(ExtractionState::Loading);
        let lease = TabLease::open(self.browser, url, true, self.config.tab_load_timeout).await?;
        if let Err(err) = self.browser.focus(lease.tab()).await {
            debug!(error = %err, "could not focus extraction tab");
        }

        let outcome = self.run_attempts(lease.tab()).await;
        lease.release(self.browser).await;
        if outcome.is_err() {
            enter(ExtractionState::Failed);
        }
        outcome
    }

    async fn extract_frames(&self, tab: &TabInfo) -> Vec<ExtractedDocument> {
        let frames = match self.browser.frames(tab.id).await {
            Ok(frames) => frames,
            Err(err) => {
                warn!(error = %err, "frame injection failed");
                return Vec::new();
            }
        };
        let mut results = Vec::with_capacity(frames.len());
        for frame in &frames {
            results.push(extract_page(frame.as_ref(), self.extractor).await);
        }
        results
    }

    async fn run_attempts(&self, tab: &TabInfo) -> Result<ExtractedDocument, ExtractError> {
        let schedule = &self.config.retry;
        let mut last: Option<ExtractedDocument> = None;
        let mut attempt = 0;

        loop {
            let Some(wait) = schedule.delay(attempt) else {
                break;
            };
            enter(ExtractionState::Waiting { attempt });
            tokio::time::sleep(wait).await;

            enter(ExtractionState::Extracting { attempt });
            let best = rank_frames(self.extract_frames(tab).await);

            enter(ExtractionState::Evaluating { attempt });
            match (evaluate(best.as_ref(), attempt, schedule, self.config.accept_text_len), best) {
                (Verdict::Accept, Some(doc)) => {
                    enter(ExtractionState::Accepted);
                    return Ok(self.accept(tab, doc).await);
                }
                (Verdict::Retry, best) => {
                    last = best.or(last);
                    attempt += 1;
                }
                (_, best) => {
                    last = best.or(last);
                    break;
                }
            }
        }

        enter(ExtractionState::ScreenshotFallback);
        info!(attempts = schedule.attempts(), "extraction attempts exhausted");
        let shots = screenshot::capture_page(self.browser, tab, &self.config.screenshots).await;
        finish_exhausted(last, shots)
    }

    async fn accept(&self, tab: &TabInfo, mut doc: ExtractedDocument) -> ExtractedDocument {
        if doc.diagnostics.body_has_img_tag && !self.config.screenshot_accepted_with_images {
            return doc;
        }
        let shots = screenshot::capture_page(self.browser, tab, &self.config.screenshots).await;
        attach_screenshots(&mut doc, &shots);
        doc
    }
}
