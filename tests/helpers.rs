#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use kuchiki::NodeRef;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

use contentshare::{
    browser::{
        Browser, BrowserError, Cookie, EditorHost, PageContext, TabEvent, TabId, TabInfo,
        TabStatus,
    },
    dom::{self, EditorBehavior, StaticEditor, StaticPage},
    extractor::ExtractorConfig,
    orchestrator::{HarvestConfig, Notifier, OrchestratorConfig, RetrySchedule, ScreenshotConfig},
};

/// Frame markup served for one URL. Each `frames` call takes the next step;
/// the last step repeats.
#[derive(Default)]
struct Site {
    steps: VecDeque<Vec<String>>,
    resources: Vec<(String, String, Bytes)>,
}

struct EditorSite {
    prefix: String,
    html: String,
    behavior: EditorBehavior,
}

/// A browser whose tabs show canned pages.
pub struct FakeBrowser {
    next_id: Cell<TabId>,
    tabs: RefCell<BTreeMap<TabId, (TabInfo, TabStatus)>>,
    events: broadcast::Sender<TabEvent>,
    sites: RefCell<HashMap<String, Site>>,
    editors: Vec<EditorSite>,
    editor_docs: RefCell<HashMap<TabId, NodeRef>>,
    cookies: Option<Vec<Cookie>>,
    loads: bool,
    captures: bool,
    closed: RefCell<Vec<TabId>>,
    frame_calls: Cell<usize>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            next_id: Cell::new(1),
            tabs: RefCell::new(BTreeMap::new()),
            events,
            sites: RefCell::new(HashMap::new()),
            editors: Vec::new(),
            editor_docs: RefCell::new(HashMap::new()),
            cookies: None,
            loads: true,
            captures: true,
            closed: RefCell::new(Vec::new()),
            frame_calls: Cell::new(0),
        }
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` as the only frame of `url`.
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_steps(url, vec![vec![html.to_string()]])
    }

    /// Serves successive frame sets for `url`.
    pub fn with_steps(self, url: &str, steps: Vec<Vec<String>>) -> Self {
        self.sites
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .steps = steps.into();
        self
    }

    /// A response every frame of `url` can fetch.
    pub fn with_resource(self, url: &str, resource: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.sites
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .resources
            .push((resource.to_string(), content_type.to_string(), Bytes::from(body)));
        self
    }

    pub fn with_editor(mut self, url_prefix: &str, html: &str, behavior: EditorBehavior) -> Self {
        self.editors.push(EditorSite {
            prefix: url_prefix.to_string(),
            html: html.to_string(),
            behavior,
        });
        self
    }

    pub fn with_cookies(mut self, cookies: &[(&str, &str)]) -> Self {
        self.cookies = Some(
            cookies
                .iter()
                .map(|(name, value)| Cookie {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Tabs never finish loading.
    pub fn stalled(mut self) -> Self {
        self.loads = false;
        self
    }

    pub fn without_capture(mut self) -> Self {
        self.captures = false;
        self
    }

    /// A tab that was open before the operation started.
    pub fn open_existing(&self, url: &str) -> TabInfo {
        self.insert_tab(url, TabStatus::Complete)
    }

    pub fn open_tabs(&self) -> Vec<TabInfo> {
        self.tabs.borrow().values().map(|(t, _)| t.clone()).collect()
    }

    pub fn closed_tabs(&self) -> Vec<TabId> {
        self.closed.borrow().clone()
    }

    pub fn frame_calls(&self) -> usize {
        self.frame_calls.get()
    }

    /// The live editor tree of a tab, once an editor was requested for it.
    pub fn editor_document(&self, tab: TabId) -> Option<NodeRef> {
        self.editor_docs.borrow().get(&tab).cloned()
    }

    pub fn editor_html(&self, tab: TabId, selector: &str) -> Option<String> {
        let doc = self.editor_document(tab)?;
        dom::select_first(&doc, selector).map(|n| dom::inner_html(&n))
    }

    fn insert_tab(&self, url: &str, status: TabStatus) -> TabInfo {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let info = TabInfo {
            id,
            window_id: Some(1),
            url: url.to_string(),
        };
        self.tabs.borrow_mut().insert(id, (info.clone(), status));
        info
    }

    fn tab_url(&self, tab: TabId) -> Result<String, BrowserError> {
        self.tabs
            .borrow()
            .get(&tab)
            .map(|(t, _)| t.url.clone())
            .ok_or(BrowserError::TabNotFound(tab))
    }
}

#[async_trait(?Send)]
impl Browser for FakeBrowser {
    async fn create_tab(&self, url: &str, _active: bool) -> Result<TabInfo, BrowserError> {
        let info = self.insert_tab(url, TabStatus::Loading);
        if self.loads {
            if let Some(entry) = self.tabs.borrow_mut().get_mut(&info.id) {
                entry.1 = TabStatus::Complete;
            }
            let _ = self.events.send(TabEvent {
                tab: info.id,
                status: TabStatus::Complete,
            });
        }
        Ok(info)
    }

    fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    async fn tab_status(&self, tab: TabId) -> Result<TabStatus, BrowserError> {
        self.tabs
            .borrow()
            .get(&tab)
            .map(|(_, s)| *s)
            .ok_or(BrowserError::TabNotFound(tab))
    }

    async fn focus(&self, _tab: &TabInfo) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn find_tab(&self, url_prefix: &str) -> Result<Option<TabInfo>, BrowserError> {
        Ok(self
            .tabs
            .borrow()
            .values()
            .find(|(t, _)| t.url.starts_with(url_prefix))
            .map(|(t, _)| t.clone()))
    }

    async fn frames(&self, tab: TabId) -> Result<Vec<Box<dyn PageContext>>, BrowserError> {
        self.frame_calls.set(self.frame_calls.get() + 1);
        let url = self.tab_url(tab)?;
        let mut sites = self.sites.borrow_mut();
        let site = sites
            .get_mut(&url)
            .ok_or_else(|| BrowserError::Injection(format!("no page at {url}")))?;
        let step = if site.steps.len() > 1 {
            site.steps.pop_front().unwrap_or_default()
        } else {
            site.steps.front().cloned().unwrap_or_default()
        };

        let base = Url::parse(&url).map_err(|e| BrowserError::Other(e.to_string()))?;
        Ok(step
            .iter()
            .map(|html| {
                let page = site.resources.iter().fold(
                    StaticPage::new(base.clone(), html),
                    |page, (res, ct, body)| page.with_resource(res, ct, body.clone()),
                );
                Box::new(page) as Box<dyn PageContext>
            })
            .collect())
    }

    async fn editor(&self, tab: TabId) -> Result<Box<dyn EditorHost>, BrowserError> {
        let url = self.tab_url(tab)?;
        let site = self
            .editors
            .iter()
            .find(|e| url.starts_with(&e.prefix))
            .ok_or_else(|| BrowserError::Injection(format!("no editor at {url}")))?;
        let doc = self
            .editor_docs
            .borrow_mut()
            .entry(tab)
            .or_insert_with(|| dom::parse_document(&site.html))
            .clone();
        Ok(Box::new(StaticEditor::from_document(doc, site.behavior.clone())))
    }

    async fn cookies(&self, url: &str) -> Result<Vec<Cookie>, BrowserError> {
        self.cookies
            .clone()
            .ok_or_else(|| BrowserError::Other(format!("no session for {url}")))
    }

    async fn capture_visible(&self, tab: &TabInfo, _jpeg_quality: u8) -> Result<String, BrowserError> {
        if !self.captures {
            return Err(BrowserError::Capture("capture disabled".into()));
        }
        Ok(format!("data:image/jpeg;base64,U0hPVC{}", tab.id))
    }

    async fn close_tab(&self, tab: TabId) -> Result<(), BrowserError> {
        self.tabs
            .borrow_mut()
            .remove(&tab)
            .ok_or(BrowserError::TabNotFound(tab))?;
        self.closed.borrow_mut().push(tab);
        Ok(())
    }
}

/// Records every advisory it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((title.to_string(), message.to_string()));
        }
    }
}

impl RecordingNotifier {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or_default()
    }
}

/// Orchestrator settings with every pause shortened to a millisecond.
pub fn fast_orchestrator() -> OrchestratorConfig {
    let ms = Duration::from_millis(1);
    let mut config = OrchestratorConfig {
        tab_load_timeout: Duration::from_millis(200),
        retry: RetrySchedule::new(vec![ms; 4]),
        screenshots: ScreenshotConfig {
            settle: ms,
            ..ScreenshotConfig::default()
        },
        sync_settle: ms,
        ..OrchestratorConfig::default()
    };
    config.convert.context_settle = ms;
    config.convert.harvest = HarvestConfig {
        scroll_pause: ms,
        reset_pause: ms,
        image_wait: ms,
        ..HarvestConfig::default()
    };
    config
}

pub fn fast_extractor() -> ExtractorConfig {
    let ms = Duration::from_millis(1);
    ExtractorConfig {
        container_scroll_pause: ms,
        document_scroll_pause: ms,
        scroll_reset_pause: ms,
        image_load_timeout: ms,
        ..ExtractorConfig::default()
    }
}

/// A valid PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
