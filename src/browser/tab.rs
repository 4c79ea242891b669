use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, instrument, warn};

use crate::browser::{Browser, BrowserError, TabId, TabInfo, TabStatus};

/// Waits for `tab` to report `Complete`.
///
/// Subscribes before reading the current status so a load that finishes
/// in between is never missed.
#[instrument(skip(browser))]
pub async fn wait_for_tab_complete(
    browser: &dyn Browser,
    tab: TabId,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let mut events = browser.subscribe();
    if browser.tab_status(tab).await? == TabStatus::Complete {
        return Ok(());
    }

    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if event.tab == tab && event.status == TabStatus::Complete => {
                    return Ok(());
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "tab event receiver lagged, re-reading status");
                    if browser.tab_status(tab).await? == TabStatus::Complete {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => return Err(BrowserError::EventsClosed),
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| BrowserError::LoadTimeout(timeout))?
}

/// A tab used by one operation.
///
/// Tabs the operation opened itself are closed on release; tabs that were
/// already open are left to the user.
#[derive(Debug)]
pub struct TabLease {
    tab: TabInfo,
    owned: bool,
}

impl TabLease {
    /// Opens a tab and waits for it to load. The tab is closed again if loading fails.
    pub async fn open(
        browser: &dyn Browser,
        url: &str,
        active: bool,
        timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let tab = browser.create_tab(url, active).await?;
        let lease = Self { tab, owned: true };
        if let Err(err) = wait_for_tab_complete(browser, lease.tab.id, timeout).await {
            lease.release(browser).await;
            return Err(err);
        }
        Ok(lease)
    }

    pub fn borrowed(tab: TabInfo) -> Self {
        Self { tab, owned: false }
    }

    pub fn tab(&self) -> &TabInfo {
        &self.tab
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Gives up ownership without closing, e.g. when handing the tab to the user.
    pub fn hand_off(self) -> TabInfo {
        self.tab
    }

    pub async fn release(self, browser: &dyn Browser) {
        if !self.owned {
            return;
        }
        if let Err(err) = browser.close_tab(self.tab.id).await {
            warn!(tab = self.tab.id, error = %err, "failed to close tab");
        }
    }
}
