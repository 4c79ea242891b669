//! Scrolls a container and the document so intersection-based lazy loaders fire.

use kuchiki::NodeRef;
use std::time::Duration;

use crate::browser::{PageContext, ScrollTarget};
use crate::extractor::model::ExtractorConfig;

const SCROLLABLE_SLACK: f64 = 50.0;
const MIN_CONTAINER_STEP: f64 = 300.0;
const MIN_DOCUMENT_STEP: f64 = 400.0;

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

async fn sweep(page: &dyn PageContext, target: &ScrollTarget, step: f64, max: f64, each: Duration) {
    let mut y = 0.0;
    while y < max {
        page.scroll_to(target, y).await;
        pause(each).await;
        y += step;
    }
}

/// Steps through the container (when it scrolls internally) and then the
/// document, returning both to the top.
pub async fn materialize(page: &dyn PageContext, container: &NodeRef, config: &ExtractorConfig) {
    let inner = ScrollTarget::Element(container.clone());
    let metrics = page.scroll_metrics(&inner);
    if metrics.scroll_height > metrics.client_height + SCROLLABLE_SLACK {
        let step = (metrics.client_height * 0.8).floor().max(MIN_CONTAINER_STEP);
        sweep(page, &inner, step, metrics.scroll_height, config.container_scroll_pause).await;
        page.scroll_to(&inner, 0.0).await;
    }

    let doc = page.scroll_metrics(&ScrollTarget::Document);
    let viewport = if doc.client_height > 0.0 { doc.client_height } else { 800.0 };
    let step = (viewport * 0.9).floor().max(MIN_DOCUMENT_STEP);
    sweep(page, &ScrollTarget::Document, step, doc.scroll_height, config.document_scroll_pause).await;
    page.scroll_to(&ScrollTarget::Document, 0.0).await;
    pause(config.scroll_reset_pause).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, StaticPage};
    use url::Url;

    #[tokio::test]
    async fn scrolls_container_then_document() {
        let page = StaticPage::new(
            Url::parse("https://docs.qq.com/doc/x").unwrap(),
            r#"<body data-scroll-height="1500"><div id="c" style="height:500px" data-scroll-height="1200"></div></body>"#,
        );
        let container = dom::select_first(&page.document(), "#c").unwrap();
        let config = ExtractorConfig {
            container_scroll_pause: Duration::ZERO,
            document_scroll_pause: Duration::ZERO,
            scroll_reset_pause: Duration::ZERO,
            ..ExtractorConfig::default()
        };
        materialize(&page, &container, &config).await;
        // container: step 400 over 1200, document: step 720 over 1500
        assert_eq!(
            page.scroll_log(),
            vec![0.0, 400.0, 800.0, 0.0, 0.0, 720.0, 1440.0, 0.0]
        );
    }
}
