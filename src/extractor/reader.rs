use kuchiki::NodeRef;
use regex::Regex;
use tracing::debug;

use crate::browser::PageContext;
use crate::dom;
use crate::extractor::model::ExtractorConfig;

const MEDIA_SELECTOR: &str = r#"img,canvas,[style*="background-image"]"#;

/// First short, non-empty title element, else the page title without its
/// site-name suffix.
pub fn find_title(page: &dyn PageContext, config: &ExtractorConfig) -> String {
    let doc = page.document();
    for selector in &config.title_selectors {
        for el in dom::select_all(&doc, selector) {
            let text = el.text_contents();
            let text = text.trim();
            let len = text.chars().count();
            if len > 0 && len < config.max_title_chars {
                return text.to_string();
            }
        }
    }
    strip_site_suffix(&page.title(), &config.title_suffix_pattern)
}

pub fn strip_site_suffix(title: &str, pattern: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace(title, "").trim().to_string(),
        Err(err) => {
            debug!(error = %err, "ignoring invalid title suffix pattern");
            title.trim().to_string()
        }
    }
}

/// `text + images * weight + min(area / divisor, cap)`.
pub fn score_candidate(text_len: usize, image_count: usize, area: f64, config: &ExtractorConfig) -> f64 {
    text_len as f64
        + image_count as f64 * config.image_weight
        + (area.max(0.0) / config.area_divisor).min(config.area_cap)
}

/// Highest-scoring rendered match across every body selector.
pub fn find_body_container(page: &dyn PageContext, config: &ExtractorConfig) -> Option<NodeRef> {
    let doc = page.document();
    let mut best: Option<(f64, NodeRef)> = None;

    for selector in &config.body_selectors {
        for el in dom::select_all(&doc, selector) {
            let layout = page.layout(&el);
            if layout.is_none() && !dom::is_tag(&el, "body") {
                continue;
            }
            let text_len = dom::trimmed_len(&el.text_contents());
            if text_len <= config.min_container_text {
                continue;
            }
            let media = dom::select_all(&el, MEDIA_SELECTOR).len();
            let area = layout.map_or(0.0, |b| b.area());
            let score = score_candidate(text_len, media, area, config);
            if best.as_ref().is_none_or(|(top, _)| score > *top) {
                best = Some((score, el));
            }
        }
    }

    if let Some((score, el)) = &best {
        debug!(score, tag = ?dom::tag_name(el), "body container chosen");
    }
    best.map(|(_, el)| el)
}
