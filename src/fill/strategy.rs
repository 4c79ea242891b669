//! Injection techniques for rich-text bodies, softest first.

use kuchiki::NodeRef;
use serde::Serialize;
use tracing::debug;

use crate::browser::{ClipboardPayload, EditorHost};
use crate::dom;
use crate::fill::FillConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Synthetic paste of HTML and plain text over a full selection.
    Paste,
    /// The insert-HTML editing command.
    InsertHtml,
    /// Clear and append parsed nodes directly.
    DomRebuild,
    /// One paragraph per line of plain text.
    PlainText,
}

/// Minimum inserted length that counts as success: `max(ratio × expected, floor)`.
pub fn success_threshold(expected_len: usize, config: &FillConfig) -> usize {
    let scaled = (expected_len as f64 * config.escalation_ratio).floor() as usize;
    scaled.max(config.escalation_floor)
}

/// Characters of rendered text currently in the editing host.
pub fn inserted_len(host: &dyn EditorHost, el: &NodeRef) -> usize {
    host.rendered_text(el).chars().count()
}

fn select_all(host: &dyn EditorHost, el: &NodeRef) {
    host.focus(el);
    host.select_contents(el);
}

fn simulate_paste(host: &dyn EditorHost, el: &NodeRef, html: &str, text: &str) -> bool {
    select_all(host, el);
    host.exec_delete();
    host.dispatch_paste(
        el,
        ClipboardPayload::Rich {
            html: html.to_string(),
            text: text.to_string(),
        },
    )
}

fn insert_html(host: &dyn EditorHost, el: &NodeRef, html: &str) -> bool {
    select_all(host, el);
    host.exec_insert_html(html)
}

fn paragraphs(el: &NodeRef, text: &str) {
    for line in text.split('\n') {
        el.append(dom::text_paragraph(line));
    }
}

/// Replaces the children with nodes parsed from `html`, or with one
/// paragraph per line when nothing parses.
pub fn rebuild_dom(host: &dyn EditorHost, el: &NodeRef, html: &str) {
    dom::clear_children(el);
    let nodes = dom::parse_fragment(html);
    if nodes.is_empty() {
        paragraphs(el, html);
    } else {
        for node in nodes {
            el.append(node);
        }
    }
    host.dispatch_input_events(el);
}

pub fn rebuild_plain_text(host: &dyn EditorHost, el: &NodeRef, text: &str) {
    dom::clear_children(el);
    paragraphs(el, text);
    host.dispatch_input_events(el);
}

/// Tries each strategy until the inserted text reaches the threshold.
/// Returns the strategy that was left standing.
pub fn escalate(
    host: &dyn EditorHost,
    el: &NodeRef,
    html: &str,
    text: &str,
    config: &FillConfig,
) -> Strategy {
    let threshold = success_threshold(text.chars().count(), config);
    let reached = |host: &dyn EditorHost| inserted_len(host, el) >= threshold;

    simulate_paste(host, el, html, text);
    if reached(host) {
        return Strategy::Paste;
    }
    debug!(threshold, "paste did not stick");

    insert_html(host, el, html);
    if reached(host) {
        host.dispatch_input_events(el);
        return Strategy::InsertHtml;
    }
    debug!(threshold, "insert-html did not stick");

    rebuild_dom(host, el, html);
    if reached(host) {
        return Strategy::DomRebuild;
    }
    debug!(threshold, "dom rebuild fell short, using plain text");

    rebuild_plain_text(host, el, text);
    Strategy::PlainText
}
