//! Tree helpers over `kuchiki` shared by the extractor and the fill engine.
//!
//! All mutation goes through these functions so that callers never hold a
//! live iterator while detaching nodes: every query collects into a `Vec`.

pub mod static_editor;
pub mod static_page;
pub mod style;

pub use static_editor::{EditorBehavior, StaticEditor};
pub use static_page::StaticPage;

use kuchiki::iter::{ElementIterator, NodeIterator};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static IMG_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img[\s>/]").unwrap());

pub fn parse_document(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

/// Parses `markup` into the `<body>` of a fresh document and returns that body.
///
/// The returned element is attached to its own throwaway document, which makes
/// it a convenient scratch container for rewrite-then-serialize passes.
pub fn fragment_container(markup: &str) -> NodeRef {
    let doc = parse_document(&format!(
        "<!DOCTYPE html><html><head></head><body>{markup}</body></html>"
    ));
    body_of(&doc).unwrap_or(doc)
}

/// Parses a fragment and returns its top-level nodes, detached from the parser's document.
pub fn parse_fragment(markup: &str) -> Vec<NodeRef> {
    let container = fragment_container(markup);
    let nodes: Vec<NodeRef> = container.children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

pub fn body_of(doc: &NodeRef) -> Option<NodeRef> {
    doc.select_first("body").ok().map(|b| b.as_node().clone())
}

/// Creates a detached element with no attributes.
pub fn new_element(tag: &str) -> NodeRef {
    parse_fragment(&format!("<{tag}></{tag}>"))
        .into_iter()
        .find(|n| n.as_element().is_some())
        .unwrap_or_else(|| NodeRef::new_text(String::new()))
}

/// Creates a detached element and assigns `attrs` in order.
pub fn new_element_with(tag: &str, attrs: &[(&str, &str)]) -> NodeRef {
    let node = new_element(tag);
    for (name, value) in attrs {
        set_attr(&node, name, value);
    }
    node
}

/// A `<p>` holding a single text node.
pub fn text_paragraph(text: &str) -> NodeRef {
    let p = new_element("p");
    p.append(NodeRef::new_text(text));
    p
}

pub fn inner_html(node: &NodeRef) -> String {
    node.children().map(|c| c.to_string()).collect()
}

pub fn outer_html(node: &NodeRef) -> String {
    node.to_string()
}

/// Runs `selector` against the descendants of `root`, excluding `root`
/// itself as `querySelectorAll` does. Invalid selectors match nothing.
pub fn select_all(root: &NodeRef, selector: &str) -> Vec<NodeRef> {
    match root.descendants().elements().select(selector) {
        Ok(matches) => matches.map(|m| m.as_node().clone()).collect(),
        Err(()) => {
            debug!(selector, "skipping unparsable selector");
            Vec::new()
        }
    }
}

pub fn select_first(root: &NodeRef, selector: &str) -> Option<NodeRef> {
    root.descendants()
        .elements()
        .select(selector)
        .ok()?
        .next()
        .map(|m| m.as_node().clone())
}

pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|e| e.name.local.to_string())
}

pub fn is_tag(node: &NodeRef, tag: &str) -> bool {
    node.as_element()
        .is_some_and(|e| (*e.name.local).eq_ignore_ascii_case(tag))
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|e| e.attributes.borrow().get(name).map(str::to_string))
}

/// Attribute value, trimmed, with empty values treated as absent.
pub fn non_empty_attr(node: &NodeRef, name: &str) -> Option<String> {
    attr(node, name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn has_attr(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .is_some_and(|e| e.attributes.borrow().contains(name))
}

pub fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub fn remove_attr(node: &NodeRef, name: &str) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().remove(name);
    }
}

/// Length in characters of the trimmed text.
pub fn trimmed_len(text: &str) -> usize {
    text.trim().chars().count()
}

pub fn clear_children(node: &NodeRef) {
    for child in node.children().collect::<Vec<_>>() {
        child.detach();
    }
}

pub fn replace_node(old: &NodeRef, new: NodeRef) {
    old.insert_before(new);
    old.detach();
}

/// Whether the node still hangs off a document root.
pub fn is_attached(node: &NodeRef) -> bool {
    node.ancestors()
        .any(|a| matches!(a.data(), NodeData::Document(_)))
}

/// Inclusive containment test.
pub fn contains(ancestor: &NodeRef, node: &NodeRef) -> bool {
    node == ancestor || node.ancestors().any(|a| &a == ancestor)
}

pub fn has_img_tag(markup: &str) -> bool {
    IMG_TAG_REGEX.is_match(markup)
}

pub fn count_img_tags(markup: &str) -> usize {
    IMG_TAG_REGEX.find_iter(markup).count()
}

/// Collapses every whitespace run to one space and trims.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
