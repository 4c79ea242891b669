//! Inline `style` attribute parsing.
//!
//! The simulated hosts derive layout and computed style from inline
//! declarations; the fill engine uses the same parser when it rewrites image
//! styles for target editors.

use kuchiki::NodeRef;
use regex::Regex;
use std::sync::LazyLock;

use crate::browser::{ComputedStyle, LayoutBox};
use crate::dom::{attr, has_attr, remove_attr, set_attr};

static CSS_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(["']?(.*?)["']?\)"#).unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn parse(css: &str) -> Self {
        let declarations = split_declarations(css)
            .into_iter()
            .filter_map(|decl| {
                let (prop, value) = decl.split_once(':')?;
                let prop = prop.trim().to_ascii_lowercase();
                let value = value.trim();
                if prop.is_empty() {
                    return None;
                }
                Some((prop, value.to_string()))
            })
            .collect();
        Self { declarations }
    }

    pub fn of(node: &NodeRef) -> Self {
        attr(node, "style").map(|s| Self::parse(&s)).unwrap_or_default()
    }

    /// Last declaration wins, as in CSS.
    pub fn get(&self, prop: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|(p, _)| p == prop)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, prop: &str, value: &str) {
        self.remove(prop);
        self.declarations.push((prop.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, prop: &str) {
        self.declarations.retain(|(p, _)| p != prop);
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn to_css(&self) -> String {
        self.declarations
            .iter()
            .map(|(p, v)| format!("{p}:{v};"))
            .collect()
    }

    /// Writes back to the node, dropping the attribute when nothing is left.
    pub fn apply(&self, node: &NodeRef) {
        if self.is_empty() {
            remove_attr(node, "style");
        } else {
            set_attr(node, "style", &self.to_css());
        }
    }
}

/// Splits on `;` outside parentheses and quotes, so `url(data:...;base64,...)`
/// stays in one piece.
fn split_declarations(css: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in css.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&css[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&css[start..]);
    parts
}

/// First `url(...)` reference in a CSS value.
pub fn css_url(value: &str) -> Option<String> {
    CSS_URL_REGEX
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| !u.is_empty())
}

/// Parses `120px` or a bare `120`.
pub fn px(value: &str) -> Option<f64> {
    let value = value.trim();
    value
        .strip_suffix("px")
        .unwrap_or(value)
        .trim()
        .parse::<f64>()
        .ok()
}

/// Style as seen through inline declarations only.
pub fn computed_style(node: &NodeRef) -> ComputedStyle {
    let style = InlineStyle::of(node);
    ComputedStyle {
        display: style.get("display").map(str::to_string),
        visibility: style.get("visibility").map(str::to_string),
        background_image: style
            .get("background-image")
            .or_else(|| style.get("background").filter(|v| v.contains("url(")))
            .map(str::to_string),
    }
}

/// Rendered box for a node: `None` when the node or any ancestor is
/// `display:none` or carries `hidden`, otherwise the inline width/height
/// (or the `width`/`height` attributes), falling back to `default`.
pub fn rendered_box(node: &NodeRef, default: LayoutBox) -> Option<LayoutBox> {
    for n in node.inclusive_ancestors() {
        if n.as_element().is_none() {
            continue;
        }
        if has_attr(&n, "hidden") {
            return None;
        }
        if InlineStyle::of(&n)
            .get("display")
            .is_some_and(|d| d.eq_ignore_ascii_case("none"))
        {
            return None;
        }
    }
    let style = InlineStyle::of(node);
    let width = style
        .get("width")
        .and_then(px)
        .or_else(|| attr(node, "width").as_deref().and_then(px))
        .unwrap_or(default.width);
    let height = style
        .get("height")
        .and_then(px)
        .or_else(|| attr(node, "height").as_deref().and_then(px))
        .unwrap_or(default.height);
    Some(LayoutBox { width, height })
}
