//! Fills a platform editor with a title and a rich-text body.

pub mod locate;
pub mod markers;
pub mod prepare;
pub mod strategy;

pub use locate::{FillTargets, locate};
pub use markers::InlineImagePlaceholder;
pub use strategy::Strategy;

use kuchiki::NodeRef;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::browser::EditorHost;
use crate::dom;
use crate::error::MSG_NO_FILL_TARGET;
use crate::platforms::{FillStrategy, PlatformTarget, UploadStrategy};

#[derive(Debug, Clone, PartialEq)]
pub struct FillConfig {
    /// Share of the expected text a strategy must insert to count as success.
    pub escalation_ratio: f64,
    /// Lower bound on that threshold, in characters.
    pub escalation_floor: usize,
    /// Below this share of the expected text the body is refilled without inline images.
    pub truncation_ratio: f64,
    pub image_poll_interval: Duration,
    pub image_poll_timeout: Duration,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            escalation_ratio: 0.6,
            escalation_floor: 20,
            truncation_ratio: 0.5,
            image_poll_interval: Duration::from_millis(450),
            image_poll_timeout: Duration::from_secs(9),
        }
    }
}

/// Outcome of filling one platform.
///
/// `success` is true whenever a title or body widget was filled, even when
/// some images had to be left as manual-upload notes; those are listed in
/// `warnings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillResult {
    #[serde(skip)]
    pub platform: String,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FillResult {
    pub fn succeeded(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            success: true,
            error: String::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(platform: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            platform: platform.to_string(),
            success: false,
            error: if error.trim().is_empty() {
                "unknown error".to_string()
            } else {
                error
            },
            warnings: Vec::new(),
        }
    }
}

fn set_text(el: &NodeRef, text: &str) {
    dom::clear_children(el);
    el.append(NodeRef::new_text(text));
}

fn fill_title(host: &dyn EditorHost, el: &NodeRef, title: &str, strategy: FillStrategy) {
    if locate::is_rich_text(el) {
        match strategy {
            FillStrategy::Direct => set_text(el, title),
            FillStrategy::Escalating => {
                host.focus(el);
                host.select_contents(el);
                if !host.exec_insert_text(title) {
                    set_text(el, title);
                }
            }
        }
    } else {
        host.set_native_value(el, title);
    }
    host.dispatch_input_events(el);
}

/// Body markup as the platform should receive it, with inline images split
/// out when the editor hosts them itself.
fn prepare_body(
    body: &str,
    target: &PlatformTarget,
    rich: bool,
    seed: &str,
) -> (String, Vec<InlineImagePlaceholder>) {
    let cleaned = prepare::remove_unsafe(body);
    match &target.upload {
        // Plain controls never get a paste pass, so markers would stay behind.
        UploadStrategy::NativeEditor if !rich => (prepare::strip_data_images(&cleaned), Vec::new()),
        UploadStrategy::NativeEditor => {
            markers::split_inline_images(&prepare::normalize_image_style(&cleaned), seed)
        }
        // Anything still inline after the endpoint upload would bloat the editor.
        UploadStrategy::Endpoint(_) => (prepare::strip_data_images(&cleaned), Vec::new()),
        UploadStrategy::None => (cleaned, Vec::new()),
    }
}

async fn fill_rich_body(
    host: &dyn EditorHost,
    el: &NodeRef,
    html: &str,
    placeholders: &[InlineImagePlaceholder],
    target: &PlatformTarget,
    config: &FillConfig,
) -> Vec<String> {
    match target.fill_strategy {
        FillStrategy::Direct => strategy::rebuild_dom(host, el, html),
        FillStrategy::Escalating => {
            let text = prepare::html_to_text(html);
            let expected = text.chars().count();
            let used = strategy::escalate(host, el, html, &text, config);
            debug!(?used, "body strategy");

            let inserted = strategy::inserted_len(host, el);
            if expected > 0 && (inserted as f64) < (expected as f64 * config.truncation_ratio).floor() {
                info!(inserted, expected, "body looks truncated, refilling without inline images");
                let stripped = prepare::strip_data_images(html);
                let stripped_text = prepare::html_to_text(&stripped);
                strategy::escalate(host, el, &stripped, &stripped_text, config);
            }
        }
    }

    if placeholders.is_empty() {
        return Vec::new();
    }
    let outcome = markers::upload_at_markers(host, el, placeholders, config).await;
    markers::sweep_markers(host, el);
    outcome
        .failed
        .into_iter()
        .map(|alt| format!("image \"{alt}\" was not uploaded"))
        .collect()
}

/// Fills the title and body widgets of `target` found in `host`.
#[instrument(skip_all, fields(platform = %target.key))]
pub async fn fill(
    target: &PlatformTarget,
    title: &str,
    body: &str,
    host: &dyn EditorHost,
    config: &FillConfig,
) -> FillResult {
    let targets = locate(host, target);
    if targets.is_empty() {
        return FillResult::failed(&target.key, MSG_NO_FILL_TARGET);
    }

    if let Some(el) = &targets.title {
        fill_title(host, el, title, target.fill_strategy);
    }

    let mut result = FillResult::succeeded(&target.key);
    if let Some(el) = &targets.body {
        let rich = locate::is_rich_text(el);
        let (html, placeholders) = prepare_body(body, target, rich, &markers::new_seed());
        if rich {
            result.warnings = fill_rich_body(host, el, &html, &placeholders, target, config).await;
        } else {
            host.set_native_value(el, &prepare::html_to_text(&html));
            host.dispatch_input_events(el);
        }
    }

    info!(
        title = targets.title.is_some(),
        body = targets.body.is_some(),
        warnings = result.warnings.len(),
        "platform filled"
    );
    result
}
