//! Native-upload protocol for editors that only accept images they host.
//!
//! Inline images are swapped for tokened marker paragraphs before the body
//! is filled. Each marker is then fed to the editor's own upload handling as
//! a file, and the image the editor inserts is moved onto the marker.

use kuchiki::NodeRef;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::browser::{ClipboardPayload, EditorFile, EditorHost};
use crate::dom;
use crate::fill::FillConfig;
use crate::upload::{UploadError, compress, datauri};

pub const MARKER_ATTR: &str = "data-cs-inline-token";
const MARKER_STYLE: &str = "color:#6b7280";
const MARKER_HOSTS: &str = "p,div,span,li";

static MARKER_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[CS_IMG_[^\]]+\]\]").unwrap());
static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\p{Han}-]").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// An inline image waiting for upload, and the marker standing in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImagePlaceholder {
    /// One-based position among the body's images.
    pub index: usize,
    pub token: String,
    pub marker_text: String,
    pub alt: String,
    pub payload: String,
}

impl InlineImagePlaceholder {
    pub fn failure_text(&self) -> String {
        format!("[{} 上传失败，请手动上传]", self.alt)
    }

    /// `{alt}_{index}` with characters unsafe in file names replaced.
    pub fn file_stem(&self) -> String {
        let safe = UNSAFE_FILE_CHARS.replace_all(&self.alt, "_");
        let safe = if safe.is_empty() { "image".into() } else { safe };
        format!("{safe}_{}", self.index)
    }
}

/// Short random seed that keeps marker tokens unique per fill.
pub fn new_seed() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// Replaces every inline image with a marker paragraph.
pub fn split_inline_images(html: &str, seed: &str) -> (String, Vec<InlineImagePlaceholder>) {
    let container = dom::fragment_container(html);
    let mut placeholders = Vec::new();

    for (i, img) in dom::select_all(&container, "img").into_iter().enumerate() {
        let Some(src) = dom::attr(&img, "src").filter(|s| datauri::is_inline_image(s)) else {
            continue;
        };
        let index = i + 1;
        let alt = dom::attr(&img, "alt")
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| format!("图片{index}"));
        let token = format!("cs-inline-{seed}-{index}");
        let marker_text = format!("[[CS_IMG_{seed}_{index}]]");

        let marker = dom::text_paragraph(&marker_text);
        dom::set_attr(&marker, MARKER_ATTR, &token);
        dom::set_attr(&marker, "style", MARKER_STYLE);
        dom::replace_node(&img, marker);

        placeholders.push(InlineImagePlaceholder {
            index,
            token,
            marker_text,
            alt,
            payload: src,
        });
    }

    (dom::inner_html(&container), placeholders)
}

/// The marker element, by token attribute first and then by its text,
/// since editors often drop unknown attributes.
pub fn find_marker(body: &NodeRef, placeholder: &InlineImagePlaceholder) -> Option<NodeRef> {
    let by_token = format!(r#"[{MARKER_ATTR}="{}"]"#, placeholder.token);
    dom::select_first(body, &by_token).or_else(|| {
        dom::select_all(body, MARKER_HOSTS).into_iter().find(|el| {
            let text = dom::collapse_whitespace(&el.text_contents());
            !text.is_empty() && text.contains(&placeholder.marker_text)
        })
    })
}

fn set_marker_text(body: &NodeRef, placeholder: &InlineImagePlaceholder, text: &str) {
    if let Some(marker) = find_marker(body, placeholder) {
        dom::clear_children(&marker);
        marker.append(NodeRef::new_text(text));
    }
}

fn remove_marker(body: &NodeRef, placeholder: &InlineImagePlaceholder) {
    if let Some(marker) = find_marker(body, placeholder) {
        marker.detach();
    }
}

fn is_empty_wrapper(node: &NodeRef) -> bool {
    node.text_contents().trim().is_empty() && dom::select_first(node, "img").is_none()
}

/// Decodes the payload into a file the editor will take, re-encoding
/// formats editors reject.
pub fn to_editor_file(placeholder: &InlineImagePlaceholder) -> Result<EditorFile, UploadError> {
    let decoded = datauri::parse(&placeholder.payload)?;
    let file = if compress::is_editor_friendly(&decoded.mime) {
        decoded
    } else {
        match compress::reencode_unsupported(decoded.clone()) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                debug!(error = %err, "re-encode failed, sending original format");
                decoded
            }
        }
    };
    Ok(EditorFile {
        name: format!("{}.{}", placeholder.file_stem(), datauri::extension_for(&file.mime)),
        mime: file.mime,
        bytes: file.bytes,
    })
}

fn place_caret(host: &dyn EditorHost, body: &NodeRef, placeholder: &InlineImagePlaceholder) {
    if let Some(marker) = find_marker(body, placeholder) {
        host.focus(body);
        host.place_caret_before(&marker);
    }
}

fn file_input(host: &dyn EditorHost) -> Option<NodeRef> {
    let inputs = dom::select_all(&host.document(), r#"input[type="file"]"#);
    inputs
        .iter()
        .find(|i| dom::attr(i, "accept").is_some_and(|a| a.to_ascii_lowercase().contains("image")))
        .or_else(|| inputs.first())
        .cloned()
}

/// Paste at the marker, then drop, then a native file input. Escalates only
/// when the previous event could not be delivered.
fn deliver(
    host: &dyn EditorHost,
    body: &NodeRef,
    placeholder: &InlineImagePlaceholder,
    file: EditorFile,
) -> bool {
    place_caret(host, body, placeholder);
    if host.dispatch_paste(body, ClipboardPayload::File(file.clone())) {
        return true;
    }
    if host.dispatch_drop(body, file.clone()) {
        return true;
    }
    let Some(input) = file_input(host) else {
        return false;
    };
    place_caret(host, body, placeholder);
    let delivered = host.assign_file_input(&input, file);
    if delivered {
        host.dispatch_input_events(&input);
    }
    delivered
}

/// Polls until the body holds more images than `before`, within the timeout.
async fn wait_for_new_image(
    host: &dyn EditorHost,
    body: &NodeRef,
    before: usize,
    config: &FillConfig,
) -> bool {
    let interval = config.image_poll_interval.max(std::time::Duration::from_millis(1));
    let polls = config.image_poll_timeout.as_millis().div_ceil(interval.as_millis());
    for _ in 0..polls {
        if dom::select_all(body, "img").len() > before {
            return true;
        }
        host.sleep(interval).await;
    }
    dom::select_all(body, "img").len() > before
}

/// Moves the most recent image the editor added onto the marker.
fn move_new_image_to_marker(
    body: &NodeRef,
    placeholder: &InlineImagePlaceholder,
    before: &[NodeRef],
) -> bool {
    let Some(marker) = find_marker(body, placeholder) else {
        return false;
    };
    let Some(image) = dom::select_all(body, "img")
        .into_iter()
        .filter(|img| !before.contains(img))
        .last()
    else {
        return false;
    };
    if dom::contains(&marker, &image) {
        return false;
    }
    let old_parent = image.parent();
    dom::replace_node(&marker, image);
    if let Some(parent) = old_parent
        && &parent != body
        && dom::is_attached(&parent)
        && is_empty_wrapper(&parent)
    {
        parent.detach();
    }
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerOutcome {
    pub attempted: usize,
    pub uploaded: usize,
    /// Alt text of every image left as a manual-upload note.
    pub failed: Vec<String>,
}

/// Uploads each placeholder in body order and places the result at its marker.
#[instrument(skip_all, fields(images = placeholders.len()))]
pub async fn upload_at_markers(
    host: &dyn EditorHost,
    body: &NodeRef,
    placeholders: &[InlineImagePlaceholder],
    config: &FillConfig,
) -> MarkerOutcome {
    let mut outcome = MarkerOutcome {
        attempted: placeholders.len(),
        ..MarkerOutcome::default()
    };

    for placeholder in placeholders {
        let file = match to_editor_file(placeholder) {
            Ok(file) => file,
            Err(err) => {
                warn!(index = placeholder.index, error = %err, "inline image not decodable");
                set_marker_text(body, placeholder, &placeholder.failure_text());
                outcome.failed.push(placeholder.alt.clone());
                continue;
            }
        };

        let before = dom::select_all(body, "img");
        if !deliver(host, body, placeholder, file) {
            debug!(index = placeholder.index, "no upload channel accepted the file");
            set_marker_text(body, placeholder, &placeholder.failure_text());
            outcome.failed.push(placeholder.alt.clone());
            continue;
        }

        if wait_for_new_image(host, body, before.len(), config).await {
            if !move_new_image_to_marker(body, placeholder, &before) {
                remove_marker(body, placeholder);
            }
            outcome.uploaded += 1;
        } else {
            debug!(index = placeholder.index, "editor inserted no image in time");
            set_marker_text(body, placeholder, &placeholder.failure_text());
            outcome.failed.push(placeholder.alt.clone());
        }
        host.dispatch_input_events(body);
    }

    info!(uploaded = outcome.uploaded, attempted = outcome.attempted, "marker uploads finished");
    outcome
}

/// Removes leftover marker tokens and the wrappers they leave empty.
pub fn sweep_markers(host: &dyn EditorHost, body: &NodeRef) {
    let texts: Vec<NodeRef> = body
        .descendants()
        .filter(|n| n.as_text().is_some_and(|t| MARKER_TEXT.is_match(&t.borrow())))
        .collect();
    for node in texts {
        if let Some(text) = node.as_text() {
            let cleaned = MARKER_TEXT.replace_all(&text.borrow(), "").into_owned();
            let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ").trim().to_string();
            *text.borrow_mut() = cleaned;
        }
    }
    for el in dom::select_all(body, MARKER_HOSTS) {
        if dom::is_attached(&el) && is_empty_wrapper(&el) {
            el.detach();
        }
    }
    host.dispatch_input_events(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{EditorBehavior, StaticEditor};
    use crate::upload::compress::tests::png_bytes;
    use std::time::Duration;

    fn png_uri() -> String {
        datauri::encode(Some("image/png"), &png_bytes(4, 4))
    }

    fn config() -> FillConfig {
        FillConfig {
            image_poll_interval: Duration::from_millis(1),
            image_poll_timeout: Duration::from_millis(5),
            ..FillConfig::default()
        }
    }

    fn filled_editor(body: &str, behavior: EditorBehavior) -> (StaticEditor, NodeRef) {
        let editor = StaticEditor::new(
            &format!(r#"<div class="ProseMirror" contenteditable="true">{body}</div>"#),
            behavior,
        );
        let root = dom::select_first(&editor.document(), ".ProseMirror").unwrap();
        (editor, root)
    }

    #[test]
    fn inline_images_become_markers() {
        let html = format!(
            r#"<p>a</p><img src="https://cdn/x.png"><img src="{}" alt=" chart "><img src="{}">"#,
            png_uri(),
            png_uri()
        );
        let (out, placeholders) = split_inline_images(&html, "s1");
        assert_eq!(placeholders.len(), 2);
        assert_eq!(placeholders[0].index, 2);
        assert_eq!(placeholders[0].alt, "chart");
        assert_eq!(placeholders[1].alt, "图片3");
        assert_eq!(placeholders[1].token, "cs-inline-s1-3");
        assert!(!out.contains("data:"));
        assert!(out.contains(
            r#"<p data-cs-inline-token="cs-inline-s1-2" style="color:#6b7280">[[CS_IMG_s1_2]]</p>"#
        ));
        assert!(out.contains(r#"<img src="https://cdn/x.png">"#));
    }

    #[test]
    fn file_names_are_sanitized() {
        let p = InlineImagePlaceholder {
            index: 4,
            token: String::new(),
            marker_text: String::new(),
            alt: "架构 图/v2".into(),
            payload: png_uri(),
        };
        assert_eq!(p.file_stem(), "架构_图_v2_4");
        let file = to_editor_file(&p).unwrap();
        assert_eq!(file.name, "架构_图_v2_4.png");
        assert_eq!(file.mime, "image/png");
    }

    #[test]
    fn marker_found_by_text_when_attribute_is_dropped() {
        let (_, root) = filled_editor("<p>[[CS_IMG_s_1]]</p>", EditorBehavior::default());
        let p = InlineImagePlaceholder {
            index: 1,
            token: "cs-inline-s-1".into(),
            marker_text: "[[CS_IMG_s_1]]".into(),
            alt: "a".into(),
            payload: String::new(),
        };
        assert!(find_marker(&root, &p).is_some());
    }

    #[tokio::test]
    async fn uploaded_image_replaces_its_marker() {
        let (body, placeholders) =
            split_inline_images(&format!(r#"<p>before</p><img src="{}" alt="pic"><p>after</p>"#, png_uri()), "t");
        let (editor, root) = filled_editor(&body, EditorBehavior::default());

        let outcome = upload_at_markers(&editor, &root, &placeholders, &config()).await;
        assert_eq!(outcome.uploaded, 1);
        assert_eq!(editor.uploaded_count(), 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(
            dom::inner_html(&root),
            r#"<p>before</p><img src="https://img.editor.test/1-pic_1.png"><p>after</p>"#
        );
        assert_eq!(editor.calls().iter().filter(|c| *c == "paste_file").count(), 1);
    }

    #[tokio::test]
    async fn escalates_to_file_input_when_paste_and_drop_are_refused() {
        let behavior = EditorBehavior {
            file_paste: false,
            file_drop: false,
            ..EditorBehavior::default()
        };
        let (body, placeholders) = split_inline_images(&format!(r#"<img src="{}">"#, png_uri()), "t");
        let editor = StaticEditor::new(
            &format!(
                r#"<input type="file" accept=".pdf"><input type="file" accept="image/*" id="img"><div class="ProseMirror" contenteditable="true">{body}</div>"#
            ),
            behavior,
        );
        let root = dom::select_first(&editor.document(), ".ProseMirror").unwrap();
        let outcome = upload_at_markers(&editor, &root, &placeholders, &config()).await;
        assert_eq!(outcome.uploaded, 1);
        let calls = editor.calls();
        assert!(calls.starts_with(&["paste_file".into(), "drop_file".into(), "file_input".into()]));
    }

    #[tokio::test]
    async fn stalled_upload_leaves_a_manual_note() {
        let behavior = EditorBehavior {
            hosted_url_base: None,
            ..EditorBehavior::default()
        };
        let (body, placeholders) =
            split_inline_images(&format!(r#"<p>x</p><img src="{}" alt="图表">"#, png_uri()), "t");
        let (editor, root) = filled_editor(&body, behavior);
        let outcome = upload_at_markers(&editor, &root, &placeholders, &config()).await;
        assert_eq!(outcome.failed, vec!["图表".to_string()]);
        sweep_markers(&editor, &root);
        let html = dom::inner_html(&root);
        assert!(html.contains("[图表 上传失败，请手动上传]"));
        assert!(!html.contains("data:"));
    }

    #[test]
    fn sweep_removes_residual_tokens_and_empty_wrappers() {
        let (editor, root) = filled_editor(
            "<p>keep [[CS_IMG_a_1]]  this</p><p>[[CS_IMG_a_2]]</p><div><span> </span></div><p><img src=\"https://h/x.png\"></p>",
            EditorBehavior::default(),
        );
        sweep_markers(&editor, &root);
        assert_eq!(
            dom::inner_html(&root),
            r#"<p>keep this</p><p><img src="https://h/x.png"></p>"#
        );
    }
}
