//! An `EditorHost` over a parsed editor page, with switchable editor quirks.
//!
//! Uploads started by a file paste, drop or file-input assignment complete on
//! the next `sleep`, when the hosted image is appended in a new paragraph at
//! the end of the editable root.

use async_trait::async_trait;
use kuchiki::NodeRef;
use std::cell::{Cell, RefCell};
use std::time::Duration;

use crate::browser::{ClipboardPayload, EditorFile, EditorHost};
use crate::dom::static_page::DEFAULT_BOX;
use crate::dom::{self, style};
use crate::upload::datauri;

/// Which synthetic inputs the simulated editor reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorBehavior {
    pub rich_paste: bool,
    pub insert_html: bool,
    pub insert_text: bool,
    pub file_paste: bool,
    pub file_drop: bool,
    pub file_input: bool,
    /// Base of hosted image URLs. `None` means uploads never finish.
    pub hosted_url_base: Option<String>,
    /// Drops `data:` images from pasted or inserted markup.
    pub rejects_data_images: bool,
}

impl Default for EditorBehavior {
    fn default() -> Self {
        Self {
            rich_paste: true,
            insert_html: true,
            insert_text: true,
            file_paste: true,
            file_drop: true,
            file_input: true,
            hosted_url_base: Some("https://img.editor.test/".to_string()),
            rejects_data_images: false,
        }
    }
}

impl EditorBehavior {
    /// An editor that ignores every synthetic input.
    pub fn inert() -> Self {
        Self {
            rich_paste: false,
            insert_html: false,
            insert_text: false,
            file_paste: false,
            file_drop: false,
            file_input: false,
            hosted_url_base: None,
            rejects_data_images: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Selection {
    None,
    Contents(NodeRef),
    Caret(NodeRef),
}

#[derive(Debug)]
struct PendingUpload {
    root: NodeRef,
    file: EditorFile,
}

pub struct StaticEditor {
    document: NodeRef,
    behavior: EditorBehavior,
    selection: RefCell<Selection>,
    pending: RefCell<Vec<PendingUpload>>,
    calls: RefCell<Vec<String>>,
    uploaded: Cell<usize>,
}

impl StaticEditor {
    pub fn new(html: &str, behavior: EditorBehavior) -> Self {
        Self::from_document(dom::parse_document(html), behavior)
    }

    /// Edits an existing tree; the caller keeps its own handle to it.
    pub fn from_document(document: NodeRef, behavior: EditorBehavior) -> Self {
        Self {
            document,
            behavior,
            selection: RefCell::new(Selection::None),
            pending: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            uploaded: Cell::new(0),
        }
    }

    /// Names of the editing operations invoked so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded.get()
    }

    pub fn html_of(&self, selector: &str) -> Option<String> {
        dom::select_first(&self.document, selector).map(|n| dom::inner_html(&n))
    }

    fn record(&self, call: &str) {
        self.calls.borrow_mut().push(call.to_string());
    }

    fn editable_root(&self, node: &NodeRef) -> Option<NodeRef> {
        node.inclusive_ancestors()
            .find(|n| dom::attr(n, "contenteditable").is_some_and(|v| v != "false"))
    }

    fn parse_insertion(&self, html: &str) -> Vec<NodeRef> {
        let nodes = dom::parse_fragment(html);
        if self.behavior.rejects_data_images {
            for node in &nodes {
                let images: Vec<NodeRef> = dom::select_all(node, "img")
                    .into_iter()
                    .chain(dom::is_tag(node, "img").then(|| node.clone()))
                    .collect();
                for img in images {
                    if dom::attr(&img, "src").is_some_and(|s| datauri::is_data_uri(&s)) {
                        img.detach();
                    }
                }
            }
        }
        nodes
    }

    /// Inserts nodes at the selection, replacing selected contents.
    fn insert_nodes(&self, nodes: Vec<NodeRef>, fallback: Option<&NodeRef>) -> bool {
        let selection = self.selection.borrow().clone();
        match selection {
            Selection::Contents(target) => {
                dom::clear_children(&target);
                for node in nodes {
                    target.append(node);
                }
                *self.selection.borrow_mut() = Selection::None;
            }
            Selection::Caret(anchor) => {
                for node in nodes {
                    anchor.insert_before(node);
                }
            }
            Selection::None => {
                let Some(target) = fallback else {
                    return false;
                };
                for node in nodes {
                    target.append(node);
                }
            }
        }
        true
    }

    fn start_upload(&self, target: &NodeRef, file: EditorFile) {
        if let Some(root) = self.editable_root(target).or_else(|| self.first_editable()) {
            self.pending.borrow_mut().push(PendingUpload { root, file });
        }
    }

    fn first_editable(&self) -> Option<NodeRef> {
        dom::select_first(&self.document, r#"[contenteditable="true"]"#)
    }

    fn finish_uploads(&self) {
        let Some(base) = self.behavior.hosted_url_base.as_deref() else {
            return;
        };
        let pending: Vec<PendingUpload> = self.pending.borrow_mut().drain(..).collect();
        for upload in pending {
            let n = self.uploaded.get() + 1;
            self.uploaded.set(n);
            let img = dom::new_element_with(
                "img",
                &[("src", &format!("{base}{n}-{}", upload.file.name))],
            );
            let p = dom::new_element("p");
            p.append(img);
            upload.root.append(p);
        }
    }
}

#[async_trait(?Send)]
impl EditorHost for StaticEditor {
    fn document(&self) -> NodeRef {
        self.document.clone()
    }

    fn is_visible(&self, node: &NodeRef) -> bool {
        style::rendered_box(node, DEFAULT_BOX).is_some_and(|b| !b.is_empty())
            && !style::computed_style(node).is_hidden()
    }

    fn set_native_value(&self, node: &NodeRef, value: &str) {
        self.record("set_value");
        if dom::is_tag(node, "textarea") {
            dom::clear_children(node);
            node.append(NodeRef::new_text(value));
        }
        dom::set_attr(node, "value", value);
    }

    fn dispatch_input_events(&self, _node: &NodeRef) {
        self.record("input_events");
    }

    fn focus(&self, _node: &NodeRef) {}

    fn select_contents(&self, node: &NodeRef) {
        *self.selection.borrow_mut() = Selection::Contents(node.clone());
    }

    fn place_caret_before(&self, node: &NodeRef) {
        *self.selection.borrow_mut() = Selection::Caret(node.clone());
    }

    fn exec_delete(&self) -> bool {
        self.record("delete");
        let current = self.selection.borrow().clone();
        if let Selection::Contents(target) = current {
            dom::clear_children(&target);
        }
        true
    }

    fn exec_insert_html(&self, html: &str) -> bool {
        self.record("insert_html");
        if !self.behavior.insert_html {
            return false;
        }
        let nodes = self.parse_insertion(html);
        self.insert_nodes(nodes, None)
    }

    fn exec_insert_text(&self, text: &str) -> bool {
        self.record("insert_text");
        if !self.behavior.insert_text {
            return false;
        }
        self.insert_nodes(vec![NodeRef::new_text(text)], None)
    }

    fn dispatch_paste(&self, target: &NodeRef, payload: ClipboardPayload) -> bool {
        match payload {
            ClipboardPayload::Rich { html, .. } => {
                self.record("paste_rich");
                if self.behavior.rich_paste {
                    let nodes = self.parse_insertion(&html);
                    self.insert_nodes(nodes, Some(target));
                }
                true
            }
            ClipboardPayload::File(file) => {
                self.record("paste_file");
                if self.behavior.file_paste {
                    self.start_upload(target, file);
                }
                self.behavior.file_paste
            }
        }
    }

    fn dispatch_drop(&self, target: &NodeRef, file: EditorFile) -> bool {
        self.record("drop_file");
        if self.behavior.file_drop {
            self.start_upload(target, file);
        }
        self.behavior.file_drop
    }

    fn assign_file_input(&self, input: &NodeRef, file: EditorFile) -> bool {
        self.record("file_input");
        if self.behavior.file_input {
            self.start_upload(input, file);
        }
        self.behavior.file_input
    }

    async fn sleep(&self, _duration: Duration) {
        self.finish_uploads();
        tokio::task::yield_now().await;
    }
}
