use async_trait::async_trait;
use bytes::Bytes;
use kuchiki::NodeRef;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub enum ClipboardPayload {
    Rich { html: String, text: String },
    File(EditorFile),
}

/// Capabilities of a target editor page used by the fill engine.
///
/// Command methods act on the current selection, as editing commands do in
/// a browser. Every `dispatch_*` method returns whether the synthetic event
/// could be delivered; delivery says nothing about whether the editor acted.
#[async_trait(?Send)]
pub trait EditorHost {
    fn document(&self) -> NodeRef;

    /// Rendered and not hidden, with a non-empty box.
    fn is_visible(&self, node: &NodeRef) -> bool;

    fn rendered_text(&self, node: &NodeRef) -> String {
        node.text_contents()
    }

    /// Sets the value of a form control through the native property setter.
    fn set_native_value(&self, node: &NodeRef, value: &str);

    /// Fires `input` and `change` on the node.
    fn dispatch_input_events(&self, node: &NodeRef);

    fn focus(&self, node: &NodeRef);

    fn select_contents(&self, node: &NodeRef);

    fn place_caret_before(&self, node: &NodeRef);

    fn exec_delete(&self) -> bool;

    fn exec_insert_html(&self, html: &str) -> bool;

    fn exec_insert_text(&self, text: &str) -> bool;

    fn dispatch_paste(&self, target: &NodeRef, payload: ClipboardPayload) -> bool;

    fn dispatch_drop(&self, target: &NodeRef, file: EditorFile) -> bool;

    fn assign_file_input(&self, input: &NodeRef, file: EditorFile) -> bool;

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
