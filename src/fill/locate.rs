use kuchiki::NodeRef;

use crate::browser::EditorHost;
use crate::dom;
use crate::platforms::PlatformTarget;

/// First attached, visible match in selector priority order, skipping `exclude`.
pub fn first_visible(
    host: &dyn EditorHost,
    selectors: &[String],
    exclude: Option<&NodeRef>,
) -> Option<NodeRef> {
    let doc = host.document();
    selectors.iter().find_map(|selector| {
        dom::select_all(&doc, selector).into_iter().find(|el| {
            exclude != Some(el) && dom::is_attached(el) && host.is_visible(el)
        })
    })
}

#[derive(Debug, Clone, Default)]
pub struct FillTargets {
    pub title: Option<NodeRef>,
    pub body: Option<NodeRef>,
}

impl FillTargets {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none()
    }
}

/// Resolves the title widget, then a body widget distinct from it.
pub fn locate(host: &dyn EditorHost, target: &PlatformTarget) -> FillTargets {
    let title = first_visible(host, &target.title_selectors, None);
    let body = first_visible(host, &target.body_selectors, title.as_ref());
    FillTargets { title, body }
}

/// Whether the node is a rich-text editing host rather than a form control.
pub fn is_rich_text(node: &NodeRef) -> bool {
    dom::attr(node, "contenteditable")
        .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true") || v == "plaintext-only")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{EditorBehavior, StaticEditor};
    use crate::platforms::PlatformTable;

    #[test]
    fn body_skips_the_title_element() {
        let html = r#"
            <div contenteditable="true" data-placeholder="请输入标题" id="t"></div>
            <div contenteditable="true" id="b"></div>"#;
        let editor = StaticEditor::new(html, EditorBehavior::default());
        let table = PlatformTable::builtin();
        let targets = locate(&editor, table.get("xiaohongshu").unwrap());
        assert_eq!(dom::attr(targets.title.as_ref().unwrap(), "id").as_deref(), Some("t"));
        assert_eq!(dom::attr(targets.body.as_ref().unwrap(), "id").as_deref(), Some("b"));
    }

    #[test]
    fn hidden_candidates_are_skipped() {
        let html = r#"
            <textarea placeholder="标题" style="display:none"></textarea>
            <input placeholder="文章标题" style="width:0">
            <h1 contenteditable="true" id="h">x</h1>"#;
        let editor = StaticEditor::new(html, EditorBehavior::default());
        let table = PlatformTable::builtin();
        let targets = locate(&editor, table.get("zhihu").unwrap());
        assert_eq!(dom::attr(targets.title.as_ref().unwrap(), "id").as_deref(), Some("h"));
        assert!(targets.body.is_none());
        assert!(!targets.is_empty());
    }

    #[test]
    fn rich_text_detection() {
        let doc = dom::parse_document(r#"<div id="a" contenteditable></div><div id="b" contenteditable="false"></div><textarea id="c"></textarea>"#);
        let by_id = |id: &str| dom::select_first(&doc, &format!("#{id}")).unwrap();
        assert!(is_rich_text(&by_id("a")));
        assert!(!is_rich_text(&by_id("b")));
        assert!(!is_rich_text(&by_id("c")));
    }
}
