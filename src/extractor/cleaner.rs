use crate::dom;

const STRIPPED_ELEMENTS: &str = "script, style, iframe, link, meta, noscript";

/// Removes executable and head-only elements plus editor bookkeeping
/// attributes from captured markup.
pub fn sanitize(html: &str, tracking_attributes: &[String]) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let container = dom::fragment_container(html);
    for node in dom::select_all(&container, STRIPPED_ELEMENTS) {
        node.detach();
    }
    for el in dom::select_all(&container, "*") {
        for attr in tracking_attributes {
            dom::remove_attr(&el, attr);
        }
    }
    dom::inner_html(&container).trim().to_string()
}
