//! Body rewrites applied before markup reaches a target editor.

use regex::Regex;
use std::sync::LazyLock;

use crate::dom::{self, style::InlineStyle};
use crate::media::markup::tag_attr;
use crate::upload::{DEFAULT_IMAGE_LABEL, datauri};

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());

const UNSAFE_ELEMENTS: &str = "script, style, iframe";
const IMAGE_BASE_STYLE: [(&str, &str); 4] = [
    ("max-width", "100%"),
    ("height", "auto"),
    ("display", "block"),
    ("margin", "8px 0"),
];

/// Removes elements editors must never receive.
pub fn remove_unsafe(html: &str) -> String {
    let container = dom::fragment_container(html);
    for node in dom::select_all(&container, UNSAFE_ELEMENTS) {
        node.detach();
    }
    dom::inner_html(&container)
}

/// Drops fixed image dimensions and makes every image fluid.
pub fn normalize_image_style(html: &str) -> String {
    let container = dom::fragment_container(html);
    for img in dom::select_all(&container, "img") {
        dom::remove_attr(&img, "width");
        dom::remove_attr(&img, "height");
        let mut style = InlineStyle::of(&img);
        for prop in ["width", "height", "max-width"] {
            style.remove(prop);
        }
        for (prop, value) in IMAGE_BASE_STYLE {
            style.set(prop, value);
        }
        style.apply(&img);
    }
    dom::inner_html(&container)
}

/// Replaces `<img>` elements whose `src` starts with `data:` by `[alt]` paragraphs.
pub fn strip_data_images(html: &str) -> String {
    let container = dom::fragment_container(html);
    for img in dom::select_all(&container, "img") {
        if !dom::attr(&img, "src").is_some_and(|s| datauri::is_data_uri(&s)) {
            continue;
        }
        let alt = dom::attr(&img, "alt")
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_LABEL.to_string());
        dom::replace_node(&img, dom::text_paragraph(&format!("[{alt}]")));
    }
    dom::inner_html(&container)
}

/// Text content of a fragment, as an editor would measure it.
pub fn html_to_text(html: &str) -> String {
    dom::fragment_container(html).text_contents()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn image_source(tag: &str) -> String {
    let raw = decode_entities(tag_attr(tag, "src").unwrap_or_default().trim());
    let src = raw.trim_matches(|c| c == '"' || c == '\'');
    match src.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => src.to_string(),
    }
}

/// How one image tag fared under the link-out policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkOutSummary {
    pub links: usize,
    pub inline: usize,
    pub unusable: usize,
}

/// Rewrites images for editors that cannot host remote images: remote
/// sources become link paragraphs, inline images are kept for native
/// upload, and anything else becomes a manual-upload note.
pub fn link_out_images(html: &str) -> (String, LinkOutSummary) {
    let mut summary = LinkOutSummary::default();
    let out = IMG_TAG.replace_all(html, |caps: &regex::Captures<'_>| {
        let tag = &caps[0];
        let src = image_source(tag);
        let alt = decode_entities(&tag_attr(tag, "alt").unwrap_or_default());
        let alt = match alt.trim() {
            "" => DEFAULT_IMAGE_LABEL.to_string(),
            a => a.to_string(),
        };
        let lower = src.to_ascii_lowercase();

        if src.is_empty() {
            summary.unusable += 1;
            format!("<p>[{}：未提取到可用链接，请手动上传]</p>", escape_html(&alt))
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            summary.links += 1;
            let safe = escape_html(&src);
            format!(r#"<p><a href="{safe}" target="_blank" rel="noopener noreferrer">图片链接：{safe}</a></p>"#)
        } else if lower.starts_with("data:image/") {
            summary.inline += 1;
            format!(r#"<img src="{}" alt="{}" />"#, escape_html(&src), escape_html(&alt))
        } else {
            summary.unusable += 1;
            format!("<p>[{}：图片地址不可用，请手动上传]</p>", escape_html(&alt))
        }
    });
    (out.into_owned(), summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_elements_are_removed() {
        let html = "<p>a</p><script>x()</script><iframe src=\"/f\"></iframe><style>p{}</style>";
        assert_eq!(remove_unsafe(html), "<p>a</p>");
    }

    #[test]
    fn image_style_becomes_fluid() {
        let html = r#"<img src="a.png" width="900" height="300" style="width:900px;border:1px solid;max-width:50%">"#;
        assert_eq!(
            normalize_image_style(html),
            r#"<img src="a.png" style="border:1px solid;max-width:100%;height:auto;display:block;margin:8px 0;">"#
        );
    }

    #[test]
    fn data_images_become_alt_paragraphs() {
        let html = r#"<p>x</p><img src="data:image/png;base64,AA" alt="diagram"><img src="data:image/gif;base64,BB"><img src="https://a/b.png">"#;
        assert_eq!(
            strip_data_images(html),
            r#"<p>x</p><p>[diagram]</p><p>[图片]</p><img src="https://a/b.png">"#
        );
    }

    #[test]
    fn link_out_rewrites_each_kind_of_source() {
        let html = concat!(
            r#"<img src="//cdn.example.com/a.png?x=1&amp;y=2" alt="A">"#,
            r#"<img src="data:image/png;base64,QUJD">"#,
            r#"<img alt="lost">"#,
            r#"<img src="blob:https://docs/1" alt="b">"#,
        );
        let (out, summary) = link_out_images(html);
        assert_eq!(
            summary,
            LinkOutSummary {
                links: 1,
                inline: 1,
                unusable: 2
            }
        );
        assert!(out.starts_with(
            r#"<p><a href="https://cdn.example.com/a.png?x=1&amp;y=2" target="_blank" rel="noopener noreferrer">图片链接：https://cdn.example.com/a.png?x=1&amp;y=2</a></p>"#
        ));
        assert!(out.contains(r#"<img src="data:image/png;base64,QUJD" alt="图片" />"#));
        assert!(out.contains("<p>[lost：未提取到可用链接，请手动上传]</p>"));
        assert!(out.contains("<p>[b：图片地址不可用，请手动上传]</p>"));
    }

    #[test]
    fn text_ignores_markup() {
        assert_eq!(html_to_text("<p>Hello <b>world</b></p><p>!</p>"), "Hello world!");
    }
}
