//! Small Markdown subset: headings, lists, fenced code, images, links and emphasis.

use regex::Regex;
use std::sync::LazyLock;

use crate::fill::prepare::escape_html;

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)(?:\s+[^)]*)?\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static STRONG_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static STRONG_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__([^_]+)__").unwrap());
static EM_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static EM_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_([^_]+)_").unwrap());
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*+]\s+(.*)$").unwrap());
static ORDERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+(.*)$").unwrap());
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new("\u{0}(\\d+)\u{0}").unwrap());
static COVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"!\[[^\]]*\]\(([^)\s]+)(?:\s+"[^"]+")?\)"#).unwrap());

/// Renders inline syntax. Images and links are swapped for placeholders while
/// emphasis runs so their attributes are never rewritten.
fn inline(text: &str) -> String {
    let mut tags: Vec<String> = Vec::new();
    let mut stash = |tag: String| {
        tags.push(tag);
        format!("\u{0}{}\u{0}", tags.len() - 1)
    };

    let line = escape_html(text);
    let line = IMAGE.replace_all(&line, |c: &regex::Captures| {
        stash(format!(r#"<img src="{}" alt="{}" />"#, &c[2], &c[1]))
    });
    let line = LINK.replace_all(&line, |c: &regex::Captures| {
        stash(format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            &c[2], &c[1]
        ))
    });
    let line = STRONG_STAR.replace_all(&line, "<strong>$1</strong>");
    let line = STRONG_UNDERSCORE.replace_all(&line, "<strong>$1</strong>");
    let line = EM_STAR.replace_all(&line, "<em>$1</em>");
    let line = EM_UNDERSCORE.replace_all(&line, "<em>$1</em>");
    let line = CODE.replace_all(&line, "<code>$1</code>");

    PLACEHOLDER
        .replace_all(&line, |c: &regex::Captures| {
            c[1].parse::<usize>()
                .ok()
                .and_then(|i| tags.get(i).cloned())
                .unwrap_or_default()
        })
        .into_owned()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum List {
    None,
    Bullet,
    Ordered,
}

impl List {
    fn close(self, html: &mut String) {
        match self {
            List::Bullet => html.push_str("</ul>"),
            List::Ordered => html.push_str("</ol>"),
            List::None => {}
        }
    }
}

pub fn to_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut list = List::None;
    let mut in_code = false;

    for raw in markdown.replace("\r\n", "\n").split('\n') {
        let line = raw.trim_end();

        if line.starts_with("```") {
            list.close(&mut html);
            list = List::None;
            html.push_str(if in_code { "</code></pre>" } else { "<pre><code>" });
            in_code = !in_code;
            continue;
        }
        if in_code {
            html.push_str(&escape_html(line));
            html.push('\n');
            continue;
        }
        if line.trim().is_empty() {
            list.close(&mut html);
            list = List::None;
            html.push_str("<p><br/></p>");
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            list.close(&mut html);
            list = List::None;
            let level = caps[1].len();
            html.push_str(&format!("<h{level}>{}</h{level}>", inline(&caps[2])));
            continue;
        }

        let item = BULLET
            .captures(line)
            .map(|c| (List::Bullet, c[1].to_string()))
            .or_else(|| ORDERED.captures(line).map(|c| (List::Ordered, c[1].to_string())));
        if let Some((kind, text)) = item {
            if list != kind {
                list.close(&mut html);
                html.push_str(if kind == List::Bullet { "<ul>" } else { "<ol>" });
                list = kind;
            }
            html.push_str(&format!("<li>{}</li>", inline(&text)));
            continue;
        }

        list.close(&mut html);
        list = List::None;
        html.push_str(&format!("<p>{}</p>", inline(line)));
    }

    list.close(&mut html);
    if in_code {
        html.push_str("</code></pre>");
    }
    if html.is_empty() {
        html.push_str("<p></p>");
    }
    html
}

/// Source of the first image in the document.
pub fn first_image(markdown: &str) -> Option<String> {
    COVER
        .captures(markdown)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}
