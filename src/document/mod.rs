//! Local document files turned into the same title/body shape a page
//! extraction produces.

pub mod markdown;

use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::dom;
use crate::error::TransferError;
use crate::fetcher::pipeline::decode_text;
use crate::fill::prepare::{escape_html, normalize_image_style};

pub const MSG_UNSUPPORTED_DOCUMENT: &str = "暂仅支持 .md .markdown .txt .html .htm .docx 文档";
pub const MSG_CONVERTER_UNAVAILABLE: &str = "docx 解析库未加载，请刷新扩展后重试";

const UNTITLED: &str = "未命名文档";
const TITLE_MAX_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markdown,
    Html,
    Text,
    Docx,
}

impl DocumentKind {
    pub fn detect(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "txt" => Some(Self::Text),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("no converter available for {0:?} documents")]
    ConverterUnavailable(DocumentKind),
}

impl From<DocumentError> for TransferError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Unsupported(_) => {
                TransferError::UnrecognizedSource(MSG_UNSUPPORTED_DOCUMENT.to_string())
            }
            DocumentError::ConverterUnavailable(_) => {
                TransferError::NetworkOrPage(MSG_CONVERTER_UNAVAILABLE.to_string())
            }
        }
    }
}

/// What a converter produces for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Converted {
    pub body_markup: String,
    /// Plain text used for the preview and the title.
    pub text: String,
    pub cover_url: String,
}

pub trait DocumentConverter {
    fn convert(&self, kind: DocumentKind, bytes: &[u8]) -> Result<Converted, DocumentError>;
}

/// Handles every format that needs no external library.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicConverter;

impl DocumentConverter for BasicConverter {
    fn convert(&self, kind: DocumentKind, bytes: &[u8]) -> Result<Converted, DocumentError> {
        let source = decode(bytes);
        match kind {
            DocumentKind::Markdown => Ok(Converted {
                body_markup: markdown::to_html(&source),
                cover_url: markdown::first_image(&source).unwrap_or_default(),
                text: source,
            }),
            DocumentKind::Text => Ok(Converted {
                body_markup: plain_text_to_html(&source),
                text: source,
                cover_url: String::new(),
            }),
            DocumentKind::Html => Ok(convert_html(&source)),
            DocumentKind::Docx => Err(DocumentError::ConverterUnavailable(kind)),
        }
    }
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => decode_text(None, bytes),
    }
}

fn convert_html(source: &str) -> Converted {
    let doc = dom::parse_document(source);
    let root = dom::body_of(&doc).unwrap_or(doc);
    let cover_url = dom::select_all(&root, "img")
        .iter()
        .find_map(|img| dom::non_empty_attr(img, "src"))
        .unwrap_or_default();
    Converted {
        body_markup: dom::inner_html(&root),
        text: root.text_contents(),
        cover_url,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDocument {
    pub file_name: String,
    pub text: String,
    pub title: String,
    pub cover_url: String,
    #[serde(rename = "bodyHtml")]
    pub body_markup: String,
}

/// One paragraph per line; blank lines become empty paragraphs.
pub fn plain_text_to_html(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                "<p><br/></p>".to_string()
            } else {
                format!("<p>{}</p>", escape_html(line))
            }
        })
        .collect()
}

/// First `# heading`, else the first non-empty line without list or heading
/// marks, else the file name without its extension.
pub fn extract_title(text: &str, file_name: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    if let Some(heading) = lines
        .iter()
        .filter_map(|l| l.strip_prefix('#'))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
        .find(|h| !h.is_empty())
    {
        return heading.to_string();
    }

    if let Some(line) = lines.iter().find(|l| !l.is_empty()) {
        let stripped = line
            .trim_start_matches(|c: char| matches!(c, '-' | '*' | '#' | '.') || c.is_ascii_digit() || c.is_whitespace());
        let title: String = stripped.chars().take(TITLE_MAX_CHARS).collect();
        if !title.trim().is_empty() {
            return title.trim().to_string();
        }
    }

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .trim();
    if stem.is_empty() {
        UNTITLED.to_string()
    } else {
        stem.to_string()
    }
}

/// Converts a local file into a publishable document.
#[instrument(skip_all, fields(file = %file_name, bytes = bytes.len()))]
pub fn parse_document_file(
    converter: &dyn DocumentConverter,
    file_name: &str,
    bytes: &[u8],
) -> Result<ParsedDocument, DocumentError> {
    let kind = DocumentKind::detect(file_name)
        .ok_or_else(|| DocumentError::Unsupported(file_name.to_string()))?;
    let converted = converter.convert(kind, bytes)?;
    debug!(?kind, text_len = converted.text.len(), "document converted");

    let body = if converted.body_markup.trim().is_empty() {
        "<p></p>".to_string()
    } else {
        converted.body_markup
    };
    Ok(ParsedDocument {
        file_name: file_name.to_string(),
        title: extract_title(&converted.text, file_name),
        text: converted.text,
        cover_url: converted.cover_url,
        body_markup: normalize_image_style(&body),
    })
}
