use crate::fetcher::{
    errors::FetchError,
    types::{Charset, PageResponse},
};
use bytes::Bytes;
use chrono::Utc;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::{StatusCode, header::HeaderMap};
use std::sync::LazyLock;
use url::Url;

static CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

static META_CHARSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#).unwrap());

/// Sniff window for `<meta charset>` and statistical detection.
const SNIFF_BYTES: usize = 4096;

pub fn process_response(
    url_final: Url,
    status: StatusCode,
    headers: HeaderMap,
    body_bytes: Bytes,
    content_type: &str,
) -> Result<PageResponse, FetchError> {
    let charset = detect_charset(content_type, &body_bytes);
    let body_utf8 = decode_strict(&body_bytes, &charset)?;

    Ok(PageResponse {
        url_final,
        status,
        headers,
        body_raw: body_bytes,
        body_utf8,
        charset,
        fetched_at: Utc::now(),
    })
}

/// Lossy decode used for API payloads and page-side fetches, where a few
/// replacement characters are preferable to dropping the whole body.
pub fn decode_text(content_type: Option<&str>, body: &[u8]) -> String {
    let charset = detect_charset(content_type.unwrap_or(""), body);
    let (decoded, _, _) = charset.encoding().decode(body);
    decoded.into_owned()
}

fn label_to_charset(label: &str) -> Option<Charset> {
    Encoding::for_label(label.to_lowercase().as_bytes()).map(Charset::from_encoding)
}

pub(crate) fn detect_charset(content_type: &str, body_bytes: &[u8]) -> Charset {
    if let Some(charset) = CHARSET_REGEX
        .captures(content_type)
        .and_then(|c| c.get(1))
        .and_then(|m| label_to_charset(m.as_str()))
    {
        return charset;
    }

    let search_bytes = &body_bytes[..body_bytes.len().min(SNIFF_BYTES)];
    let search_str = String::from_utf8_lossy(search_bytes);

    if let Some(charset) = META_CHARSET_REGEX
        .captures(&search_str)
        .and_then(|c| c.get(1))
        .and_then(|m| label_to_charset(m.as_str()))
    {
        return charset;
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(search_bytes, body_bytes.len() <= SNIFF_BYTES);
    Charset::from_encoding(detector.guess(None, true))
}

fn decode_strict(body_bytes: &[u8], charset: &Charset) -> Result<String, FetchError> {
    let encoding = charset.encoding();
    let (decoded, _encoding, had_errors) = encoding.decode(body_bytes);

    if had_errors {
        return Err(FetchError::Charset(format!(
            "failed to decode content with encoding: {}",
            encoding.name()
        )));
    }

    Ok(decoded.into_owned())
}
