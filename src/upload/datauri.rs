//! `data:` URI codec.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use percent_encoding::percent_decode_str;

use crate::upload::UploadError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Bytes,
}

pub fn is_data_uri(value: &str) -> bool {
    value
        .trim_start()
        .get(..5)
        .is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

pub fn is_inline_image(value: &str) -> bool {
    value
        .trim_start()
        .get(..11)
        .is_some_and(|p| p.eq_ignore_ascii_case("data:image/"))
}

pub fn parse(uri: &str) -> Result<DataUri, UploadError> {
    let uri = uri.trim();
    if !is_data_uri(uri) {
        return Err(UploadError::InvalidDataUri("missing data: scheme".into()));
    }
    let (header, payload) = uri[5..]
        .split_once(',')
        .ok_or_else(|| UploadError::InvalidDataUri("missing payload separator".into()))?;

    let mut params = header.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("text/plain")
        .to_ascii_lowercase();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact)
            .map_err(|e| UploadError::InvalidDataUri(e.to_string()))?
    } else {
        percent_decode_str(payload).collect::<Vec<u8>>()
    };

    Ok(DataUri {
        mime,
        bytes: Bytes::from(bytes),
    })
}

/// Encodes bytes as a base64 `data:` URI. The MIME type comes from the
/// content-type header when present, otherwise from the image signature.
pub fn encode(content_type: Option<&str>, bytes: &[u8]) -> String {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|m| !m.is_empty() && *m != "application/octet-stream")
        .map(str::to_string)
        .or_else(|| sniff_mime(bytes).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

pub fn extension_for(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base64_payload() {
        let uri = parse("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(uri.mime, "image/png");
        assert_eq!(&uri.bytes[..], b"hello");
    }

    #[test]
    fn parses_percent_encoded_payload() {
        let uri = parse("data:text/plain,a%20b").unwrap();
        assert_eq!(uri.mime, "text/plain");
        assert_eq!(&uri.bytes[..], b"a b");
    }

    #[test]
    fn rejects_non_data_uri() {
        assert!(parse("https://example.com/a.png").is_err());
        assert!(parse("data:image/png;base64").is_err());
    }

    #[test]
    fn encodes_with_header_type_and_sniffs_otherwise() {
        assert_eq!(encode(Some("image/jpeg; q=1"), b"hi"), "data:image/jpeg;base64,aGk=");
        let png_sig = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert!(encode(None, &png_sig).starts_with("data:image/png;base64,"));
    }

    #[test]
    fn recognizes_inline_images() {
        assert!(is_inline_image("DATA:image/gif;base64,R0lG"));
        assert!(!is_inline_image("data:text/plain,x"));
        assert!(is_data_uri("  data:,x"));
    }
}
