use percent_encoding::percent_decode_str;
use reqwest::Client;
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::browser::Cookie;
use crate::fetcher::FetchError;
use crate::platforms::{EndpointUpload, UploadEndpoint};
use crate::upload::UploadError;
use crate::upload::datauri::DataUri;

/// Session cookies of the target platform, as read from the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    cookies: Vec<Cookie>,
}

impl SessionCookies {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    /// Parses a `document.cookie` style header (`a=1; b=2`).
    pub fn parse(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| Cookie {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                })
            })
            .collect();
        Self { cookies }
    }

    /// Percent-decoded value of the named cookie.
    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| percent_decode_str(&c.value).decode_utf8_lossy().into_owned())
            .filter(|v| !v.is_empty())
    }

    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Upload and lookup bodies are read field by field; a field of an
/// unexpected type is ignored rather than failing the whole body.
#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    src: Option<Value>,
    url: Option<Value>,
    original_src: Option<Value>,
    watermark_src: Option<Value>,
    image_id: Option<Value>,
    upload_file: Option<Value>,
}

fn url_string(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.trim()).filter(|v| !v.is_empty()).map(str::to_string),
        _ => None,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl UploadResponse {
    fn hosted_url(&self) -> Option<String> {
        url_string(&self.src)
            .or_else(|| url_string(&self.url))
            .or_else(|| url_string(&self.original_src))
            .or_else(|| url_string(&self.watermark_src))
    }

    fn image_id(&self) -> Option<String> {
        self.upload_file
            .as_ref()
            .and_then(|f| f.get("image_id"))
            .and_then(id_string)
            .or_else(|| self.image_id.as_ref().and_then(id_string))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LookupResponse {
    original_src: Option<Value>,
    src: Option<Value>,
    url: Option<Value>,
}

impl LookupResponse {
    fn hosted_url(&self) -> Option<String> {
        url_string(&self.original_src)
            .or_else(|| url_string(&self.src))
            .or_else(|| url_string(&self.url))
    }
}

/// Uploads images to a platform's own image endpoints with the user's session.
pub struct PlatformUploader {
    client: Client,
    config: EndpointUpload,
    session: SessionCookies,
}

impl PlatformUploader {
    pub fn new(client: Client, config: EndpointUpload, session: SessionCookies) -> Self {
        Self {
            client,
            config,
            session,
        }
    }

    /// Tries every endpoint in order; `None` once all of them failed.
    #[instrument(skip_all, fields(file = %file_name, bytes = image.bytes.len()))]
    pub async fn upload(&self, image: &DataUri, file_name: &str) -> Option<String> {
        let csrf = self.session.get(&self.config.csrf_cookie);
        if csrf.is_none() {
            debug!(cookie = %self.config.csrf_cookie, "no csrf token in session");
        }
        for endpoint in &self.config.endpoints {
            match self
                .try_endpoint(endpoint, image, file_name, csrf.as_deref())
                .await
            {
                Ok(Some(url)) => {
                    debug!(endpoint = %endpoint.url, %url, "image uploaded");
                    return Some(url);
                }
                Ok(None) => debug!(endpoint = %endpoint.url, "endpoint returned no url"),
                Err(UploadError::Fetch(err)) if err.is_session_rejected() => {
                    warn!(endpoint = %endpoint.url, error = %err, "session rejected, user may need to log in again")
                }
                Err(err) => warn!(endpoint = %endpoint.url, field = %endpoint.field, error = %err, "upload attempt failed"),
            }
        }
        warn!("all upload endpoints failed");
        None
    }

    async fn try_endpoint(
        &self,
        endpoint: &UploadEndpoint,
        image: &DataUri,
        file_name: &str,
        csrf: Option<&str>,
    ) -> Result<Option<String>, UploadError> {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(&image.mime)
            .map_err(FetchError::from_reqwest_error)?;
        let mut form = Form::new().part(endpoint.field.clone(), part);
        for (name, value) in &endpoint.extra_fields {
            form = form.text(name.clone(), value.clone());
        }

        let mut request = self
            .client
            .post(&endpoint.url)
            .header("x-requested-with", "XMLHttpRequest")
            .multipart(form);
        if let Some(token) = csrf {
            request = request.header(self.config.csrf_header.as_str(), token);
        }
        if let Some(cookie) = self.session.header_value() {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(status).into());
        }
        let data: UploadResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if let Some(url) = data.hosted_url() {
            return Ok(Some(url));
        }
        match data.image_id() {
            Some(id) => Ok(self.lookup(&id).await),
            None => Ok(None),
        }
    }

    /// Resolves an image id returned for an already-known image.
    async fn lookup(&self, id: &str) -> Option<String> {
        let template = self.config.lookup_url.as_deref()?;
        let url = template.replace("{id}", id);
        let mut request = self.client.get(&url);
        if let Some(cookie) = self.session.header_value() {
            request = request.header(COOKIE, cookie);
        }
        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(%url, status = %r.status(), "image lookup failed");
                return None;
            }
            Err(err) => {
                debug!(%url, error = %err, "image lookup failed");
                return None;
            }
        };
        match response.json::<LookupResponse>().await {
            Ok(data) => data.hosted_url(),
            Err(err) => {
                debug!(%url, error = %err, "image lookup returned unreadable json");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookies_decode_csrf() {
        let session = SessionCookies::parse("z_c0=abc; _xsrf=a%2Bb%3D; empty=");
        assert_eq!(session.get("_xsrf").as_deref(), Some("a+b="));
        assert_eq!(session.get("empty"), None);
        assert_eq!(
            session.header_value().as_deref(),
            Some("z_c0=abc; _xsrf=a%2Bb%3D; empty=")
        );
    }

    #[test]
    fn response_url_field_precedence() {
        let data: UploadResponse = serde_json::from_str(
            r#"{"url":"https://u","original_src":"https://o","watermark_src":"https://w"}"#,
        )
        .unwrap();
        assert_eq!(data.hosted_url().as_deref(), Some("https://u"));

        let data: UploadResponse =
            serde_json::from_str(r#"{"src":"","watermark_src":"https://w"}"#).unwrap();
        assert_eq!(data.hosted_url().as_deref(), Some("https://w"));
    }

    #[test]
    fn mistyped_url_fields_are_skipped() {
        let data: UploadResponse = serde_json::from_str(r#"{"src":false,"url":"https://u"}"#).unwrap();
        assert_eq!(data.hosted_url().as_deref(), Some("https://u"));

        let data: UploadResponse =
            serde_json::from_str(r#"{"src":{"w":1},"url":null,"original_src":" https://o "}"#).unwrap();
        assert_eq!(data.hosted_url().as_deref(), Some("https://o"));

        let data: UploadResponse = serde_json::from_str(r#"{"upload_file":"none","image_id":"v2"}"#).unwrap();
        assert_eq!(data.hosted_url(), None);
        assert_eq!(data.image_id().as_deref(), Some("v2"));
    }

    #[test]
    fn lookup_skips_mistyped_fields() {
        let data: LookupResponse =
            serde_json::from_str(r#"{"original_src":123,"src":"https://s","url":"https://u"}"#).unwrap();
        assert_eq!(data.hosted_url().as_deref(), Some("https://s"));
    }

    #[test]
    fn image_id_prefers_nested_field_and_accepts_numbers() {
        let data: UploadResponse =
            serde_json::from_str(r#"{"upload_file":{"image_id":123},"image_id":"x"}"#).unwrap();
        assert_eq!(data.image_id().as_deref(), Some("123"));
        let data: UploadResponse = serde_json::from_str(r#"{"image_id":"v2-abc"}"#).unwrap();
        assert_eq!(data.image_id().as_deref(), Some("v2-abc"));
    }
}
