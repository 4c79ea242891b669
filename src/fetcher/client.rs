use crate::fetcher::{
    errors::FetchError,
    pipeline::process_response,
    types::{BinaryResponse, PageResponse},
};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_PAGE_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const MAX_MEDIA_SIZE: u64 = 512 * 1024 * 1024; // 512MB
const USER_AGENT: &str = "Mozilla/5.0 (compatible; ContentShare/0.1)";

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| build_client().expect("Failed to build HTTP client"));

pub fn build_client() -> Result<Client, FetchError> {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(FetchError::from_reqwest_error)
}

pub fn get_client() -> &'static Client {
    &HTTP_CLIENT
}

/// Fetches an HTML page and decodes it to UTF-8.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch(url: &str) -> Result<PageResponse, FetchError> {
    let parsed_url = url::Url::parse(url)?;

    let response = HTTP_CLIENT
        .get(parsed_url)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .send()
        .await
        .map_err(FetchError::from_reqwest_error)?;

    if let Some(content_length) = response.content_length()
        && content_length > MAX_PAGE_SIZE
    {
        return Err(FetchError::BodyTooLarge(content_length));
    }

    let final_url = response.url().clone();
    let status = response.status();
    let headers = response.headers().clone();

    if !status.is_success() {
        return Err(FetchError::status(status));
    }

    let content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .unwrap_or("text/html")
        .to_string();

    if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
        return Err(FetchError::UnsupportedContentType(content_type));
    }

    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::Io(e.to_string()))?;

    if body_bytes.len() as u64 > MAX_PAGE_SIZE {
        return Err(FetchError::BodyTooLarge(body_bytes.len() as u64));
    }

    process_response(final_url, status, headers, body_bytes, &content_type)
}

/// GETs a JSON document with extra request headers.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<T, FetchError> {
    let parsed_url = url::Url::parse(url)?;
    let mut request = client
        .get(parsed_url)
        .header(reqwest::header::ACCEPT, "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request
        .send()
        .await
        .map_err(FetchError::from_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        debug!(%status, "json endpoint returned an error status");
        return Err(FetchError::status(status));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Io(e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Downloads a binary resource (image, video) without a content-type filter.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_binary(client: &Client, url: &str) -> Result<BinaryResponse, FetchError> {
    let parsed_url = url::Url::parse(url)?;

    let response = client
        .get(parsed_url)
        .send()
        .await
        .map_err(FetchError::from_reqwest_error)?;

    if let Some(content_length) = response.content_length()
        && content_length > MAX_MEDIA_SIZE
    {
        return Err(FetchError::BodyTooLarge(content_length));
    }

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::status(status));
    }

    let url_final = response.url().clone();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(str::to_string);

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Io(e.to_string()))?;

    Ok(BinaryResponse {
        url_final,
        content_type,
        body,
    })
}
