use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::fetcher::fetch_json;
use crate::media::normalize::format_size;
use crate::media::{MediaKind, MediaReference, VideoRef};

pub const QUALITY_PREFERENCE: [&str; 3] = ["HD", "SD", "LD"];

/// A playable rendition of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetail {
    pub id: String,
    pub poster: Option<String>,
    pub play_url: String,
    pub quality: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub size_str: String,
}

impl VideoDetail {
    pub fn to_reference(&self) -> MediaReference {
        MediaReference {
            kind: MediaKind::Video,
            canonical_url: self.play_url.clone(),
            thumbnail_url: self.poster.clone(),
            width: self.width,
            height: self.height,
            quality_label: Some(self.quality.clone()),
            size_bytes: Some(self.size),
            native_id: Some(self.id.clone()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    play_url: Option<String>,
    #[serde(default)]
    width: Option<Value>,
    #[serde(default)]
    height: Option<Value>,
    #[serde(default)]
    size: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistResponse {
    #[serde(default)]
    pub playlist: BTreeMap<String, PlaylistItem>,
}

/// Accepts numbers and numeric strings; anything else counts as zero.
fn lenient_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| *f > 0.0).map_or(0, |f| f as u64),
        _ => 0,
    }
}

fn playable(item: &PlaylistItem) -> Option<&str> {
    item.play_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
}

/// Picks HD, then SD, then LD, then any other key with a play URL.
pub fn select_quality(video: &VideoRef, playlist: &PlaylistResponse) -> Option<VideoDetail> {
    let preferred = QUALITY_PREFERENCE
        .iter()
        .filter_map(|q| playlist.playlist.get_key_value(*q));
    let (quality, item, url) = preferred
        .chain(playlist.playlist.iter())
        .find_map(|(quality, item)| playable(item).map(|url| (quality, item, url)))?;

    let size = lenient_u64(item.size.as_ref());
    Some(VideoDetail {
        id: video.id.clone(),
        poster: video.poster.clone(),
        play_url: url.to_string(),
        quality: quality.clone(),
        width: lenient_u64(item.width.as_ref()) as u32,
        height: lenient_u64(item.height.as_ref()) as u32,
        size,
        size_str: format_size(size),
    })
}

/// Looks up the playlist of one video. Any failure yields `None`.
#[instrument(skip_all, fields(video = %video.id))]
pub async fn fetch_video_detail(client: &Client, lens_base: &str, video: &VideoRef) -> Option<VideoDetail> {
    let url = format!("{}/{}", lens_base.trim_end_matches('/'), video.id);
    match fetch_json::<PlaylistResponse>(client, &url, &[]).await {
        Ok(playlist) => {
            let detail = select_quality(video, &playlist);
            if detail.is_none() {
                debug!("playlist has no playable entry");
            }
            detail
        }
        Err(err) => {
            debug!(error = %err, "playlist lookup failed");
            None
        }
    }
}
