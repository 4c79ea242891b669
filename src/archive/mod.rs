//! Bulk download of resolved media into a single ZIP archive.

use bytes::Bytes;
use chrono::{DateTime, TimeZone};
use reqwest::Client;
use std::io::{Cursor, Write};
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::error::{MSG_ARCHIVE_EMPTY, MSG_NOTHING_TO_ARCHIVE, TransferError};
use crate::fetcher::fetch_binary;
use crate::media::resolver::ResolvedMedia;

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];
const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("nothing to download")]
    NothingToArchive,

    /// Every download failed.
    #[error("none of the {failed} downloads succeeded")]
    NothingDownloaded { failed: usize },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ArchiveError> for TransferError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NothingToArchive => {
                TransferError::NoContentFound(MSG_NOTHING_TO_ARCHIVE.to_string())
            }
            ArchiveError::NothingDownloaded { .. } => {
                TransferError::NoContentFound(MSG_ARCHIVE_EMPTY.to_string())
            }
            other => TransferError::NetworkOrPage(other.to_string()),
        }
    }
}

/// A finished archive and how many downloads went into it.
#[derive(Debug, Clone)]
pub struct MediaArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Extension, with its dot, taken from the URL path when it is a known image type.
pub fn image_extension(url: &str) -> &'static str {
    let Ok(parsed) = Url::parse(url) else {
        return DEFAULT_IMAGE_EXTENSION;
    };
    let path = parsed.path().to_ascii_lowercase();
    path.rfind('.')
        .and_then(|dot| IMAGE_EXTENSIONS.iter().find(|ext| **ext == &path[dot..]))
        .copied()
        .unwrap_or(DEFAULT_IMAGE_EXTENSION)
}

pub fn archive_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("zhihu_media_{}.zip", at.format("%Y%m%d_%H%M"))
}

/// Writes named entries into an in-memory ZIP.
pub fn write_zip(entries: &[(String, Bytes)]) -> Result<Vec<u8>, ArchiveError> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        for (name, data) in entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
    }
    Ok(buffer)
}

/// Downloads every image and video of `media` and packs them with the text.
///
/// Layout: `content.txt`, `images/image_NNN.ext`, `videos/video_NNN.mp4`,
/// numbered from 1 in list order. Failed downloads are counted and skipped.
#[instrument(skip_all, fields(images = media.images.len(), videos = media.videos.len()))]
pub async fn build_archive<Tz: TimeZone>(
    client: &Client,
    media: &ResolvedMedia,
    now: &DateTime<Tz>,
) -> Result<MediaArchive, ArchiveError>
where
    Tz::Offset: std::fmt::Display,
{
    if media.images.is_empty() && media.videos.is_empty() {
        return Err(ArchiveError::NothingToArchive);
    }

    let mut entries = Vec::new();
    if !media.text_content.is_empty() {
        entries.push((
            "content.txt".to_string(),
            Bytes::from(media.text_content.clone()),
        ));
    }

    let downloads = media
        .images
        .iter()
        .enumerate()
        .map(|(i, img)| {
            let name = format!("images/image_{:03}{}", i + 1, image_extension(&img.canonical_url));
            (name, img.canonical_url.as_str())
        })
        .chain(media.videos.iter().enumerate().map(|(i, video)| {
            (format!("videos/video_{:03}.mp4", i + 1), video.play_url.as_str())
        }));

    let mut succeeded = 0;
    let mut failed = 0;
    for (name, url) in downloads {
        if url.trim().is_empty() {
            failed += 1;
            continue;
        }
        match fetch_binary(client, url).await {
            Ok(response) => {
                entries.push((name, response.body));
                succeeded += 1;
            }
            Err(err) => {
                debug!(%url, error = %err, "download failed");
                failed += 1;
            }
        }
    }

    if succeeded == 0 {
        return Err(ArchiveError::NothingDownloaded { failed });
    }

    let bytes = write_zip(&entries)?;
    info!(succeeded, failed, size = bytes.len(), "archive built");
    Ok(MediaArchive {
        file_name: archive_name(now),
        bytes,
        succeeded,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;

    #[test]
    fn extension_comes_from_the_path() {
        assert_eq!(image_extension("https://pic1.zhimg.com/v2-abc.PNG?source=1"), ".png");
        assert_eq!(image_extension("https://pic1.zhimg.com/v2-abc.jpeg"), ".jpeg");
        assert_eq!(image_extension("https://pic1.zhimg.com/v2-abc.svg"), ".jpg");
        assert_eq!(image_extension("https://pic1.zhimg.com/noext"), ".jpg");
        assert_eq!(image_extension("not a url"), ".jpg");
    }

    #[test]
    fn archive_name_is_minute_stamped() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 59).unwrap();
        assert_eq!(archive_name(&at), "zhihu_media_20240307_0905.zip");
    }

    #[test]
    fn zip_entries_read_back() {
        let bytes = write_zip(&[
            ("content.txt".to_string(), Bytes::from_static(b"hello")),
            ("images/image_001.png".to_string(), Bytes::from_static(b"\x89PNG")),
        ])
        .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut text = String::new();
        archive.by_name("content.txt").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn empty_media_is_rejected() {
        let err = build_archive(&Client::new(), &ResolvedMedia::default(), &Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NothingToArchive));
    }
}
