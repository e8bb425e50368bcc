//! Files written next to the media: metadata JSON, a README and the cover.
//! Failures here are logged and never fail the job.

use serde::Serialize;
use std::path::Path;

use crate::downloader::MediaInfo;
use crate::thumbnail;

pub const METADATA_FILE: &str = "video_metadata.json";
pub const README_FILE: &str = "README.md";
const DESCRIPTION_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
struct VideoMetadata<'a> {
    title: &'a str,
    uploader: &'a str,
    upload_date: &'a str,
    duration: f64,
    view_count: u64,
    like_count: u64,
    url: &'a str,
}

impl<'a> From<&'a MediaInfo> for VideoMetadata<'a> {
    fn from(info: &'a MediaInfo) -> Self {
        Self {
            title: info.title.as_deref().unwrap_or("Unknown"),
            uploader: info.channel_name().unwrap_or("Unknown"),
            upload_date: info.upload_date.as_deref().unwrap_or("Unknown"),
            duration: info.duration.unwrap_or(0.0),
            view_count: info.view_count.unwrap_or(0),
            like_count: info.like_count.unwrap_or(0),
            url: info.webpage_url.as_deref().unwrap_or(""),
        }
    }
}

pub fn metadata_json(info: &MediaInfo) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&VideoMetadata::from(info))
}

pub fn readme(info: &MediaInfo) -> String {
    let description = info
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No description.");
    let mut shortened: String = description.chars().take(DESCRIPTION_LIMIT).collect();
    if description.chars().count() > DESCRIPTION_LIMIT {
        shortened.push_str("...");
    }
    format!(
        "# {}\n\n**Channel:** {}\n\n**Link:** {}\n\n## Description\n\n{}\n",
        info.title.as_deref().unwrap_or("Unknown"),
        info.channel_name().unwrap_or("Unknown"),
        info.webpage_url.as_deref().unwrap_or(""),
        shortened
    )
}

pub async fn write_sidecars(dir: &Path, info: &MediaInfo, fetch_missing_cover: bool) {
    match metadata_json(info) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(dir.join(METADATA_FILE), json).await {
                log::warn!("could not save metadata in {}: {e}", dir.display());
            }
        }
        Err(e) => log::warn!("could not serialize metadata: {e}"),
    }

    if let Err(e) = tokio::fs::write(dir.join(README_FILE), readme(info)).await {
        log::warn!("could not write README in {}: {e}", dir.display());
    }

    let cover_dir = dir.to_path_buf();
    let thumbnail_url = info.thumbnail.clone();
    let cover = tokio::task::spawn_blocking(move || {
        thumbnail::ensure_cover(&cover_dir, thumbnail_url.as_deref(), fetch_missing_cover)
    })
    .await;
    match cover {
        Ok(Ok(Some(_))) => {}
        Ok(Ok(None)) => log::info!("no cover image available for {}", dir.display()),
        Ok(Err(e)) => log::warn!("cover for {}: {e}", dir.display()),
        Err(e) => log::warn!("cover task failed: {e}"),
    }
}
