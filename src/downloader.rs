//! The external download service: yt-dlp run as a child process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::JobError;
use crate::events::{Phase, ProgressSink};
use crate::model::{DownloadRequest, MediaFormat, Quality};
use crate::progress::{
    DOWNLOAD_TEMPLATE, FILEPATH_TEMPLATE, POSTPROCESS_TEMPLATE, StreamProgress, ToolLine,
    parse_ytdlp_line,
};
use crate::tools::ToolPaths;

pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "mov", "avi", "m4v", "flv", "3gp", "mp3", "m4a", "aac", "opus", "ogg",
    "oga", "flac", "wav",
];

/// The subset of yt-dlp's info JSON the app uses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub webpage_url: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

impl MediaInfo {
    pub fn channel_name(&self) -> Option<&str> {
        self.channel
            .as_deref()
            .or(self.uploader.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

#[async_trait]
pub trait DownloadService: Send + Sync {
    /// Reads the metadata of `url` without downloading media
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> Result<MediaInfo, JobError>;

    /// Downloads `request` into `target_dir` and returns the primary media file
    async fn download(
        &self,
        request: &DownloadRequest,
        target_dir: &Path,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, JobError>;
}

/// Maps format and quality tier onto a yt-dlp `-f` selector. Height tiers
/// take the best stream at or below the cap, which falls through to the next
/// lower available height; a video with nothing under the cap gets its
/// smallest stream.
pub fn format_selector(format: MediaFormat, quality: Quality) -> String {
    match (format, quality) {
        (MediaFormat::Audio, Quality::Worst) => "wa/w".to_string(),
        (MediaFormat::Audio, _) => "ba/b".to_string(),
        (MediaFormat::Video, Quality::Best) => "bv*[ext=mp4]+ba[ext=m4a]/bv*+ba/b".to_string(),
        (MediaFormat::Video, Quality::Worst) => "wv*+wa/w".to_string(),
        (MediaFormat::Video, tier) => {
            let h = tier.max_height().unwrap_or(u32::MAX);
            format!(
                "bv*[height<={h}][ext=mp4]+ba[ext=m4a]/bv*[height<={h}]+ba/b[height<={h}]/wv*+wa/w"
            )
        }
    }
}

fn expected_streams(format: MediaFormat) -> u32 {
    match format {
        MediaFormat::Video => 2,
        MediaFormat::Audio => 1,
    }
}

pub struct YtDlp {
    binary: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
    write_subtitles: bool,
    subtitle_langs: Vec<String>,
}

impl YtDlp {
    pub fn new(tools: &ToolPaths, config: &AppConfig) -> Self {
        Self {
            binary: tools.ytdlp.clone(),
            ffmpeg: tools.ffmpeg.clone(),
            write_subtitles: config.write_subtitles,
            subtitle_langs: config.subtitle_langs.clone(),
        }
    }

    fn binary(&self) -> Result<&Path, JobError> {
        self.binary
            .as_deref()
            .ok_or_else(|| JobError::Download("yt-dlp executable not found".into()))
    }

    fn download_args(&self, request: &DownloadRequest, target_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-playlist",
            "--newline",
            "--no-colors",
            "--progress",
            "--progress-template",
            DOWNLOAD_TEMPLATE,
            "--progress-template",
            POSTPROCESS_TEMPLATE,
            "--print",
            FILEPATH_TEMPLATE,
            "--write-thumbnail",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        args.push("-f".to_owned());
        args.push(format_selector(request.format, request.quality));

        if request.format == MediaFormat::Video {
            args.push("--merge-output-format".to_owned());
            args.push("mp4".to_owned());
        }
        if self.write_subtitles && !self.subtitle_langs.is_empty() {
            args.push("--write-subs".to_owned());
            args.push("--write-auto-subs".to_owned());
            args.push("--sub-langs".to_owned());
            args.push(self.subtitle_langs.join(","));
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            args.push("--ffmpeg-location".to_owned());
            args.push(ffmpeg.display().to_string());
        }

        args.push("-o".to_owned());
        args.push(target_dir.join("%(title)s.%(ext)s").display().to_string());
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl DownloadService for YtDlp {
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> Result<MediaInfo, JobError> {
        let mut command = Command::new(self.binary()?);
        command
            .args(["--dump-single-json", "--no-playlist", "--no-colors", url])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            out = command.output() => out.map_err(|e| JobError::Download(format!("cannot run yt-dlp: {e}")))?,
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
        };
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| JobError::Download(format!("unreadable metadata from yt-dlp: {e}")))
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        target_dir: &Path,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, JobError> {
        let args = self.download_args(request, target_dir);
        log::debug!("yt-dlp {}", args.join(" "));

        let mut child = Command::new(self.binary()?)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Download(format!("cannot run yt-dlp: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::Download("yt-dlp stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| JobError::Download("yt-dlp stderr unavailable".into()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        let mut streams = StreamProgress::new(expected_streams(request.format));
        let mut final_path: Option<PathBuf> = None;
        let mut lines = BufReader::new(stdout).lines();

        let status = tokio::select! {
            status = async {
                while let Some(line) = lines.next_line().await? {
                    match parse_ytdlp_line(&line) {
                        Some(ToolLine::Download(pct)) => {
                            if let Some(overall) = streams.update(pct) {
                                progress.report(overall, Phase::Downloading);
                            }
                        }
                        Some(ToolLine::PostProcess(name)) => {
                            log::debug!("job {}: post-processing with {name}", progress.job_index());
                            progress.report(100.0, Phase::PostProcessing);
                        }
                        Some(ToolLine::FinalPath(path)) => final_path = Some(path),
                        None => log::trace!("yt-dlp> {line}"),
                    }
                }
                child.wait().await
            } => status?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_reader.abort();
                return Err(JobError::Cancelled);
            }
        };

        let stderr_text = stderr_reader.await.unwrap_or_default();
        if !status.success() {
            return Err(classify_failure(&stderr_text));
        }

        match final_path {
            Some(path) if path.is_file() => Ok(path),
            _ => find_media_file(target_dir).await,
        }
    }
}

/// Largest media file in `dir`; used when yt-dlp did not print its final path
pub async fn find_media_file(dir: &Path) -> Result<PathBuf, JobError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(u64, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, MEDIA_EXTENSIONS) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        if best.as_ref().is_none_or(|(size, _)| meta.len() > *size) {
            best = Some((meta.len(), path));
        }
    }
    best.map(|(_, path)| path)
        .ok_or_else(|| JobError::Download("yt-dlp finished but left no media file".into()))
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

const UNAVAILABLE_MARKERS: &[&str] = &[
    "video unavailable",
    "private video",
    "this video is private",
    "has been removed",
    "not available in your country",
    "geo restrict",
    "copyright",
    "members-only",
    "sign in to confirm your age",
    "account associated with this video has been terminated",
    "unsupported url",
    "is not a valid url",
    "http error 404",
];

const NETWORK_MARKERS: &[&str] = &[
    "unable to download webpage",
    "timed out",
    "connection reset",
    "connection refused",
    "temporary failure in name resolution",
    "name or service not known",
    "getaddrinfo failed",
    "network is unreachable",
    "urlopen error",
    "http error 429",
    "http error 5",
    "certificate verify failed",
];

/// Turns yt-dlp's stderr into the job error taxonomy
pub fn classify_failure(stderr: &str) -> JobError {
    let lower = stderr.to_lowercase();
    let message = error_summary(stderr);

    if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        return JobError::UnavailableMedia(message);
    }
    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        return JobError::Network(message);
    }
    if lower.contains("ffmpeg") && (lower.contains("not found") || lower.contains("not installed")) {
        return JobError::Transcode(message);
    }
    if lower.contains("postprocessing:") {
        return JobError::Transcode(message);
    }
    JobError::Download(message)
}

fn error_summary(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("");
    let line = line.strip_prefix("ERROR:").unwrap_or(line).trim();
    if line.is_empty() {
        return "yt-dlp exited with an error".to_string();
    }
    line.chars().take(300).collect()
}
