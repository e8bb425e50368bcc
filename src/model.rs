use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What the user wants to keep from a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[default]
    Video,
    /// Audio only; transcoded when the raw download still carries video
    Audio,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 2] = [MediaFormat::Video, MediaFormat::Audio];

    pub fn label(self) -> &'static str {
        match self {
            MediaFormat::Video => "video",
            MediaFormat::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" | "mp4" => Ok(MediaFormat::Video),
            "audio" | "mp3" => Ok(MediaFormat::Audio),
            other => Err(format!("unknown format '{other}' (expected video or audio)")),
        }
    }
}

/// Named quality tier. Height tiers select the best stream at or below the
/// labeled height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "worst")]
    Worst,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Best,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::Worst,
    ];

    /// Height cap in pixels, `None` for the open-ended tiers
    pub fn max_height(self) -> Option<u32> {
        match self {
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::Best | Quality::Worst => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::Worst => "worst",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .into_iter()
            .find(|q| q.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown quality '{s}' (expected best, 1080p, 720p, 480p or worst)"))
    }
}

/// Settings shared by every URL of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub format: MediaFormat,
    pub quality: Quality,
    pub destination_root: PathBuf,
}

/// One URL plus the batch settings, frozen at submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
    pub destination_root: PathBuf,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, options: &BatchOptions) -> Self {
        Self {
            url: url.into(),
            format: options.format,
            quality: options.quality,
            destination_root: options.destination_root.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Canceled)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
        }
    }

    fn can_become(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Queued, JobState::Running) | (JobState::Queued, JobState::Canceled) => true,
            (JobState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a single URL inside a batch
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub request: DownloadRequest,
    pub state: JobState,
    /// 0.0 to 100.0
    pub progress_percent: f32,
    pub error_message: Option<String>,
    pub title: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl DownloadJob {
    pub fn new(request: DownloadRequest) -> Self {
        Self {
            request,
            state: JobState::Queued,
            progress_percent: 0.0,
            error_message: None,
            title: None,
            output_dir: None,
        }
    }

    /// Moves the job along its state machine. Returns `false` and leaves the
    /// job untouched when the move is not allowed.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_become(next) {
            log::warn!(
                "ignoring {} -> {} for {}",
                self.state,
                next,
                self.request.url
            );
            return false;
        }
        self.state = next;
        if next == JobState::Succeeded {
            self.progress_percent = 100.0;
        }
        true
    }
}

/// Final job states in submission order
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub jobs: Vec<DownloadJob>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|job| job.state == state).count()
    }

    pub fn states(&self) -> Vec<JobState> {
        self.jobs.iter().map(|job| job.state).collect()
    }

    pub fn failed_urls(&self) -> impl Iterator<Item = &str> {
        self.jobs
            .iter()
            .filter(|job| job.state == JobState::Failed)
            .map(|job| job.request.url.as_str())
    }
}
