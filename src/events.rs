use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc::UnboundedSender;

use crate::model::{BatchResult, JobState};

/// Which stage of a job a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Probing,
    Downloading,
    PostProcessing,
    Transcoding,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Probing => "fetching info",
            Phase::Downloading => "downloading",
            Phase::PostProcessing => "post-processing",
            Phase::Transcoding => "transcoding",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub job_index: usize,
    /// 0.0 to 100.0
    pub percent: f32,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStartedEvent {
    pub job_index: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletedEvent {
    pub job_index: usize,
    pub url: String,
    pub state: JobState,
    pub title: Option<String>,
    pub error_message: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl JobCompletedEvent {
    /// The single log/history line every finished job produces
    pub fn history_line(&self) -> String {
        let number = self.job_index + 1;
        match (&self.state, &self.error_message, &self.output_dir) {
            (JobState::Succeeded, _, Some(dir)) => {
                format!("[{number}] {} {} -> {}", self.state, self.url, dir.display())
            }
            (_, Some(message), _) => format!("[{number}] {} {}: {message}", self.state, self.url),
            _ => format!("[{number}] {} {}", self.state, self.url),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchCompletedEvent {
    pub results: BatchResult,
}

/// Everything the orchestrator tells its caller
#[derive(Debug, Clone)]
pub enum BatchEvent {
    JobStarted(JobStartedEvent),
    Progress(ProgressEvent),
    JobCompleted(JobCompletedEvent),
    BatchCompleted(BatchCompletedEvent),
}

/// Progress reporter handed to the external-service adapters for one job.
/// Sending never blocks; a caller that stopped listening is ignored.
/// Clones share the last reported percentage.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    job_index: usize,
    tx: UnboundedSender<BatchEvent>,
    /// f32 bits of the latest percentage
    last: Arc<AtomicU32>,
}

impl ProgressSink {
    pub fn new(job_index: usize, tx: UnboundedSender<BatchEvent>) -> Self {
        Self {
            job_index,
            tx,
            last: Arc::new(AtomicU32::new(0f32.to_bits())),
        }
    }

    pub fn job_index(&self) -> usize {
        self.job_index
    }

    pub fn report(&self, percent: f32, phase: Phase) {
        let percent = percent.clamp(0.0, 100.0);
        self.last.store(percent.to_bits(), Ordering::Relaxed);
        let _ = self.tx.send(BatchEvent::Progress(ProgressEvent {
            job_index: self.job_index,
            percent,
            phase,
        }));
    }

    pub fn last_percent(&self) -> f32 {
        f32::from_bits(self.last.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn history_line_for_each_outcome() {
        let mut event = JobCompletedEvent {
            job_index: 1,
            url: "https://youtu.be/x".into(),
            state: JobState::Succeeded,
            title: Some("Song".into()),
            error_message: None,
            output_dir: Some(PathBuf::from("/music/Chan - Song")),
        };
        assert_eq!(
            event.history_line(),
            "[2] SUCCEEDED https://youtu.be/x -> /music/Chan - Song"
        );

        event.state = JobState::Failed;
        event.output_dir = None;
        event.error_message = Some("media unavailable: This video is private.".into());
        assert_eq!(
            event.history_line(),
            "[2] FAILED https://youtu.be/x: media unavailable: This video is private."
        );

        event.state = JobState::Canceled;
        event.error_message = None;
        assert_eq!(event.history_line(), "[2] CANCELED https://youtu.be/x");
    }

    #[test]
    fn sink_clamps_and_tags_job() {
        let (tx, mut rx) = unbounded_channel();
        let sink = ProgressSink::new(3, tx);
        sink.report(140.0, Phase::Downloading);
        match rx.try_recv() {
            Ok(BatchEvent::Progress(event)) => {
                assert_eq!(event.job_index, 3);
                assert_eq!(event.percent, 100.0);
                assert_eq!(event.phase, Phase::Downloading);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sink_remembers_latest_percent() {
        let (tx, _rx) = unbounded_channel();
        let sink = ProgressSink::new(0, tx);
        assert_eq!(sink.last_percent(), 0.0);
        let clone = sink.clone();
        clone.report(62.5, Phase::Downloading);
        assert_eq!(sink.last_percent(), 62.5);
        sink.report(-3.0, Phase::Transcoding);
        assert_eq!(clone.last_percent(), 0.0);
    }

    #[test]
    fn sink_survives_dropped_receiver() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        ProgressSink::new(0, tx).report(10.0, Phase::Transcoding);
    }
}
