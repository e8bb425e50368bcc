use std::io;
use std::path::{Path, PathBuf};

use crate::model::{BatchResult, JobState};

pub const FAILED_URLS_FILE: &str = "failed_urls.txt";

pub fn summary(result: &BatchResult) -> String {
    let mut line = format!(
        "{} jobs: {} succeeded, {} failed",
        result.len(),
        result.count(JobState::Succeeded),
        result.count(JobState::Failed)
    );
    let canceled = result.count(JobState::Canceled);
    if canceled > 0 {
        line.push_str(&format!(", {canceled} canceled"));
    }
    line
}

/// Saves the failed URLs one per line so they can be fed back as input.
/// Returns the file written, if any job failed.
pub async fn write_failed_urls(root: &Path, result: &BatchResult) -> io::Result<Option<PathBuf>> {
    let failed: Vec<&str> = result.failed_urls().collect();
    if failed.is_empty() {
        return Ok(None);
    }
    tokio::fs::create_dir_all(root).await?;
    let path = root.join(FAILED_URLS_FILE);
    let mut content = failed.join("\n");
    content.push('\n');
    tokio::fs::write(&path, content).await?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchOptions, DownloadJob, DownloadRequest, MediaFormat, Quality};

    fn result(states: &[JobState]) -> BatchResult {
        let options = BatchOptions {
            format: MediaFormat::Video,
            quality: Quality::Best,
            destination_root: PathBuf::from("/out"),
        };
        let jobs = states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                let mut job = DownloadJob::new(DownloadRequest::new(format!("https://youtu.be/{i}"), &options));
                job.state = *state;
                job
            })
            .collect();
        BatchResult { jobs }
    }

    #[test]
    fn summary_mentions_cancellations_only_when_present() {
        let r = result(&[JobState::Succeeded, JobState::Failed]);
        assert_eq!(summary(&r), "2 jobs: 1 succeeded, 1 failed");
        let r = result(&[JobState::Succeeded, JobState::Canceled, JobState::Canceled]);
        assert_eq!(summary(&r), "3 jobs: 1 succeeded, 0 failed, 2 canceled");
    }

    #[tokio::test]
    async fn failed_urls_file_lists_failures() {
        let dir = tempfile::tempdir().unwrap();
        let r = result(&[JobState::Failed, JobState::Succeeded, JobState::Failed]);
        let path = write_failed_urls(dir.path(), &r).await.unwrap().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "https://youtu.be/0\nhttps://youtu.be/2\n");
    }

    #[tokio::test]
    async fn no_file_without_failures() {
        let dir = tempfile::tempdir().unwrap();
        let r = result(&[JobState::Succeeded, JobState::Canceled]);
        assert_eq!(write_failed_urls(dir.path(), &r).await.unwrap(), None);
        assert!(!dir.path().join(FAILED_URLS_FILE).exists());
    }
}
