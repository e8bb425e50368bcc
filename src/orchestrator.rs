//! Batch orchestration: turns a URL list into download jobs, runs them off
//! the caller's thread and reports back over a channel.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::downloader::{DownloadService, MediaInfo, YtDlp};
use crate::error::{BatchError, JobError};
use crate::events::{
    BatchCompletedEvent, BatchEvent, JobCompletedEvent, JobStartedEvent, Phase, ProgressSink,
};
use crate::model::{BatchOptions, BatchResult, DownloadJob, DownloadRequest, JobState, MediaFormat};
use crate::transcode::{self, Ffmpeg, Transcoder};
use crate::{naming, report, sidecar};

pub struct Orchestrator {
    runtime: Handle,
    downloader: Arc<dyn DownloadService>,
    transcoder: Arc<dyn Transcoder>,
    concurrency: usize,
    fetch_missing_cover: bool,
}

impl Orchestrator {
    /// Orchestrator backed by yt-dlp and ffmpeg as configured in `ctx`
    pub fn new(ctx: &AppContext) -> Self {
        Self::with_services(
            ctx.runtime.clone(),
            Arc::new(YtDlp::new(&ctx.tools, &ctx.config)),
            Arc::new(Ffmpeg::new(&ctx.tools, &ctx.config)),
        )
        .concurrency(ctx.config.concurrency)
        .fetch_missing_cover(ctx.config.fetch_missing_cover)
    }

    pub fn with_services(
        runtime: Handle,
        downloader: Arc<dyn DownloadService>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            runtime,
            downloader,
            transcoder,
            concurrency: 1,
            fetch_missing_cover: false,
        }
    }

    pub fn concurrency(mut self, jobs: usize) -> Self {
        self.concurrency = jobs.max(1);
        self
    }

    pub fn fetch_missing_cover(mut self, enabled: bool) -> Self {
        self.fetch_missing_cover = enabled;
        self
    }

    /// Validates the batch and starts it on a background task.
    ///
    /// Callers strip blank lines beforehand (see `urls::parse_url_list`);
    /// a blank entry here is rejected rather than skipped.
    pub fn submit_batch(
        &self,
        urls: Vec<String>,
        options: BatchOptions,
    ) -> Result<BatchHandle, BatchError> {
        if urls.is_empty() {
            return Err(BatchError::Validation("no URLs given".into()));
        }
        if let Some(pos) = urls.iter().position(|url| url.trim().is_empty()) {
            return Err(BatchError::Validation(format!("URL #{} is blank", pos + 1)));
        }
        if options.destination_root.as_os_str().is_empty() {
            return Err(BatchError::Validation("no destination folder given".into()));
        }

        let jobs: Vec<DownloadJob> = urls
            .iter()
            .map(|url| DownloadJob::new(DownloadRequest::new(url.trim(), &options)))
            .collect();
        let (tx, rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = Arc::new(Worker {
            downloader: Arc::clone(&self.downloader),
            transcoder: Arc::clone(&self.transcoder),
            tx,
            cancel: cancel.clone(),
            fetch_missing_cover: self.fetch_missing_cover,
        });

        log::info!(
            "batch of {} submitted ({} {}, into {})",
            jobs.len(),
            options.format,
            options.quality,
            options.destination_root.display()
        );
        let submitted = jobs.clone();
        let task = self
            .runtime
            .spawn(run_batch(worker, jobs, self.concurrency, options.destination_root));

        Ok(BatchHandle {
            submitted,
            cancel,
            events: rx,
            task,
        })
    }

    pub fn cancel(&self, handle: &BatchHandle) {
        handle.cancel();
    }
}

/// The caller's side of a running batch
pub struct BatchHandle {
    submitted: Vec<DownloadJob>,
    cancel: CancellationToken,
    events: UnboundedReceiver<BatchEvent>,
    task: JoinHandle<BatchResult>,
}

impl BatchHandle {
    pub fn len(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }

    /// Requests cooperative cancellation: queued jobs never start and the
    /// running one is interrupted.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("batch cancellation requested");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lets another task cancel the batch while this handle is busy
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Non-blocking; for polling from a UI frame loop
    pub fn try_next_event(&mut self) -> Option<BatchEvent> {
        self.events.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    pub async fn wait(self) -> BatchResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                log::error!("batch worker stopped unexpectedly: {e}");
                let jobs = self
                    .submitted
                    .into_iter()
                    .map(|mut job| {
                        job.transition(JobState::Running);
                        job.error_message = Some(format!("internal error: {e}"));
                        job.transition(JobState::Failed);
                        job
                    })
                    .collect();
                BatchResult { jobs }
            }
        }
    }
}

struct Worker {
    downloader: Arc<dyn DownloadService>,
    transcoder: Arc<dyn Transcoder>,
    tx: UnboundedSender<BatchEvent>,
    cancel: CancellationToken,
    fetch_missing_cover: bool,
}

async fn run_batch(
    worker: Arc<Worker>,
    jobs: Vec<DownloadJob>,
    concurrency: usize,
    destination_root: PathBuf,
) -> BatchResult {
    // buffered() yields in submission order whatever the concurrency
    let finished: Vec<DownloadJob> = stream::iter(jobs.into_iter().enumerate())
        .map(|(index, job)| Arc::clone(&worker).run_guarded(index, job))
        .buffered(concurrency.max(1))
        .collect()
        .await;
    let results = BatchResult { jobs: finished };

    log::info!("batch finished: {}", report::summary(&results));
    match report::write_failed_urls(&destination_root, &results).await {
        Ok(Some(path)) => log::info!("failed URLs saved to {}", path.display()),
        Ok(None) => {}
        Err(e) => log::warn!("could not save failed URLs: {e}"),
    }

    let _ = worker.tx.send(BatchEvent::BatchCompleted(BatchCompletedEvent {
        results: results.clone(),
    }));
    results
}

impl Worker {
    /// Runs one job on its own task so a panic inside an adapter fails that
    /// job instead of the whole batch.
    async fn run_guarded(self: Arc<Self>, index: usize, job: DownloadJob) -> DownloadJob {
        let fallback = job.clone();
        let worker = Arc::clone(&self);
        match tokio::spawn(async move { worker.run_job(index, job).await }).await {
            Ok(job) => job,
            Err(e) => {
                let mut job = fallback;
                job.transition(JobState::Running);
                job.error_message = Some(format!("internal error: {e}"));
                job.transition(JobState::Failed);
                self.finish(index, &job);
                job
            }
        }
    }

    async fn run_job(&self, index: usize, mut job: DownloadJob) -> DownloadJob {
        if self.cancel.is_cancelled() {
            job.transition(JobState::Canceled);
            self.finish(index, &job);
            return job;
        }

        job.transition(JobState::Running);
        let _ = self.tx.send(BatchEvent::JobStarted(JobStartedEvent {
            job_index: index,
            url: job.request.url.clone(),
        }));

        let sink = ProgressSink::new(index, self.tx.clone());
        let outcome = self.execute(&mut job, &sink).await;
        job.progress_percent = sink.last_percent();
        match outcome {
            Ok(dir) => {
                job.output_dir = Some(dir);
                job.transition(JobState::Succeeded);
            }
            Err(e) if e.is_cancellation() => {
                job.transition(JobState::Canceled);
            }
            Err(e) => {
                job.error_message = Some(e.to_string());
                job.transition(JobState::Failed);
            }
        }
        self.finish(index, &job);
        job
    }

    async fn execute(&self, job: &mut DownloadJob, sink: &ProgressSink) -> Result<PathBuf, JobError> {
        sink.report(0.0, Phase::Probing);
        let info = self.downloader.probe(&job.request.url, &self.cancel).await?;
        job.title = info.title.clone();

        let name = naming::folder_name(info.channel_name(), info.title.as_deref());
        let dir = naming::claim_dir(&job.request.destination_root, &name).await?;
        match self.fill_dir(&job.request, &info, &dir, sink).await {
            Ok(()) => Ok(dir),
            Err(e) => {
                // incomplete folders are never left behind
                if let Err(rm) = tokio::fs::remove_dir_all(&dir).await {
                    log::warn!("could not remove {}: {rm}", dir.display());
                }
                Err(e)
            }
        }
    }

    async fn fill_dir(
        &self,
        request: &DownloadRequest,
        info: &MediaInfo,
        dir: &std::path::Path,
        sink: &ProgressSink,
    ) -> Result<(), JobError> {
        let media = self
            .downloader
            .download(request, dir, sink, &self.cancel)
            .await?;
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        if request.format == MediaFormat::Audio && !transcode::is_audio_only(&media) {
            self.transcoder
                .extract_audio(&media, info.duration, sink, &self.cancel)
                .await?;
        }

        sidecar::write_sidecars(dir, info, self.fetch_missing_cover).await;
        Ok(())
    }

    fn finish(&self, index: usize, job: &DownloadJob) {
        let event = JobCompletedEvent {
            job_index: index,
            url: job.request.url.clone(),
            state: job.state,
            title: job.title.clone(),
            error_message: job.error_message.clone(),
            output_dir: job.output_dir.clone(),
        };
        match job.state {
            JobState::Failed => log::warn!("{}", event.history_line()),
            _ => log::info!("{}", event.history_line()),
        }
        let _ = self.tx.send(BatchEvent::JobCompleted(event));
    }
}
