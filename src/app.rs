//! Desktop front end: URL list, destination, format and quality pickers, and
//! a live view of the running batch.

use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions};
use eframe::{App, Frame};
use rfd::FileDialog;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::context::AppContext;
use crate::events::{BatchEvent, JobCompletedEvent, Phase};
use crate::model::{BatchOptions, JobState, MediaFormat, Quality};
use crate::orchestrator::{BatchHandle, Orchestrator};
use crate::{report, thumbnail, urls};

/// What the job list shows for one URL
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub url: String,
    pub title: Option<String>,
    pub state: JobState,
    /// 0.0 to 1.0, as the progress bar wants it
    pub progress: f32,
    pub phase: Option<Phase>,
    pub error: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl JobRow {
    fn queued(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            state: JobState::Queued,
            progress: 0.0,
            phase: None,
            error: None,
            output_dir: None,
        }
    }

    fn status_text(&self) -> String {
        match (self.state, self.phase, &self.error) {
            (JobState::Running, Some(phase), _) => format!("⬇️ {}", phase.label()),
            (JobState::Running, None, _) => "⬇️ starting".to_string(),
            (JobState::Queued, _, _) => "⏳ queued".to_string(),
            (JobState::Succeeded, _, _) => "✅ done".to_string(),
            (JobState::Failed, _, Some(e)) => format!("❌ {e}"),
            (JobState::Failed, _, None) => "❌ failed".to_string(),
            (JobState::Canceled, _, _) => "⏹ canceled".to_string(),
        }
    }
}

/// Folds one event into the rows. Returns the history line for finished jobs.
pub fn apply_event(rows: &mut [JobRow], event: &BatchEvent) -> Option<String> {
    match event {
        BatchEvent::JobStarted(started) => {
            if let Some(row) = rows.get_mut(started.job_index) {
                row.state = JobState::Running;
            }
            None
        }
        BatchEvent::Progress(p) => {
            if let Some(row) = rows.get_mut(p.job_index) {
                // a new phase restarts the bar
                if row.phase != Some(p.phase) || p.percent / 100.0 > row.progress {
                    row.progress = p.percent / 100.0;
                }
                row.phase = Some(p.phase);
            }
            None
        }
        BatchEvent::JobCompleted(done) => {
            if let Some(row) = rows.get_mut(done.job_index) {
                finish_row(row, done);
            }
            Some(done.history_line())
        }
        BatchEvent::BatchCompleted(_) => None,
    }
}

fn finish_row(row: &mut JobRow, done: &JobCompletedEvent) {
    row.state = done.state;
    row.error = done.error_message.clone();
    row.output_dir = done.output_dir.clone();
    if done.title.is_some() {
        row.title = done.title.clone();
    }
    if done.state == JobState::Succeeded {
        row.progress = 1.0;
    }
}

/// Bitrates offered when downloading audio
pub const AUDIO_BITRATES: [u32; 3] = [128, 192, 320];

/// Context for one batch: the app's settings with the bitrate picked in the window
pub fn batch_context(base: &AppContext, audio_bitrate_kbps: u32) -> AppContext {
    let mut ctx = base.clone();
    ctx.config.audio_bitrate_kbps = audio_bitrate_kbps;
    ctx
}

pub struct DownloaderApp {
    ctx: AppContext,
    orchestrator: Orchestrator,
    url_input: String,
    download_folder: String,
    format: MediaFormat,
    quality: Quality,
    audio_bitrate: u32,
    rows: Vec<JobRow>,
    batch: Option<BatchHandle>,
    history: Vec<String>,
    status: String,
    /// Cover previews by job index
    thumbnails: HashMap<usize, TextureHandle>,
    /// Decoded covers waiting to be uploaded as textures
    thumbnail_results: Arc<Mutex<Vec<(usize, ColorImage)>>>,
}

impl DownloaderApp {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            ctx: ctx.clone(),
            orchestrator: Orchestrator::new(ctx),
            url_input: String::new(),
            download_folder: ctx.config.output_dir.display().to_string(),
            format: ctx.config.format,
            quality: ctx.config.quality,
            audio_bitrate: ctx.config.audio_bitrate_kbps,
            rows: Vec::new(),
            batch: None,
            history: Vec::new(),
            status: "Ready".to_string(),
            thumbnails: HashMap::new(),
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn is_busy(&self) -> bool {
        self.batch.is_some()
    }

    fn start(&mut self) {
        let list = urls::parse_url_list(&self.url_input);
        let options = BatchOptions {
            format: self.format,
            quality: self.quality,
            destination_root: PathBuf::from(self.download_folder.trim()),
        };
        self.orchestrator = Orchestrator::new(&batch_context(&self.ctx, self.audio_bitrate));
        match self.orchestrator.submit_batch(list.clone(), options) {
            Ok(handle) => {
                self.rows = list.iter().map(|url| JobRow::queued(url)).collect();
                self.thumbnails.clear();
                self.status = format!("Downloading {} item(s)…", handle.len());
                self.batch = Some(handle);
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    fn import(&mut self) {
        let Some(path) = FileDialog::new().add_filter("Text", &["txt"]).pick_file() else {
            return;
        };
        match urls::read_url_file(&path) {
            Ok(list) => {
                if !self.url_input.trim().is_empty() && !self.url_input.ends_with('\n') {
                    self.url_input.push('\n');
                }
                self.url_input.push_str(&list.join("\n"));
                self.status = format!("Imported {} URL(s) from {}", list.len(), path.display());
            }
            Err(e) => self.status = format!("Could not read {}: {e}", path.display()),
        }
    }

    fn poll_batch(&mut self, ctx: &egui::Context) {
        let mut events = Vec::new();
        if let Some(batch) = self.batch.as_mut() {
            while let Some(event) = batch.try_next_event() {
                events.push(event);
            }
        }
        let mut finished = false;
        for event in events {
            if let BatchEvent::JobCompleted(done) = &event {
                if let Some(dir) = done.output_dir.as_deref() {
                    self.load_cover(ctx, done.job_index, dir);
                }
            }
            if let BatchEvent::BatchCompleted(done) = &event {
                self.status = report::summary(&done.results);
                finished = true;
            }
            if let Some(line) = apply_event(&mut self.rows, &event) {
                self.history.push(line);
            }
        }
        if finished {
            self.batch = None;
        }
    }

    fn load_cover(&self, ctx: &egui::Context, index: usize, dir: &Path) {
        let cover = dir.join(thumbnail::COVER_FILE);
        let results = Arc::clone(&self.thumbnail_results);
        let ctx = ctx.clone();
        self.ctx.runtime.spawn_blocking(move || {
            if let Some(img) = thumbnail::load_cover(&cover) {
                if let Ok(mut pending) = results.lock() {
                    pending.push((index, img));
                }
                ctx.request_repaint();
            }
        });
    }

    fn upload_thumbnails(&mut self, ctx: &egui::Context) {
        let Ok(mut pending) = self.thumbnail_results.lock() else {
            return;
        };
        for (index, img) in pending.drain(..) {
            let tex = ctx.load_texture(format!("cover-{index}"), img, TextureOptions::default());
            self.thumbnails.insert(index, tex);
        }
    }

    fn jobs_panel(&self, ui: &mut egui::Ui) {
        ui.heading("Jobs");
        ui.separator();
        egui::ScrollArea::vertical()
            .id_source("jobs")
            .auto_shrink([false; 2])
            .max_height(ui.available_height() * 0.65)
            .show(ui, |ui| {
                for (index, row) in self.rows.iter().enumerate() {
                    ui.group(|ui| {
                        ui.horizontal(|ui| {
                            if let Some(tex) = self.thumbnails.get(&index) {
                                ui.image(tex);
                            }
                            ui.vertical(|ui| {
                                ui.label(row.title.as_deref().unwrap_or(&row.url));
                                ui.label(row.status_text());
                                ui.add(egui::ProgressBar::new(row.progress).show_percentage());
                                if let Some(dir) = row.output_dir.as_deref() {
                                    if ui.button("Open Folder").clicked() {
                                        open_folder(dir);
                                    }
                                }
                            });
                        });
                    });
                }
            });

        ui.separator();
        ui.label("History");
        egui::ScrollArea::vertical()
            .id_source("history")
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.history {
                    ui.monospace(line);
                }
            });
    }
}

impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_batch(ctx);
        self.upload_thumbnails(ctx);

        egui::SidePanel::right("jobs_panel")
            .min_width(360.0)
            .show(ctx, |ui| self.jobs_panel(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Batch Downloader");

            ui.horizontal(|ui| {
                ui.label("URLs, one per line:");
                if ui.add_enabled(!self.is_busy(), egui::Button::new("Import…")).clicked() {
                    self.import();
                }
            });
            ui.add_enabled(
                !self.is_busy(),
                egui::TextEdit::multiline(&mut self.url_input)
                    .desired_rows(10)
                    .desired_width(f32::INFINITY),
            );

            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.text_edit_singleline(&mut self.download_folder);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = FileDialog::new()
                        .set_directory(&self.download_folder)
                        .pick_folder()
                    {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            ui.horizontal(|ui| {
                egui::ComboBox::from_label("Format")
                    .selected_text(self.format.label())
                    .show_ui(ui, |ui| {
                        for format in MediaFormat::ALL {
                            ui.selectable_value(&mut self.format, format, format.label());
                        }
                    });
                egui::ComboBox::from_label("Quality")
                    .selected_text(self.quality.label())
                    .show_ui(ui, |ui| {
                        for quality in Quality::ALL {
                            ui.selectable_value(&mut self.quality, quality, quality.label());
                        }
                    });
                if self.format == MediaFormat::Audio {
                    egui::ComboBox::from_label("Bitrate")
                        .selected_text(format!("{} kbps", self.audio_bitrate))
                        .show_ui(ui, |ui| {
                            for kbps in AUDIO_BITRATES {
                                ui.selectable_value(&mut self.audio_bitrate, kbps, format!("{kbps} kbps"));
                            }
                        });
                }
            });

            ui.horizontal(|ui| {
                if ui.add_enabled(!self.is_busy(), egui::Button::new("Download")).clicked() {
                    self.start();
                }
                let cancelable = self.batch.as_ref().is_some_and(|b| !b.is_cancelled());
                if ui.add_enabled(cancelable, egui::Button::new("Cancel")).clicked() {
                    if let Some(batch) = &self.batch {
                        self.orchestrator.cancel(batch);
                        self.status = "Canceling…".to_string();
                    }
                }
            });

            ui.separator();
            ui.label(&self.status);
        });

        if self.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

fn open_folder(dir: &Path) {
    let folder = dir.to_path_buf();
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";
        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            log::warn!("could not open {}: {e}", folder.display());
        }
    });
}
