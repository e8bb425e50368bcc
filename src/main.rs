//! Batch YouTube downloader: a desktop front end (and a headless mode) over
//! yt-dlp and ffmpeg.

// Desktop window
mod app;
// Settings file
mod config;
// Settings, helper binaries and runtime shared by everything else
mod context;
// yt-dlp adapter
mod downloader;
mod error;
// Messages from the batch worker to its caller
mod events;
// Console and per-run log file
mod logging;
// Data models for requests, jobs and results
mod model;
// Output folder naming
mod naming;
// Batch driver
mod orchestrator;
// Tool output parsing
mod progress;
mod report;
// Metadata and README written next to each download
mod sidecar;
// Cover images
mod thumbnail;
// Locating yt-dlp and ffmpeg
mod tools;
// ffmpeg adapter
mod transcode;
mod urls;

use clap::Parser;
use eframe::egui::Visuals;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use app::DownloaderApp;
use config::AppConfig;
use context::AppContext;
use events::BatchEvent;
use model::{BatchOptions, MediaFormat, Quality};
use orchestrator::Orchestrator;

#[derive(Parser, Debug)]
#[command(name = "tube_batch", version, about = "Batch downloader for YouTube videos and audio")]
struct Args {
    /// Text file with one URL per line; runs without a window
    #[arg(long)]
    input: Option<PathBuf>,

    /// Destination folder
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// video or audio
    #[arg(short, long)]
    format: Option<MediaFormat>,

    /// best, 1080p, 720p, 480p or worst
    #[arg(short, long)]
    quality: Option<Quality>,

    /// Jobs to run at once
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Audio bitrate in kbps for audio downloads, e.g. 128, 192 or 320
    #[arg(short = 'b', long, value_parser = clap::value_parser!(u32).range(32..=320))]
    bitrate: Option<u32>,

    /// Folder for the per-run log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Settings file
    #[arg(short, long, default_value = "tube_batch.toml")]
    config: PathBuf,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(jobs) = self.jobs {
            config.concurrency = jobs;
        }
        if let Some(bitrate) = self.bitrate {
            config.audio_bitrate_kbps = bitrate;
        }
    }
}

/// Program entry point: loads settings, starts the runtime and either runs a
/// URL file headless or opens the window.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(&args.log_dir);

    let mut config = AppConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;
    log::info!("settings:\n{}", config.summary());

    let rt = Runtime::new()?;
    let ctx = AppContext::new(config, rt.handle().clone());

    match &args.input {
        Some(input) => {
            let failed = rt.block_on(run_headless(&ctx, input))?;
            if failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        None => {
            let app = DownloaderApp::new(&ctx);
            eframe::run_native(
                "YouTube Batch Downloader",
                eframe::NativeOptions::default(),
                Box::new(|cc| {
                    cc.egui_ctx.set_visuals(Visuals::dark());
                    Box::new(app)
                }),
            )?;
            Ok(())
        }
    }
}

/// Downloads every URL in `input`, printing progress lines; Ctrl-C cancels.
/// Returns the number of failed jobs.
async fn run_headless(ctx: &AppContext, input: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let list = urls::read_url_file(input)?;
    let options = BatchOptions {
        format: ctx.config.format,
        quality: ctx.config.quality,
        destination_root: ctx.config.output_dir.clone(),
    };
    let mut handle = Orchestrator::new(ctx).submit_batch(list, options)?;

    let cancel = handle.cancel_token();
    let mut last_step = vec![None; handle.len()];
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(BatchEvent::JobStarted(started)) => {
                    println!("[{}] started {}", started.job_index + 1, started.url);
                }
                Some(BatchEvent::Progress(p)) => {
                    // one line per phase and ten percent step
                    let step = (p.phase, (p.percent / 10.0) as u32);
                    if let Some(last) = last_step.get_mut(p.job_index) {
                        if *last != Some(step) {
                            *last = Some(step);
                            println!("[{}] {} {:.0}%", p.job_index + 1, p.phase.label(), p.percent);
                        }
                    }
                }
                Some(BatchEvent::JobCompleted(done)) => println!("{}", done.history_line()),
                Some(BatchEvent::BatchCompleted(_)) | None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                println!("canceling…");
                cancel.cancel();
            }
        }
    }

    let result = handle.wait().await;
    println!("{}", report::summary(&result));
    Ok(result.count(model::JobState::Failed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let args = Args::try_parse_from([
            "tube_batch", "--input", "links.txt", "-f", "audio", "-q", "720p", "-j", "3", "-b", "320",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.format, MediaFormat::Audio);
        assert_eq!(config.quality, Quality::P720);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.audio_bitrate_kbps, 320);
        assert_eq!(config.output_dir, AppConfig::default().output_dir);
        assert_eq!(args.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn bitrate_outside_encoder_range_is_rejected() {
        assert!(Args::try_parse_from(["tube_batch", "-b", "999"]).is_err());
        assert!(Args::try_parse_from(["tube_batch", "-b", "16"]).is_err());
    }
}
