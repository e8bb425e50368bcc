//! The external transcoder: ffmpeg, used to turn a video download into an
//! audio file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::downloader::has_extension;
use crate::error::JobError;
use crate::events::{Phase, ProgressSink};
use crate::progress::parse_ffmpeg_out_time;
use crate::tools::ToolPaths;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "opus", "ogg", "oga", "flac", "wav"];

/// Whether a downloaded file already carries audio only
pub fn is_audio_only(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Extracts the audio track of `input`; returns the new file. The input
    /// is removed once the output is complete.
    async fn extract_audio(
        &self,
        input: &Path,
        duration_secs: Option<f64>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, JobError>;
}

/// ffmpeg encoder name and file extension for a configured codec
fn encoder_for(codec: &str) -> (&str, &str) {
    match codec {
        "mp3" => ("libmp3lame", "mp3"),
        "aac" | "m4a" => ("aac", "m4a"),
        "opus" => ("libopus", "opus"),
        "vorbis" | "ogg" => ("libvorbis", "ogg"),
        "flac" => ("flac", "flac"),
        "wav" => ("pcm_s16le", "wav"),
        other => (other, other),
    }
}

pub struct Ffmpeg {
    binary: Option<PathBuf>,
    codec: String,
    bitrate_kbps: u32,
}

impl Ffmpeg {
    pub fn new(tools: &ToolPaths, config: &AppConfig) -> Self {
        Self {
            binary: tools.ffmpeg.clone(),
            codec: config.audio_codec.trim().to_ascii_lowercase(),
            bitrate_kbps: config.audio_bitrate_kbps,
        }
    }

    /// Checked on every call: the binary may vanish after startup
    fn binary(&self) -> Result<&Path, JobError> {
        match self.binary.as_deref() {
            Some(path) if path.is_file() => Ok(path),
            Some(path) => Err(JobError::Transcode(format!(
                "ffmpeg executable missing at {}",
                path.display()
            ))),
            None => Err(JobError::Transcode(
                "ffmpeg executable not found; install ffmpeg or set ffmpeg_path".into(),
            )),
        }
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        let (_, ext) = encoder_for(&self.codec);
        let output = input.with_extension(ext);
        if output == input {
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("audio");
            input.with_file_name(format!("{stem}.audio.{ext}"))
        } else {
            output
        }
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let (encoder, _) = encoder_for(&self.codec);
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        args.push(input.display().to_string());
        args.extend(["-vn", "-c:a", encoder].map(str::to_owned));
        if !matches!(encoder, "flac" | "pcm_s16le") {
            args.push("-b:a".to_owned());
            args.push(format!("{}k", self.bitrate_kbps));
        }
        args.extend(["-progress", "pipe:1", "-nostats"].map(str::to_owned));
        args.push(output.display().to_string());
        args
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn extract_audio(
        &self,
        input: &Path,
        duration_secs: Option<f64>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, JobError> {
        let binary = self.binary()?;
        let output = self.output_path(input);
        let args = self.args(input, &output);
        log::debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Transcode(format!("cannot run ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::Transcode("ffmpeg stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| JobError::Transcode("ffmpeg stderr unavailable".into()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut last = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    last = line;
                }
            }
            last
        });

        progress.report(0.0, Phase::Transcoding);
        let mut lines = BufReader::new(stdout).lines();
        let status = tokio::select! {
            status = async {
                while let Some(line) = lines.next_line().await? {
                    if let (Some(done), Some(total)) = (parse_ffmpeg_out_time(&line), duration_secs) {
                        if total > 0.0 {
                            progress.report((done / total * 100.0) as f32, Phase::Transcoding);
                        }
                    }
                }
                child.wait().await
            } => status.map_err(|e| JobError::Transcode(format!("ffmpeg did not finish: {e}"))),
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_reader.abort();
                let _ = tokio::fs::remove_file(&output).await;
                return Err(JobError::Cancelled);
            }
        }?;

        let last_stderr = stderr_reader.await.unwrap_or_default();
        if !status.success() {
            let _ = tokio::fs::remove_file(&output).await;
            let detail = if last_stderr.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                last_stderr
            };
            return Err(JobError::Transcode(detail));
        }

        progress.report(100.0, Phase::Transcoding);
        if let Err(e) = tokio::fs::remove_file(input).await {
            log::warn!("could not remove {} after transcoding: {e}", input.display());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn ffmpeg(binary: Option<PathBuf>, codec: &str) -> Ffmpeg {
        let config = AppConfig {
            audio_codec: codec.to_string(),
            audio_bitrate_kbps: 256,
            ..AppConfig::default()
        };
        Ffmpeg::new(&ToolPaths { ytdlp: None, ffmpeg: binary }, &config)
    }

    #[test]
    fn recognizes_audio_files() {
        assert!(is_audio_only(Path::new("/x/Song.m4a")));
        assert!(is_audio_only(Path::new("/x/Song.MP3")));
        assert!(!is_audio_only(Path::new("/x/Song.webm")));
        assert!(!is_audio_only(Path::new("/x/Song.mp4")));
    }

    #[test]
    fn builds_mp3_command() {
        let ff = ffmpeg(Some(PathBuf::from("/usr/bin/ffmpeg")), "mp3");
        let input = Path::new("/out/Song.mp4");
        let output = ff.output_path(input);
        assert_eq!(output, PathBuf::from("/out/Song.mp3"));
        let args = ff.args(input, &output);
        assert_eq!(args[..5], ["-hide_banner", "-nostdin", "-y", "-i", "/out/Song.mp4"]);
        assert!(args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "256k"]));
        assert_eq!(args.last().unwrap(), "/out/Song.mp3");
    }

    #[test]
    fn lossless_codecs_skip_bitrate() {
        let ff = ffmpeg(None, "FLAC");
        let output = ff.output_path(Path::new("/out/Song.webm"));
        assert_eq!(output, PathBuf::from("/out/Song.flac"));
        let args = ff.args(Path::new("/out/Song.webm"), &output);
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn same_extension_gets_distinct_output() {
        let ff = ffmpeg(None, "mp3");
        assert_eq!(
            ff.output_path(Path::new("/out/Song.mp3")),
            PathBuf::from("/out/Song.audio.mp3")
        );
    }

    #[cfg(unix)]
    fn stub_ffmpeg(dir: &Path, body: &str) -> Ffmpeg {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("ffmpeg");
        // the output path is always the last argument
        std::fs::write(&script, format!("#!/bin/sh\nfor last; do :; done\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        ffmpeg(Some(script), "mp3")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_replaces_the_input() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("Song.mp4");
        std::fs::write(&input, b"video").unwrap();
        let ff = stub_ffmpeg(
            bin.path(),
            "echo audio > \"$last\"\necho out_time_us=30000000\necho progress=end",
        );
        let (tx, mut rx) = unbounded_channel();

        let output = ff
            .extract_audio(&input, Some(60.0), &ProgressSink::new(0, tx), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, work.path().join("Song.mp3"));
        assert!(output.is_file());
        assert!(!input.exists());

        let mut percents = Vec::new();
        while let Ok(crate::events::BatchEvent::Progress(p)) = rx.try_recv() {
            assert_eq!(p.phase, Phase::Transcoding);
            percents.push(p.percent);
        }
        assert_eq!(percents, vec![0.0, 50.0, 100.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_run_leaves_no_output() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("Song.webm");
        std::fs::write(&input, b"video").unwrap();
        let ff = stub_ffmpeg(
            bin.path(),
            "echo partial > \"$last\"\necho 'Conversion failed!' >&2\nexit 1",
        );
        let (tx, _rx) = unbounded_channel();

        let err = ff
            .extract_audio(&input, None, &ProgressSink::new(0, tx), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Transcode(ref m) if m == "Conversion failed!"));
        assert!(!work.path().join("Song.mp3").exists());
        assert!(input.is_file());
    }

    #[tokio::test]
    async fn missing_binary_is_a_transcode_error() {
        let (tx, _rx) = unbounded_channel();
        let sink = ProgressSink::new(0, tx);
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("ffmpeg");

        for ff in [ffmpeg(None, "mp3"), ffmpeg(Some(gone), "mp3")] {
            let err = ff
                .extract_audio(Path::new("/out/Song.mp4"), None, &sink, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::Transcode(_)));
        }
    }
}
