//! Parsing of the machine-readable lines yt-dlp and ffmpeg print while they work.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::PathBuf;

/// `--progress-template` for the download stage; lines come out as `dl: 42.1%`
pub const DOWNLOAD_TEMPLATE: &str = "download:dl:%(progress._percent_str)s";
/// `--progress-template` for post-processors; lines come out as `pp:Merger`
pub const POSTPROCESS_TEMPLATE: &str = "postprocess:pp:%(progress.postprocessor)s";
/// `--print` template emitting the final media path after all moves
pub const FILEPATH_TEMPLATE: &str = "after_move:file:%(filepath)s";

/// CSI sequences such as `ESC[0;94m`
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum ToolLine {
    /// Percent of the current stream, 0.0 to 100.0
    Download(f32),
    PostProcess(String),
    FinalPath(PathBuf),
}

pub fn parse_ytdlp_line(line: &str) -> Option<ToolLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix("dl:") {
        return parse_percent(rest).map(ToolLine::Download);
    }
    if let Some(rest) = line.strip_prefix("pp:") {
        let name = rest.trim();
        if name.is_empty() || name == "NA" {
            return None;
        }
        return Some(ToolLine::PostProcess(name.to_string()));
    }
    if let Some(rest) = line.strip_prefix("file:") {
        let path = rest.trim();
        if path.is_empty() || path == "NA" {
            return None;
        }
        return Some(ToolLine::FinalPath(PathBuf::from(path)));
    }
    None
}

fn parse_percent(raw: &str) -> Option<f32> {
    let cleaned = strip_ansi(raw);
    let number = cleaned.trim().strip_suffix('%')?.trim();
    number.parse::<f32>().ok().map(|v| v.clamp(0.0, 100.0))
}

fn strip_ansi(raw: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(raw, "")
}

/// Reads `out_time_us=` / `out_time_ms=` from `ffmpeg -progress` output.
/// Both keys carry microseconds.
pub fn parse_ffmpeg_out_time(line: &str) -> Option<f64> {
    let value = line
        .trim()
        .strip_prefix("out_time_us=")
        .or_else(|| line.trim().strip_prefix("out_time_ms="))?;
    let micros = value.trim().parse::<i64>().ok()?;
    (micros >= 0).then(|| micros as f64 / 1_000_000.0)
}

/// Folds per-stream percentages into one monotonic job percentage.
///
/// yt-dlp downloads video and audio as separate streams and restarts its
/// percentage for each; a drop in the reported value marks the next stream.
#[derive(Debug, Clone)]
pub struct StreamProgress {
    streams: u32,
    completed: u32,
    last: f32,
    reported: f32,
}

impl StreamProgress {
    pub fn new(expected_streams: u32) -> Self {
        Self {
            streams: expected_streams.max(1),
            completed: 0,
            last: 0.0,
            reported: 0.0,
        }
    }

    /// Returns the overall percentage when it moved forward
    pub fn update(&mut self, percent: f32) -> Option<f32> {
        if percent + 1.0 < self.last && self.completed + 1 < self.streams {
            self.completed += 1;
        }
        self.last = percent;
        let overall = (self.completed as f32 * 100.0 + percent) / self.streams as f32;
        if overall > self.reported {
            self.reported = overall;
            Some(overall)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_percent() {
        assert_eq!(parse_ytdlp_line("dl:  42.5%"), Some(ToolLine::Download(42.5)));
        assert_eq!(parse_ytdlp_line("dl:100%"), Some(ToolLine::Download(100.0)));
        assert_eq!(parse_ytdlp_line("dl:\u{1b}[0;94m  7.0%\u{1b}[0m"), Some(ToolLine::Download(7.0)));
    }

    #[test]
    fn strips_colour_codes() {
        assert_eq!(strip_ansi("\u{1b}[0;94m 12.3%\u{1b}[0m"), " 12.3%");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn ignores_unknown_percent() {
        assert_eq!(parse_ytdlp_line("dl: N/A"), None);
        assert_eq!(parse_ytdlp_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_ytdlp_line(""), None);
    }

    #[test]
    fn parses_postprocessor_and_path() {
        assert_eq!(
            parse_ytdlp_line("pp:Merger"),
            Some(ToolLine::PostProcess("Merger".into()))
        );
        assert_eq!(parse_ytdlp_line("pp:NA"), None);
        assert_eq!(
            parse_ytdlp_line("file:/out/Chan - Song/Song.mp4\r"),
            Some(ToolLine::FinalPath(PathBuf::from("/out/Chan - Song/Song.mp4")))
        );
    }

    #[test]
    fn parses_ffmpeg_time() {
        assert_eq!(parse_ffmpeg_out_time("out_time_us=2500000"), Some(2.5));
        assert_eq!(parse_ffmpeg_out_time("out_time_ms=1000000"), Some(1.0));
        assert_eq!(parse_ffmpeg_out_time("out_time_us=N/A"), None);
        assert_eq!(parse_ffmpeg_out_time("progress=continue"), None);
    }

    #[test]
    fn two_streams_share_the_bar() {
        let mut progress = StreamProgress::new(2);
        assert_eq!(progress.update(50.0), Some(25.0));
        assert_eq!(progress.update(100.0), Some(50.0));
        // audio stream restarts at zero
        assert_eq!(progress.update(0.0), None);
        assert_eq!(progress.update(50.0), Some(75.0));
        assert_eq!(progress.update(100.0), Some(100.0));
    }

    #[test]
    fn never_goes_backwards_past_last_stream() {
        let mut progress = StreamProgress::new(1);
        assert_eq!(progress.update(80.0), Some(80.0));
        assert_eq!(progress.update(10.0), None);
        assert_eq!(progress.update(90.0), Some(90.0));
    }
}
