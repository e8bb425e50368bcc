use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::{MediaFormat, Quality};

pub const MAX_CONCURRENCY: usize = 8;

/// Application settings, read from a TOML file. Every field has a default so
/// a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Destination root for new batches
    pub output_dir: PathBuf,
    pub format: MediaFormat,
    pub quality: Quality,
    /// Codec ffmpeg encodes audio-only downloads to
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    /// Jobs running at once; 1 keeps strict submission order
    pub concurrency: usize,
    pub write_subtitles: bool,
    pub subtitle_langs: Vec<String>,
    /// Fetch the thumbnail over HTTP when yt-dlp did not leave one
    pub fetch_missing_cover: bool,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./downloads"),
            format: MediaFormat::Video,
            quality: Quality::Best,
            audio_codec: "mp3".to_string(),
            audio_bitrate_kbps: 192,
            concurrency: 1,
            write_subtitles: true,
            subtitle_langs: vec!["en".to_string()],
            fetch_missing_cover: true,
            ytdlp_path: None,
            ffmpeg_path: None,
        }
    }
}

impl AppConfig {
    /// Loads `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Invalid(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if !(32..=320).contains(&self.audio_bitrate_kbps) {
            return Err(ConfigError::Invalid(format!(
                "audio_bitrate_kbps must be between 32 and 320, got {}",
                self.audio_bitrate_kbps
            )));
        }
        if self.audio_codec.trim().is_empty() {
            return Err(ConfigError::Invalid("audio_codec must not be empty".into()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_dir must not be empty".into()));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "output: {}\nformat: {} ({})\naudio: {} @ {} kbps\nconcurrency: {}\nsubtitles: {}",
            self.output_dir.display(),
            self.format,
            self.quality,
            self.audio_codec,
            self.audio_bitrate_kbps,
            self.concurrency,
            if self.write_subtitles {
                self.subtitle_langs.join(",")
            } else {
                "off".to_string()
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.audio_codec, "mp3");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "format = \"audio\"\nquality = \"720p\"\naudio_bitrate_kbps = 320").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.format, MediaFormat::Audio);
        assert_eq!(config.quality, Quality::P720);
        assert_eq!(config.audio_bitrate_kbps, 320);
        assert_eq!(config.subtitle_langs, vec!["en".to_string()]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "quality = \"8k\"").unwrap();
        assert!(matches!(AppConfig::load(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = AppConfig {
            concurrency: 0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = AppConfig {
            audio_bitrate_kbps: 999,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = AppConfig {
            quality: Quality::P1080,
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            ..AppConfig::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
