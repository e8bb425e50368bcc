//! Locating the external binaries: yt-dlp for downloads, ffmpeg for merging
//! and audio extraction.

use rust_embed::RustEmbed;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// Optional bundled copies of the helper binaries. Drop `yt-dlp`/`ffmpeg`
/// (or the `.exe` variants) into `assets/` before building to ship them.
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Bundled;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

impl ToolPaths {
    pub fn resolve(config: &AppConfig) -> Self {
        let paths = Self {
            ytdlp: locate("yt-dlp", config.ytdlp_path.as_deref()),
            ffmpeg: locate("ffmpeg", config.ffmpeg_path.as_deref()),
        };
        match &paths.ytdlp {
            Some(path) => log::info!("using yt-dlp at {}", path.display()),
            None => log::warn!("yt-dlp not found; every download will fail"),
        }
        match &paths.ffmpeg {
            Some(path) => log::info!("using ffmpeg at {}", path.display()),
            None => log::warn!("ffmpeg not found; audio extraction and stream merging will fail"),
        }
        paths
    }
}

fn executable_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{tool}.exe")
    } else {
        tool.to_string()
    }
}

/// Order: configured path, bundled copy, `./ffmpeg/bin`, `./bin`, `PATH`
fn locate(tool: &str, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        log::warn!("configured {tool} path {} does not exist", path.display());
    }
    let bin = executable_name(tool);
    match extract_bundled(&bin) {
        Ok(Some(path)) => return Some(path),
        Ok(None) => {}
        Err(e) => log::warn!("could not unpack bundled {bin}: {e}"),
    }
    let local = [
        Path::new("ffmpeg").join("bin").join(&bin),
        Path::new("bin").join(&bin),
    ];
    if let Some(found) = local.into_iter().find(|p| p.is_file()) {
        return Some(found);
    }
    search_path(tool, std::env::var_os("PATH"))
}

fn extract_bundled(bin: &str) -> std::io::Result<Option<PathBuf>> {
    let Some(asset) = Bundled::get(bin) else {
        return Ok(None);
    };
    let target = std::env::temp_dir().join("tube_batch").join(bin);
    let up_to_date = std::fs::metadata(&target)
        .map(|meta| meta.len() == asset.data.len() as u64)
        .unwrap_or(false);
    if !up_to_date {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&target)?;
        file.write_all(&asset.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
        }
    }
    Ok(Some(target))
}

fn search_path(tool: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(tool, path_var, cwd).ok()
}
