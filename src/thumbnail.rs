//! Cover images: normalizing whatever thumbnail yt-dlp left behind into
//! `cover.jpg`, fetching one when it left none, and decoding covers for the GUI.
//!
//! Everything here blocks; call it from a blocking thread.

use eframe::egui::ColorImage;
use image::ImageFormat;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const COVER_FILE: &str = "cover.jpg";
const THUMBNAIL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const PREVIEW_WIDTH: u32 = 160;
const PREVIEW_HEIGHT: u32 = 90;

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("cannot decode cover: {0}")]
    Image(#[from] image::ImageError),
    #[error("cannot write cover: {0}")]
    Io(#[from] io::Error),
}

/// Downloads a thumbnail, returning `None` on any HTTP error
pub fn fetch_thumbnail(url: &str) -> Option<Vec<u8>> {
    let resp = reqwest::blocking::get(url).ok()?.error_for_status().ok()?;
    resp.bytes().ok().map(|bytes| bytes.to_vec())
}

/// Re-encodes image bytes of any supported format as a JPEG at `target`
pub fn write_cover(bytes: &[u8], target: &Path) -> Result<(), CoverError> {
    let img = image::load_from_memory(bytes)?;
    img.to_rgb8().save_with_format(target, ImageFormat::Jpeg)?;
    Ok(())
}

fn find_thumbnail(dir: &Path) -> io::Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| THUMBNAIL_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if is_image && path.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Makes sure `dir` holds a `cover.jpg`. Returns its path, or `None` when no
/// image was available.
pub fn ensure_cover(
    dir: &Path,
    thumbnail_url: Option<&str>,
    fetch_missing: bool,
) -> Result<Option<PathBuf>, CoverError> {
    let cover = dir.join(COVER_FILE);
    if cover.is_file() {
        return Ok(Some(cover));
    }

    if let Some(existing) = find_thumbnail(dir)? {
        let bytes = std::fs::read(&existing)?;
        write_cover(&bytes, &cover)?;
        std::fs::remove_file(&existing)?;
        return Ok(Some(cover));
    }

    if !fetch_missing {
        return Ok(None);
    }
    let Some(bytes) = thumbnail_url.and_then(fetch_thumbnail) else {
        return Ok(None);
    };
    write_cover(&bytes, &cover)?;
    Ok(Some(cover))
}

/// Small preview of a cover for the job list
pub fn load_cover(path: &Path) -> Option<ColorImage> {
    let img = image::open(path)
        .ok()?
        .thumbnail(PREVIEW_WIDTH, PREVIEW_HEIGHT)
        .to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_png(path: &Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb([200, 30, 30]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn converts_left_over_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("Song.png"), 8, 8);

        let cover = ensure_cover(dir.path(), None, false).unwrap();
        assert_eq!(cover, Some(dir.path().join(COVER_FILE)));
        assert!(dir.path().join(COVER_FILE).is_file());
        assert!(!dir.path().join("Song.png").exists());
        assert_eq!(image::open(dir.path().join(COVER_FILE)).unwrap().width(), 8);
    }

    #[test]
    fn nothing_to_do_without_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Song.mp4"), b"not an image").unwrap();
        assert_eq!(ensure_cover(dir.path(), Some("http://unused"), false).unwrap(), None);
    }

    #[test]
    fn existing_cover_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("other.png"), 4, 4);
        std::fs::copy(dir.path().join("other.png"), dir.path().join(COVER_FILE)).unwrap();
        let cover = ensure_cover(dir.path(), None, false).unwrap();
        assert_eq!(cover, Some(dir.path().join(COVER_FILE)));
        assert!(dir.path().join("other.png").exists());
    }

    #[test]
    fn preview_fits_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        write_png(&path, 640, 360);
        let preview = load_cover(&path).unwrap();
        assert!(preview.size[0] <= PREVIEW_WIDTH as usize);
        assert!(preview.size[1] <= PREVIEW_HEIGHT as usize);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_cover(b"definitely not an image", &dir.path().join(COVER_FILE)).unwrap_err();
        assert!(matches!(err, CoverError::Image(_)));
    }
}
