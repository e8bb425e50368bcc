//! Output folder naming: `<channel> - <title>`, cleaned for every common
//! filesystem, and claimed atomically so two jobs never share a folder.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

const MAX_COMPONENT_CHARS: usize = 100;
const MAX_COLLISION_SUFFIX: u32 = 9_999;

static ILLEGAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static UNUSUAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-.()\[\]&]").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn clean_component(raw: &str) -> String {
    let without_illegal = ILLEGAL.replace_all(raw, "");
    let replaced = UNUSUAL.replace_all(&without_illegal, "_");
    let collapsed = SPACES.replace_all(&replaced, " ");
    let truncated: String = collapsed.trim().chars().take(MAX_COMPONENT_CHARS).collect();
    // Windows refuses names ending in a dot or space
    truncated.trim_end_matches(['.', ' ']).to_string()
}

/// Folder name for one video; missing or empty parts become `Unknown`
pub fn folder_name(channel: Option<&str>, title: Option<&str>) -> String {
    let part = |value: Option<&str>| {
        value
            .map(clean_component)
            .filter(|cleaned| !cleaned.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    };
    format!("{} - {}", part(channel), part(title))
}

/// Creates `root/name`, or `root/name (1)`, `root/name (2)`, … when taken.
///
/// `create_dir` fails on an existing entry, so the first success is ours even
/// with several jobs racing for the same name.
pub async fn claim_dir(root: &Path, name: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(root).await?;
    for counter in 0..=MAX_COLLISION_SUFFIX {
        let candidate = if counter == 0 {
            root.join(name)
        } else {
            root.join(format!("{name} ({counter})"))
        };
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free folder name left for '{name}'"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_illegal_characters() {
        assert_eq!(clean_component(r#"a<b>c:d"e/f\g|h?i*j"#), "abcdefghij");
    }

    #[test]
    fn replaces_symbols_and_collapses_spaces() {
        assert_eq!(clean_component("Rock   &  Roll!  (Live) [HD]"), "Rock & Roll_ (Live) [HD]");
        assert_eq!(clean_component("  Über Café  "), "Über Café");
    }

    #[test]
    fn limits_length_and_trailing_dots() {
        let long = "x".repeat(250);
        assert_eq!(clean_component(&long).chars().count(), 100);
        assert_eq!(clean_component("Ends with dots..."), "Ends with dots");
    }

    #[test]
    fn folder_name_uses_fallbacks() {
        assert_eq!(folder_name(Some("Chan"), Some("Song: Part 1")), "Chan - Song Part 1");
        assert_eq!(folder_name(None, Some("Song")), "Unknown - Song");
        assert_eq!(folder_name(Some("???"), None), "Unknown - Unknown");
    }

    #[tokio::test]
    async fn collisions_get_numbered() {
        let root = tempfile::tempdir().unwrap();
        let first = claim_dir(root.path(), "Chan - Song").await.unwrap();
        let second = claim_dir(root.path(), "Chan - Song").await.unwrap();
        let third = claim_dir(root.path(), "Chan - Song").await.unwrap();
        assert_eq!(first, root.path().join("Chan - Song"));
        assert_eq!(second, root.path().join("Chan - Song (1)"));
        assert_eq!(third, root.path().join("Chan - Song (2)"));
        assert!(second.is_dir());
    }

    #[tokio::test]
    async fn creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let dir = claim_dir(&nested, "x - y").await.unwrap();
        assert!(dir.is_dir());
    }
}
