use std::io;
use std::path::Path;

/// One URL per line; blank lines and `#` comments are dropped
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_url_file(path: &Path) -> io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_url_list(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn strips_blank_lines() {
        let urls = parse_url_list("https://valid1\n\n   \nhttps://valid2\n");
        assert_eq!(urls, vec!["https://valid1", "https://valid2"]);
    }

    #[test]
    fn skips_comments_and_trims() {
        let urls = parse_url_list("# my list\r\n  https://youtu.be/a  \r\n#https://youtu.be/b\r\n");
        assert_eq!(urls, vec!["https://youtu.be/a"]);
    }

    #[test]
    fn empty_text_gives_nothing() {
        assert!(parse_url_list("").is_empty());
        assert!(parse_url_list("\n\n# only comments\n").is_empty());
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "https://youtu.be/one").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "https://youtu.be/two").unwrap();
        let urls = read_url_file(file.path()).unwrap();
        assert_eq!(urls.len(), 2);
    }
}
