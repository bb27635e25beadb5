use std::path::PathBuf;

use anyhow::{anyhow, Result};
use pageflip_core::DocumentSource;
use url::Url;

/// Interprets a command-line argument, prompt entry or dropped text as a
/// document source. `http(s)` URLs are fetched, `file://` URLs and anything
/// else are treated as local paths.
pub fn parse_source(raw: &str) -> Result<DocumentSource> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("no document given"));
    }
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(DocumentSource::Url(url.to_string()))
        }
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(DocumentSource::Path)
            .map_err(|_| anyhow!("{} does not name a local file", raw)),
        _ => Ok(DocumentSource::Path(PathBuf::from(raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_urls_are_fetched() {
        assert_eq!(
            parse_source("https://example.com/slides/deck.pdf").unwrap(),
            DocumentSource::Url("https://example.com/slides/deck.pdf".to_string())
        );
    }

    #[test]
    fn file_urls_become_paths() {
        assert_eq!(
            parse_source("file:///tmp/My%20Slides.pdf").unwrap(),
            DocumentSource::Path(PathBuf::from("/tmp/My Slides.pdf"))
        );
        assert!(parse_source("file://remote-host/share/a.pdf").is_err());
    }

    #[test]
    fn plain_text_is_a_path() {
        assert_eq!(
            parse_source(" SUNUM.pdf ").unwrap(),
            DocumentSource::Path(PathBuf::from("SUNUM.pdf"))
        );
        assert_eq!(
            parse_source("/home/me/notes.pdf").unwrap(),
            DocumentSource::Path(PathBuf::from("/home/me/notes.pdf"))
        );
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(parse_source("   ").is_err());
    }
}
