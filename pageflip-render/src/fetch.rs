use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;

use pageflip_core::DocumentSource;
use thiserror::Error;
use tracing::{debug, instrument};

const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes read so far and the expected total when the source announces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {source_label}: {error}")]
    Io {
        source_label: String,
        #[source]
        error: io::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("network error while fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("{0} is empty")]
    Empty(String),
}

/// Reads the whole document behind `source`, reporting progress after every
/// chunk. Paths are read from disk; URLs are fetched with a blocking GET.
#[instrument(skip_all, fields(%source))]
pub fn fetch_source(
    source: &DocumentSource,
    mut on_progress: impl FnMut(FetchProgress),
) -> Result<Vec<u8>, FetchError> {
    let label = source.label();
    let io_err = |error| FetchError::Io {
        source_label: label.clone(),
        error,
    };

    let bytes = match source {
        DocumentSource::Path(path) => {
            let file = File::open(path).map_err(io_err)?;
            let total = file.metadata().ok().map(|meta| meta.len());
            read_with_progress(file, total, &mut on_progress).map_err(io_err)?
        }
        DocumentSource::Url(url) => {
            let agent = ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .timeout_read(Duration::from_secs(30))
                .build();
            let response = agent.get(url).call().map_err(|err| match err {
                ureq::Error::Status(status, _) => FetchError::Status {
                    url: url.clone(),
                    status,
                },
                ureq::Error::Transport(transport) => FetchError::Network {
                    url: url.clone(),
                    message: transport.to_string(),
                },
            })?;
            let total = response
                .header("Content-Length")
                .and_then(|value| value.trim().parse::<u64>().ok());
            read_with_progress(response.into_reader(), total, &mut on_progress).map_err(io_err)?
        }
    };

    if bytes.is_empty() {
        return Err(FetchError::Empty(label));
    }
    debug!(len = bytes.len(), "fetched document");
    Ok(bytes)
}

fn read_with_progress<R: Read>(
    mut reader: R,
    total: Option<u64>,
    on_progress: &mut impl FnMut(FetchProgress),
) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(256 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        bytes.extend_from_slice(&chunk[..read]);
        on_progress(FetchProgress {
            loaded: bytes.len() as u64,
            total,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::io::Cursor;

    use tempfile::tempdir;

    #[test]
    fn reads_file_and_reports_progress_with_total() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let payload = vec![7u8; CHUNK_SIZE * 2 + 10];
        fs::write(&path, &payload).unwrap();

        let mut reports = Vec::new();
        let bytes = fetch_source(&DocumentSource::Path(path), |p| reports.push(p)).unwrap();

        assert_eq!(bytes, payload);
        assert!(!reports.is_empty());
        let last = reports.last().unwrap();
        assert_eq!(last.loaded, payload.len() as u64);
        assert_eq!(last.total, Some(payload.len() as u64));
        assert!(reports.windows(2).all(|w| w[0].loaded < w[1].loaded));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let source = DocumentSource::Path(dir.path().join("absent.pdf"));
        let err = fetch_source(&source, |_| {}).unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        fs::write(&path, b"").unwrap();
        let err = fetch_source(&DocumentSource::Path(path), |_| {}).unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));
    }

    #[test]
    fn unknown_length_reports_no_total() {
        let mut reports = Vec::new();
        let bytes =
            read_with_progress(Cursor::new(vec![1u8; 100]), None, &mut |p| reports.push(p))
                .unwrap();
        assert_eq!(bytes.len(), 100);
        assert_eq!(
            reports,
            vec![FetchProgress {
                loaded: 100,
                total: None
            }]
        );
    }
}
