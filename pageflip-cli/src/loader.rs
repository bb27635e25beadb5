use std::sync::Arc;

use anyhow::{Context, Result};
use pageflip_core::{DocumentBackend, DocumentProvider, DocumentSource};
use pageflip_render::{fetch_source, FetchProgress};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

pub enum LoadMessage {
    Progress {
        generation: u64,
        progress: FetchProgress,
    },
    Loaded {
        generation: u64,
        document: Arc<dyn DocumentBackend>,
    },
    Failed {
        generation: u64,
        source: DocumentSource,
        error: anyhow::Error,
    },
}

/// Runs document loads in the background. Starting a load supersedes the
/// previous one; messages carry a generation so stale ones can be dropped.
pub struct Loader {
    provider: Arc<dyn DocumentProvider>,
    messages: UnboundedSender<LoadMessage>,
    generation: u64,
}

impl Loader {
    pub fn new(provider: Arc<dyn DocumentProvider>, messages: UnboundedSender<LoadMessage>) -> Self {
        Self {
            provider,
            messages,
            generation: 0,
        }
    }

    pub fn start(&mut self, source: DocumentSource) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let provider = Arc::clone(&self.provider);
        let messages = self.messages.clone();
        info!(%source, generation, "loading document");

        tokio::spawn(async move {
            let progress_messages = messages.clone();
            let on_progress = move |progress| {
                let _ = progress_messages.send(LoadMessage::Progress {
                    generation,
                    progress,
                });
            };
            let message = match load_document(provider.as_ref(), source.clone(), on_progress).await
            {
                Ok(document) => LoadMessage::Loaded {
                    generation,
                    document,
                },
                Err(error) => LoadMessage::Failed {
                    generation,
                    source,
                    error,
                },
            };
            let _ = messages.send(message);
        });
        generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

/// Reads the bytes behind `source` on the blocking pool, then opens them.
pub async fn load_document<F>(
    provider: &dyn DocumentProvider,
    source: DocumentSource,
    on_progress: F,
) -> Result<Arc<dyn DocumentBackend>>
where
    F: FnMut(FetchProgress) + Send + 'static,
{
    let fetch_from = source.clone();
    let bytes = tokio::task::spawn_blocking(move || fetch_source(&fetch_from, on_progress))
        .await
        .context("document fetch was aborted")??;
    debug!(len = bytes.len(), %source, "opening document");
    provider
        .open_bytes(bytes, source.clone())
        .await
        .with_context(|| format!("failed to open {}", source))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pageflip_core::{
        document_id_for_source, DocumentInfo, DocumentMetadata, PageSize, RenderImage,
        RenderRequest,
    };
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    /// Opens any byte string as a document with one page per byte.
    struct BytePages;

    struct BytePagesDocument {
        info: DocumentInfo,
    }

    impl DocumentBackend for BytePagesDocument {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_size(&self, _page_number: usize) -> Result<PageSize> {
            Ok(PageSize::new(10.0, 10.0))
        }

        fn render_page(&self, _request: RenderRequest) -> Result<RenderImage> {
            Ok(RenderImage::filled(1, 1, [0, 0, 0]))
        }
    }

    #[async_trait]
    impl DocumentProvider for BytePages {
        async fn open_bytes(
            &self,
            bytes: Vec<u8>,
            source: DocumentSource,
        ) -> Result<Arc<dyn DocumentBackend>> {
            if bytes.starts_with(b"broken") {
                anyhow::bail!("not a document");
            }
            Ok(Arc::new(BytePagesDocument {
                info: DocumentInfo {
                    id: document_id_for_source(&source),
                    source,
                    page_count: bytes.len(),
                    metadata: DocumentMetadata::default(),
                },
            }))
        }
    }

    #[tokio::test]
    async fn load_document_reports_progress_and_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("five.pdf");
        fs::write(&path, b"12345").unwrap();

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let document = load_document(&BytePages, DocumentSource::Path(path), move |p| {
            sink.lock().unwrap().push(p)
        })
        .await
        .unwrap();

        assert_eq!(document.page_count(), 5);
        let reports = reports.lock().unwrap();
        assert_eq!(
            reports.last().copied(),
            Some(FetchProgress {
                loaded: 5,
                total: Some(5)
            })
        );
    }

    #[tokio::test]
    async fn load_document_surfaces_provider_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"broken bytes").unwrap();

        let err = load_document(&BytePages, DocumentSource::Path(path), |_| {})
            .await
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("not a document"));
    }

    #[tokio::test]
    async fn newer_load_supersedes_older() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.pdf");
        let second = dir.path().join("b.pdf");
        fs::write(&first, b"aa").unwrap();
        fs::write(&second, b"bbb").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut loader = Loader::new(Arc::new(BytePages), tx);
        let old = loader.start(DocumentSource::Path(first));
        let new = loader.start(DocumentSource::Path(second));
        assert!(!loader.is_current(old));
        assert!(loader.is_current(new));

        let mut loaded = Vec::new();
        while loaded.len() < 2 {
            if let Some(LoadMessage::Loaded {
                generation,
                document,
            }) = rx.recv().await
            {
                loaded.push((generation, document.page_count()));
            }
        }
        loaded.sort();
        assert_eq!(loaded, vec![(old, 2), (new, 3)]);
    }
}
