use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use uuid::Uuid;

pub mod config;
pub mod geometry;
pub mod render;
pub mod transition;
pub mod viewer;

pub use config::{ConfigError, ViewerConfig};
pub use geometry::{BoxSize, PageSize, RasterPlan};
pub use render::{
    CancelToken, PageRenderer, RenderError, RenderExecutor, RenderJob, RenderKind, RenderOutcome,
    RenderTask, Surface, SurfaceId, TaskId, ThumbnailRenderer,
};
pub use transition::{
    Direction, Phase, TransitionController, TransitionRecord, TransitionSignal, TransitionTimings,
};
pub use viewer::{progress_percent, scrub_target, Command, Viewer, ViewerEvent};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1d6c2e-8a47-5b09-9e2c-61d4a7b0c5f3").expect("valid namespace UUID")
});

static LOAD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns a fresh id for a document opened from `source`.
///
/// Every load gets its own id, even when the same file is reopened, so render
/// results that belong to a replaced handle can be told apart from current ones.
pub fn document_id_for_source(source: &DocumentSource) -> DocumentId {
    let sequence = LOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}#{}", source.label(), sequence);
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, name.as_bytes())
}

/// Where the bytes of a document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Url(String),
}

impl DocumentSource {
    pub fn label(&self) -> String {
        match self {
            DocumentSource::Path(path) => path.display().to_string(),
            DocumentSource::Url(url) => url.clone(),
        }
    }

    /// Short name for status lines: the file name, or the last URL segment.
    pub fn display_name(&self) -> String {
        match self {
            DocumentSource::Path(path) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Url(url) => url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or(url)
                .to_owned(),
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub source: DocumentSource,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// A single rasterization request. Page numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_number: usize,
    pub scale: f32,
    pub background: Option<[u8; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    /// An opaque RGBA image filled with `rgb`.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    /// Native size of a page in PDF points. Called from the event loop, so
    /// it must not wait for a rasterization in progress.
    fn page_size(&self, page_number: usize) -> Result<PageSize>;

    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;

    fn page_count(&self) -> usize {
        self.info().page_count
    }
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open_bytes(
        &self,
        bytes: Vec<u8>,
        source: DocumentSource,
    ) -> Result<Arc<dyn DocumentBackend>>;
}
