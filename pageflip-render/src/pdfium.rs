use std::convert::TryFrom;
use std::env;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pageflip_core::{
    document_id_for_source, DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider,
    DocumentSource, PageSize, RenderImage, RenderRequest,
};
use tracing::{instrument, warn};

/// Runtime override for the Pdfium shared library location.
const LIBRARY_ENV: &str = "PAGEFLIP_PDFIUM_LIBRARY";

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    /// Binds Pdfium from `library` when given, then `$PAGEFLIP_PDFIUM_LIBRARY`,
    /// the working directory and finally the system library path.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let pdfium = match library {
            Some(path) => bind_pdfium_at(path)?,
            None => match bind_pdfium_from_env() {
                Some(pdfium) => pdfium,
                None => bind_pdfium_default()?,
            },
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    #[instrument(skip_all, fields(len = bytes.len(), %source))]
    async fn open_bytes(
        &self,
        bytes: Vec<u8>,
        source: DocumentSource,
    ) -> Result<Arc<dyn DocumentBackend>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .with_context(|| format!("failed to parse {}", source))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. The
        // backend keeps its own `Arc` to the same bindings and declares
        // `document` before `pdfium`, so the document is dropped first and the
        // borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let info = build_document_info(&document, source);
        let page_sizes = document
            .pages()
            .iter()
            .map(|page| PageSize::new(page.width().value, page.height().value))
            .collect();
        Ok(Arc::new(PdfiumDocument {
            document: Mutex::new(document),
            pdfium: Arc::clone(&self.pdfium),
            page_sizes,
            info,
        }))
    }
}

struct PdfiumDocument {
    document: Mutex<PdfDocument<'static>>,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
    /// Read once at open so size queries never wait on a rasterization
    /// holding `document`.
    page_sizes: Vec<PageSize>,
    info: DocumentInfo,
}

impl PdfiumDocument {
    fn with_page<R, F>(&self, page_number: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index = page_number
            .checked_sub(1)
            .and_then(|index| PdfPageIndex::try_from(index).ok())
            .ok_or_else(|| anyhow!("page {} is out of supported range", page_number))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page_number))?;
        f(&page)
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_number: usize) -> Result<PageSize> {
        cached_page_size(&self.page_sizes, page_number)
    }

    #[instrument(skip(self), fields(source = %self.info.source))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        self.with_page(request.page_number, |page| {
            let mut config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.01));
            if let Some([r, g, b]) = request.background {
                config = config.set_clear_color(PdfColor::new(r, g, b, 255));
            }
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_number))?;
            let pixels = bitmap.as_image().to_rgba8().into_raw();
            Ok(RenderImage {
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                pixels,
            })
        })
    }
}

fn cached_page_size(sizes: &[PageSize], page_number: usize) -> Result<PageSize> {
    page_number
        .checked_sub(1)
        .and_then(|index| sizes.get(index))
        .copied()
        .ok_or_else(|| anyhow!("page {} out of range", page_number))
}

fn build_document_info(document: &PdfDocument<'_>, source: DocumentSource) -> DocumentInfo {
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned())
        .filter(|t| !t.trim().is_empty());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned())
        .filter(|a| !a.trim().is_empty());

    DocumentInfo {
        id: document_id_for_source(&source),
        source,
        page_count,
        metadata: DocumentMetadata { title, author },
    }
}

pub type PdfRenderFactory = PdfiumRenderFactory;

fn bind_pdfium_at(path: &Path) -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(path)
        .map_err(|err| anyhow!("failed to load Pdfium from {}: {}", path.display(), err))?;
    Ok(Pdfium::new(bindings))
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = env::var_os(LIBRARY_ENV).filter(|path| !path.is_empty())?;
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from ${} ({}): {}",
                LIBRARY_ENV,
                Path::new(&path).display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set pdfium_library or ${} ({})",
                LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_sizes_are_answered_from_cache() {
        let sizes = vec![PageSize::new(612.0, 792.0), PageSize::new(842.0, 595.0)];
        assert_eq!(cached_page_size(&sizes, 1).unwrap(), PageSize::new(612.0, 792.0));
        assert_eq!(cached_page_size(&sizes, 2).unwrap(), PageSize::new(842.0, 595.0));
        assert!(cached_page_size(&sizes, 0).is_err());
        assert!(cached_page_size(&sizes, 3).is_err());
    }
}
