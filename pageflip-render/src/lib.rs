mod executor;
mod fetch;
#[cfg(feature = "pdf")]
mod pdfium;

pub use executor::PoolExecutor;
pub use fetch::{fetch_source, FetchError, FetchProgress};
#[cfg(feature = "pdf")]
pub use pdfium::{PdfRenderFactory, PdfiumRenderFactory};
