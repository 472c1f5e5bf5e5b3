use std::env;
use std::fs;
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfreader_core::{
    content_fingerprint, DocumentEngine, DocumentHandle, DocumentMetadata, DocumentSource,
    LoadError, PageIndex, PageViewport, RenderImage,
};
use tracing::{debug, instrument, warn};

const LIBRARY_PATH_ENV: &str = "PDFREADER_PDFIUM_LIBRARY_PATH";

pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentEngine for PdfiumEngine {
    #[instrument(skip(self, source), fields(source = %source.display_name()))]
    async fn load(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentHandle>, LoadError> {
        let name = source.display_name();
        let bytes = match source {
            DocumentSource::Path(path) => {
                fs::read(path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?
            }
            DocumentSource::Bytes { data, .. } => data.to_vec(),
        };
        let handle = PdfiumHandle::open(Arc::clone(&self.pdfium), bytes).map_err(|err| {
            LoadError::Engine {
                name: name.clone(),
                message: format!("{err:#}"),
            }
        })?;
        debug!(pages = handle.page_count, "pdfium document loaded");
        Ok(Arc::new(handle))
    }
}

struct PdfiumHandle {
    document: Mutex<PdfDocument<'static>>,
    page_count: usize,
    fingerprints: Vec<String>,
    metadata: DocumentMetadata,
    // bindings borrowed by `document`; must stay the last field
    _pdfium: Arc<Pdfium>,
}

impl PdfiumHandle {
    fn open(pdfium: Arc<Pdfium>, bytes: Vec<u8>) -> Result<Self> {
        let fingerprints = vec![content_fingerprint(&bytes)];
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .context("pdfium rejected the document")?;
        // SAFETY: the returned PdfDocument borrows the Pdfium bindings owned by `_pdfium`.
        // The handle stores both, and `document` is declared before `_pdfium`, so it is
        // dropped first and the borrowed bindings outlive it.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
        let metadata = read_metadata(&document);
        Ok(Self {
            document: Mutex::new(document),
            page_count,
            fingerprints,
            metadata,
            _pdfium: pdfium,
        })
    }

    fn with_page<R, F>(&self, page: PageIndex, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index = page
            .checked_sub(1)
            .filter(|index| *index < self.page_count)
            .ok_or_else(|| anyhow!("page {} out of range", page))?;
        let index: PdfPageIndex = index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page))?;
        let document = self.document.lock();
        let pdf_page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page))?;
        f(&pdf_page)
    }
}

impl DocumentHandle for PdfiumHandle {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn fingerprints(&self) -> &[String] {
        &self.fingerprints
    }

    fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    fn page_viewport(&self, page: PageIndex, scale: f32) -> Result<PageViewport> {
        self.with_page(page, |pdf_page| {
            Ok(PageViewport {
                width: pdf_page.width().value * scale,
                height: pdf_page.height().value * scale,
            })
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, page: PageIndex, scale: f32) -> Result<RenderImage> {
        self.with_page(page, |pdf_page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = pdf_page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", page))?;
            let image = bitmap.as_image().to_rgba8();
            Ok(RenderImage {
                width: image.width(),
                height: image.height(),
                pixels: image.into_raw(),
            })
        })
    }
}

impl Drop for PdfiumHandle {
    fn drop(&mut self) {
        debug!(
            fingerprint = self.fingerprints.first().map(String::as_str),
            "closing pdfium document"
        );
    }
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().trim().to_owned())
        .filter(|t| !t.is_empty());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().trim().to_owned())
        .filter(|t| !t.is_empty());
    DocumentMetadata { title, author }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match env::var(LIBRARY_PATH_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(
                    "failed to load Pdfium from {}={}: {}",
                    LIBRARY_PATH_ENV, path, err
                );
                None
            }
        },
        _ => None,
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
                "failed to bind to a pdfium library; set {} or install it ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}
