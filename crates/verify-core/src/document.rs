//! DOCX conversion and page rendering for one document
//!
//! State machine:
//!
//! ```text
//! Empty -> Converting -> Ready(page_count, current_page) -> Empty
//!                     \-> Failed -> Empty
//! ```
//!
//! Every conversion/open bumps a generation counter; results that come back
//! for an older generation are dropped. Each render cancels the one before
//! it, and a render's raster only reaches the surface if its token is still
//! live at that moment.

use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::ArtifactKind;
use verify_client::{DocumentConverter, FilePayload};

use crate::error::{DocumentError, RenderError, MSG_CONVERSION_FAILED, MSG_RENDER_FAILED};
use crate::files::{FileManager, LoadOutcome};
use crate::render::{CancellationToken, PdfBackend, PdfDocument, RenderSurface, Viewport};

/// Display scale applied to PDF points
pub const DEFAULT_RENDER_SCALE: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    Empty,
    Converting,
    Ready { page_count: u32, current_page: u32 },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentInfo {
    pub page_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderOutcome {
    Rendered(Viewport),
    /// Superseded by a newer render or by clearing; not an error
    Cancelled,
}

struct Inner {
    state: DocumentState,
    handle: Option<Arc<dyn PdfDocument>>,
    generation: u64,
    render: Option<CancellationToken>,
}

impl Inner {
    /// Start a new generation: cancel the render in flight and detach the
    /// current handle so the caller can release it outside the lock
    fn reset(&mut self, state: DocumentState) -> Option<Arc<dyn PdfDocument>> {
        self.generation += 1;
        if let Some(token) = self.render.take() {
            token.cancel();
        }
        self.state = state;
        self.handle.take()
    }
}

pub struct DocumentPipeline {
    backend: Arc<dyn PdfBackend>,
    converter: Arc<dyn DocumentConverter>,
    files: Arc<FileManager>,
    scale: f64,
    inner: Mutex<Inner>,
}

impl DocumentPipeline {
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        converter: Arc<dyn DocumentConverter>,
        files: Arc<FileManager>,
    ) -> Self {
        Self {
            backend,
            converter,
            files,
            scale: DEFAULT_RENDER_SCALE,
            inner: Mutex::new(Inner {
                state: DocumentState::Empty,
                handle: None,
                generation: 0,
                render: None,
            }),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn state(&self) -> DocumentState {
        self.inner.lock().state.clone()
    }

    pub fn page_count(&self) -> Option<u32> {
        match self.inner.lock().state {
            DocumentState::Ready { page_count, .. } => Some(page_count),
            _ => None,
        }
    }

    pub fn current_page(&self) -> Option<u32> {
        match self.inner.lock().state {
            DocumentState::Ready { current_page, .. } => Some(current_page),
            _ => None,
        }
    }

    /// Convert a DOCX through the remote converter and open the result.
    ///
    /// On success the DOCX and the PDF are stored in the file manager, as
    /// long as the verification selection has not changed meanwhile.
    pub async fn convert(
        &self,
        docx: FilePayload,
    ) -> Result<LoadOutcome<DocumentInfo>, DocumentError> {
        if !is_docx(&docx) {
            return Err(DocumentError::NotDocx(docx.name.clone()));
        }

        let ticket = self.files.ticket();
        let (generation, previous) = {
            let mut inner = self.inner.lock();
            let previous = inner.reset(DocumentState::Converting);
            (inner.generation, previous)
        };
        release(previous);
        tracing::debug!("Converting {} ({} bytes)", docx.name, docx.len());

        let pdf_bytes = match self.converter.convert_to_pdf(&docx).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if !self.fail(generation, MSG_CONVERSION_FAILED) {
                    return Ok(LoadOutcome::Stale);
                }
                tracing::warn!("Conversion of {} failed: {}", docx.name, e);
                return Err(DocumentError::Conversion(e));
            }
        };

        let pdf = FilePayload::new(
            ArtifactKind::Pdf.default_file_name(),
            ArtifactKind::Pdf.default_mime_type(),
            pdf_bytes,
        );
        let info = match self.open_generation(generation, &pdf).await {
            Ok(LoadOutcome::Committed(info)) => info,
            other => return other,
        };

        if !self.files.commit_documents(ticket, docx, pdf) {
            tracing::debug!("Document slots changed during conversion, artifacts not stored");
        }
        tracing::info!("Converted document: {} pages", info.page_count);
        Ok(LoadOutcome::Committed(info))
    }

    /// Enter `Ready` directly from an existing PDF artifact
    pub async fn open(&self, pdf: &FilePayload) -> Result<LoadOutcome<DocumentInfo>, DocumentError> {
        let (generation, previous) = {
            let mut inner = self.inner.lock();
            let previous = inner.reset(DocumentState::Converting);
            (inner.generation, previous)
        };
        release(previous);
        self.open_generation(generation, pdf).await
    }

    async fn open_generation(
        &self,
        generation: u64,
        pdf: &FilePayload,
    ) -> Result<LoadOutcome<DocumentInfo>, DocumentError> {
        let backend = self.backend.clone();
        let bytes = pdf.bytes.clone();
        let opened = tokio::task::spawn_blocking(move || backend.open(&bytes))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))
            .and_then(|result| result);

        let doc = match opened {
            Ok(doc) => doc,
            Err(e) => {
                if !self.fail(generation, MSG_RENDER_FAILED) {
                    return Ok(LoadOutcome::Stale);
                }
                tracing::error!("Failed to open {}: {}", pdf.name, e);
                return Err(DocumentError::Render(e));
            }
        };

        let page_count = doc.page_count();
        if page_count == 0 {
            if !self.fail(generation, MSG_RENDER_FAILED) {
                return Ok(LoadOutcome::Stale);
            }
            return Err(DocumentError::Render(RenderError::EmptyDocument));
        }

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            tracing::debug!("Dropping document opened for generation {}", generation);
            return Ok(LoadOutcome::Stale);
        }
        inner.handle = Some(doc);
        inner.state = DocumentState::Ready {
            page_count,
            current_page: 1,
        };
        Ok(LoadOutcome::Committed(DocumentInfo { page_count }))
    }

    /// Move to `Failed` if `generation` is still current
    fn fail(&self, generation: u64, message: &str) -> bool {
        let previous = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            let previous = inner.handle.take();
            inner.state = DocumentState::Failed {
                message: message.to_string(),
            };
            previous
        };
        release(previous);
        true
    }

    /// Render `page` onto `surface`, cancelling any render still in flight
    pub async fn render_page(
        &self,
        page: u32,
        surface: &dyn RenderSurface,
    ) -> Result<RenderOutcome, RenderError> {
        self.render_page_with(page, surface, CancellationToken::new())
            .await
    }

    /// [`render_page`](Self::render_page) with a token owned by the caller.
    ///
    /// Cancelling `token` abandons this render; so does starting another
    /// render or clearing the document.
    pub async fn render_page_with(
        &self,
        page: u32,
        surface: &dyn RenderSurface,
        token: CancellationToken,
    ) -> Result<RenderOutcome, RenderError> {
        let doc = {
            let mut inner = self.inner.lock();
            if let Some(previous) = inner.render.replace(token.clone()) {
                previous.cancel();
            }
            let page_count = match inner.state {
                DocumentState::Ready { page_count, .. } => page_count,
                _ => return Err(RenderError::NoDocument),
            };
            if page == 0 || page > page_count {
                return Err(RenderError::PageOutOfRange {
                    page,
                    count: page_count,
                });
            }
            inner.handle.clone().ok_or(RenderError::NoDocument)?
        };

        let viewport = Viewport::new(page, doc.page_size(page)?, self.scale);
        let task_token = token.clone();
        let rendered = tokio::task::spawn_blocking(move || doc.render(&viewport, &task_token))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))
            .and_then(|result| result);

        let raster = match rendered {
            Ok(raster) => raster,
            Err(_) if token.is_cancelled() => {
                tracing::debug!("Render of page {} superseded", page);
                return Ok(RenderOutcome::Cancelled);
            }
            Err(e) => {
                tracing::error!("Render of page {} failed: {}", page, e);
                return Err(e);
            }
        };

        // Checked under the lock so a newer render cannot slip in between
        let inner = self.inner.lock();
        if token.is_cancelled() {
            tracing::debug!("Render of page {} superseded", page);
            return Ok(RenderOutcome::Cancelled);
        }
        surface.resize(viewport.pixel_width(), viewport.pixel_height());
        surface.present(&viewport, raster);
        drop(inner);

        tracing::debug!(
            "Rendered page {} at {}x{}",
            page,
            viewport.pixel_width(),
            viewport.pixel_height()
        );
        Ok(RenderOutcome::Rendered(viewport))
    }

    pub async fn render_current(
        &self,
        surface: &dyn RenderSurface,
    ) -> Result<RenderOutcome, RenderError> {
        let page = self.current_page().ok_or(RenderError::NoDocument)?;
        self.render_page(page, surface).await
    }

    /// Viewport of `page` at the pipeline scale, without rendering
    pub fn page_viewport(&self, page: u32) -> Result<Viewport, RenderError> {
        let doc = self.inner.lock().handle.clone().ok_or(RenderError::NoDocument)?;
        Ok(Viewport::new(page, doc.page_size(page)?, self.scale))
    }

    pub fn next(&self) -> Option<u32> {
        self.navigate(|current, _| current.saturating_add(1))
    }

    pub fn previous(&self) -> Option<u32> {
        self.navigate(|current, _| current.saturating_sub(1))
    }

    pub fn go_to(&self, page: u32) -> Option<u32> {
        self.navigate(|_, _| page)
    }

    /// Apply `step` and clamp into `[1, page_count]`
    fn navigate(&self, step: impl FnOnce(u32, u32) -> u32) -> Option<u32> {
        let mut inner = self.inner.lock();
        match &mut inner.state {
            DocumentState::Ready {
                page_count,
                current_page,
            } => {
                *current_page = step(*current_page, *page_count).clamp(1, *page_count);
                Some(*current_page)
            }
            _ => None,
        }
    }

    /// Back to `Empty`: cancels the render in flight, releases the handle
    /// and orphans any conversion still running
    pub fn clear(&self) {
        let previous = self.inner.lock().reset(DocumentState::Empty);
        release(previous);
        tracing::debug!("Document pipeline cleared");
    }
}

impl Drop for DocumentPipeline {
    fn drop(&mut self) {
        let previous = self.inner.get_mut().reset(DocumentState::Empty);
        release(previous);
    }
}

fn release(handle: Option<Arc<dyn PdfDocument>>) {
    if let Some(doc) = handle {
        tracing::debug!("Releasing document handle ({} pages)", doc.page_count());
        drop(doc);
    }
}

fn is_docx(file: &FilePayload) -> bool {
    file.mime_type == ArtifactKind::Docx.default_mime_type()
        || file.name.to_ascii_lowercase().ends_with(".docx")
}
