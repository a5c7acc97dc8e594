//! PDF rendering surface
//!
//! The pipeline talks to a pluggable [`PdfBackend`]. [`LopdfBackend`] reads
//! page geometry with lopdf and produces page-sized blank rasters; a
//! rasterizing backend can be dropped in behind the same traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RenderError;

/// Largest raster a render may allocate, in pixels
pub const MAX_RASTER_PIXELS: u64 = 64 * 1024 * 1024;

/// US Letter, used when a page carries no MediaBox
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Shared cancellation flag for one render
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Page size in PDF points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// A page scaled for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Page number (1-indexed)
    pub page: u32,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl Viewport {
    pub fn new(page: u32, size: PageSize, scale: f64) -> Self {
        Self {
            page,
            width: size.width * scale,
            height: size.height * scale,
            scale,
        }
    }

    pub fn pixel_width(&self) -> u32 {
        self.width.ceil().max(1.0) as u32
    }

    pub fn pixel_height(&self) -> u32 {
        self.height.ceil().max(1.0) as u32
    }
}

/// RGBA8 pixels of one rendered page
#[derive(Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// An opened document
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_size(&self, page: u32) -> Result<PageSize, RenderError>;

    /// Produce the raster for `viewport`. Implementations may poll `cancel`
    /// and bail out with [`RenderError::Cancelled`].
    fn render(&self, viewport: &Viewport, cancel: &CancellationToken)
        -> Result<Raster, RenderError>;
}

pub trait PdfBackend: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Arc<dyn PdfDocument>, RenderError>;
}

/// Where rendered pages are shown
pub trait RenderSurface: Send + Sync {
    /// Match the surface to the viewport's intrinsic size
    fn resize(&self, width: u32, height: u32);

    fn present(&self, viewport: &Viewport, raster: Raster);
}

#[derive(Debug, Default)]
struct FrameState {
    width: u32,
    height: u32,
    frame: Option<(Viewport, Raster)>,
    presented: Vec<u32>,
}

/// In-memory surface keeping the last presented frame
#[derive(Debug, Default)]
pub struct FrameBuffer {
    state: Mutex<FrameState>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    pub fn current_page(&self) -> Option<u32> {
        self.state.lock().frame.as_ref().map(|(v, _)| v.page)
    }

    pub fn current_viewport(&self) -> Option<Viewport> {
        self.state.lock().frame.as_ref().map(|(v, _)| *v)
    }

    /// Pages presented so far, in order
    pub fn presented(&self) -> Vec<u32> {
        self.state.lock().presented.clone()
    }
}

impl RenderSurface for FrameBuffer {
    fn resize(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
    }

    fn present(&self, viewport: &Viewport, raster: Raster) {
        let mut state = self.state.lock();
        state.presented.push(viewport.page);
        state.frame = Some((*viewport, raster));
    }
}

/// Geometry-only backend on top of lopdf.
///
/// Page sizes and page counts are real. Rendered rasters are white
/// placeholders of the right size: no page content is drawn.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(&self, bytes: &[u8]) -> Result<Arc<dyn PdfDocument>, RenderError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| RenderError::Load(e.to_string()))?;

        let pages = doc
            .get_pages()
            .into_values()
            .map(|page_id| page_size(&doc, page_id))
            .collect::<Result<Vec<_>, _>>()?;
        if pages.is_empty() {
            return Err(RenderError::EmptyDocument);
        }

        tracing::debug!("Opened PDF with {} pages", pages.len());
        Ok(Arc::new(LopdfDocument { pages }))
    }
}

struct LopdfDocument {
    pages: Vec<PageSize>,
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32) -> Result<PageSize, RenderError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .copied()
            .ok_or(RenderError::PageOutOfRange {
                page,
                count: self.page_count(),
            })
    }

    /// Placeholder raster: opaque white at the viewport's pixel size
    fn render(
        &self,
        viewport: &Viewport,
        cancel: &CancellationToken,
    ) -> Result<Raster, RenderError> {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        let (width, height) = (viewport.pixel_width(), viewport.pixel_height());
        let pixels = width as u64 * height as u64;
        if pixels > MAX_RASTER_PIXELS {
            return Err(RenderError::Backend(format!(
                "{}x{} raster exceeds {} pixels",
                width, height, MAX_RASTER_PIXELS
            )));
        }
        Ok(Raster {
            width,
            height,
            pixels: vec![0xFF; pixels as usize * 4],
        })
    }
}

/// MediaBox of a page, inherited from the parent node if needed
fn page_size(doc: &lopdf::Document, page_id: lopdf::ObjectId) -> Result<PageSize, RenderError> {
    let page = doc
        .get_object(page_id)
        .and_then(|obj| obj.as_dict())
        .map_err(|e| RenderError::Load(format!("page object: {}", e)))?;

    let media_box = match page.get(b"MediaBox") {
        Ok(obj) => parse_rect(doc, obj)?,
        Err(_) => parent_media_box(doc, page)?.unwrap_or(DEFAULT_MEDIA_BOX),
    };

    let [_, _, width, height] = media_box;
    if !(width > 0.0 && height > 0.0) {
        return Err(RenderError::Load(format!(
            "degenerate MediaBox {:?}",
            media_box
        )));
    }
    Ok(PageSize { width, height })
}

fn parent_media_box(
    doc: &lopdf::Document,
    page: &lopdf::Dictionary,
) -> Result<Option<[f64; 4]>, RenderError> {
    let parent = page
        .get(b"Parent")
        .and_then(|p| p.as_reference())
        .and_then(|id| doc.get_object(id))
        .and_then(|obj| obj.as_dict());
    match parent.and_then(|dict| dict.get(b"MediaBox")) {
        Ok(obj) => parse_rect(doc, obj).map(Some),
        Err(_) => Ok(None),
    }
}

/// `[x1, y1, x2, y2]` to `[x, y, width, height]`
fn parse_rect(doc: &lopdf::Document, obj: &lopdf::Object) -> Result<[f64; 4], RenderError> {
    let arr = match obj {
        lopdf::Object::Array(a) => a,
        lopdf::Object::Reference(id) => doc
            .get_object(*id)
            .and_then(|o| o.as_array())
            .map_err(|e| RenderError::Load(format!("MediaBox reference: {}", e)))?,
        _ => return Err(RenderError::Load("MediaBox is not an array".to_string())),
    };
    if arr.len() != 4 {
        return Err(RenderError::Load(format!(
            "MediaBox has {} elements, expected 4",
            arr.len()
        )));
    }

    let mut values = [0.0f64; 4];
    for (i, obj) in arr.iter().enumerate() {
        values[i] = extract_number(doc, obj)?;
    }
    Ok([
        values[0],
        values[1],
        values[2] - values[0],
        values[3] - values[1],
    ])
}

fn extract_number(doc: &lopdf::Document, obj: &lopdf::Object) -> Result<f64, RenderError> {
    match obj {
        lopdf::Object::Integer(i) => Ok(*i as f64),
        lopdf::Object::Real(r) => Ok(*r as f64),
        lopdf::Object::Reference(id) => {
            let resolved = doc
                .get_object(*id)
                .map_err(|e| RenderError::Load(format!("MediaBox value: {}", e)))?;
            extract_number(doc, resolved)
        }
        _ => Err(RenderError::Load("Expected number in MediaBox".to_string())),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::dictionary;

    /// PDF with one page per `(width, height)`; `None` puts the MediaBox on
    /// the page tree instead of the page
    pub fn pdf(pages: &[Option<(i64, i64)>]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids: Vec<lopdf::Object> = Vec::new();
        for size in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            };
            if let Some((w, h)) = size {
                page.set("MediaBox", vec![0.into(), 0.into(), (*w).into(), (*h).into()]);
            }
            kids.push(doc.add_object(page).into());
        }

        let tree = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, lopdf::Object::Dictionary(tree));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}
