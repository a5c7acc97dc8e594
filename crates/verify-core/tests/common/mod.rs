//! In-memory fakes of the backend ports and the PDF backend
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ArtifactKind, Verification, VerificationId};
use tokio::sync::Semaphore;
use verify_client::{
    ApiError, DocumentConverter, FilePayload, UploadBody, UploadReply, UploadRequest,
    VerificationApi,
};
use verify_core::error::RenderError;
use verify_core::render::{CancellationToken, PageSize, Raster};
use verify_core::{PdfBackend, PdfDocument, Viewport};

/// Blocks callers until permits are added
#[derive(Default)]
pub struct Gate {
    semaphore: Option<Semaphore>,
    waiting: AtomicUsize,
}

impl Gate {
    pub fn closed() -> Self {
        Self {
            semaphore: Some(Semaphore::new(0)),
            waiting: AtomicUsize::new(0),
        }
    }

    pub async fn pass(&self) {
        if let Some(semaphore) = &self.semaphore {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            semaphore.acquire().await.unwrap().forget();
        }
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        if let Some(semaphore) = &self.semaphore {
            semaphore.add_permits(1024);
        }
    }

    /// Yield until at least one caller is parked at the gate
    pub async fn wait_for_caller(&self) {
        while self.waiting() == 0 {
            tokio::task::yield_now().await;
        }
    }
}

pub struct FakeApi {
    pub details: Mutex<HashMap<VerificationId, Verification>>,
    pub artifacts: Mutex<HashMap<(VerificationId, ArtifactKind), Vec<u8>>>,
    pub reply: Mutex<Result<UploadReply, u16>>,
    pub uploads: Mutex<Vec<(VerificationId, UploadRequest)>>,
    pub artifact_gate: Gate,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::with_gate(Gate::default())
    }

    pub fn with_gate(artifact_gate: Gate) -> Self {
        Self {
            details: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(HashMap::new()),
            reply: Mutex::new(Ok(UploadReply {
                http_status: 200,
                body: UploadBody {
                    status: Some("completed".to_string()),
                    ..UploadBody::default()
                },
            })),
            uploads: Mutex::new(Vec::new()),
            artifact_gate,
        }
    }

    pub fn insert(&self, verification: Verification) {
        self.details
            .lock()
            .insert(verification.id.clone(), verification);
    }

    pub fn insert_artifact(&self, id: &VerificationId, kind: ArtifactKind, bytes: Vec<u8>) {
        self.artifacts.lock().insert((id.clone(), kind), bytes);
    }

    pub fn set_reply(&self, http_status: u16, json: &str) {
        let body = serde_json::from_str(json).unwrap();
        *self.reply.lock() = Ok(UploadReply { http_status, body });
    }

    /// Make the upload fail the way the HTTP client does for this status
    pub fn set_reply_error(&self, status: u16) {
        *self.reply.lock() = Err(status);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl VerificationApi for FakeApi {
    async fn fetch_verification(&self, id: &VerificationId) -> Result<Verification, ApiError> {
        self.details
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                body: "Verification not found".to_string(),
            })
    }

    async fn fetch_artifact(
        &self,
        id: &VerificationId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, ApiError> {
        self.artifact_gate.pass().await;
        self.artifacts
            .lock()
            .get(&(id.clone(), kind))
            .cloned()
            .ok_or_else(|| ApiError::Network("connection reset".to_string()))
    }

    async fn upload(
        &self,
        id: &VerificationId,
        request: UploadRequest,
    ) -> Result<UploadReply, ApiError> {
        self.uploads.lock().push((id.clone(), request));
        match &*self.reply.lock() {
            Ok(reply) => Ok(reply.clone()),
            Err(401) => Err(ApiError::Unauthorized),
            Err(403) => Err(ApiError::Forbidden),
            Err(status) => Err(ApiError::Status {
                status: *status,
                body: String::new(),
            }),
        }
    }
}

/// Converter returning fixed bytes after passing its gate
pub struct FakeConverter {
    pub output: Result<Vec<u8>, u16>,
    pub gate: Gate,
    pub calls: AtomicUsize,
}

impl FakeConverter {
    pub fn returning(bytes: &[u8]) -> Self {
        Self {
            output: Ok(bytes.to_vec()),
            gate: Gate::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(bytes: &[u8]) -> Self {
        Self {
            gate: Gate::closed(),
            ..Self::returning(bytes)
        }
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert_to_pdf(&self, _document: &FilePayload) -> Result<Vec<u8>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        self.output.clone().map_err(|status| ApiError::Status {
            status,
            body: String::new(),
        })
    }
}

/// PDF backend whose documents render slowly and count live handles.
///
/// `open` reads the page count from the bytes (`b"pages:3"`); anything else
/// fails to load. Rendering a page listed in `broken_pages` fails.
pub struct SlowBackend {
    pub delay: Duration,
    pub live: Arc<AtomicUsize>,
    pub broken_pages: Vec<u32>,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            live: Arc::new(AtomicUsize::new(0)),
            broken_pages: Vec::new(),
        }
    }

    pub fn live_documents(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl PdfBackend for SlowBackend {
    fn open(&self, bytes: &[u8]) -> Result<Arc<dyn PdfDocument>, RenderError> {
        let pages = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.strip_prefix("pages:"))
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| RenderError::Load("not a fake pdf".to_string()))?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SlowDocument {
            pages,
            delay: self.delay,
            live: self.live.clone(),
            broken_pages: self.broken_pages.clone(),
        }))
    }
}

struct SlowDocument {
    pages: u32,
    delay: Duration,
    live: Arc<AtomicUsize>,
    broken_pages: Vec<u32>,
}

impl PdfDocument for SlowDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_size(&self, page: u32) -> Result<PageSize, RenderError> {
        if page == 0 || page > self.pages {
            return Err(RenderError::PageOutOfRange {
                page,
                count: self.pages,
            });
        }
        Ok(PageSize {
            width: 100.0,
            height: 200.0,
        })
    }

    fn render(
        &self,
        viewport: &Viewport,
        _cancel: &CancellationToken,
    ) -> Result<Raster, RenderError> {
        std::thread::sleep(self.delay);
        if self.broken_pages.contains(&viewport.page) {
            return Err(RenderError::Backend("corrupt content stream".to_string()));
        }
        let (width, height) = (viewport.pixel_width(), viewport.pixel_height());
        Ok(Raster {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        })
    }
}

impl Drop for SlowDocument {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Grayscale PNG of the given size
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer
            .write_image_data(&vec![0u8; (width * height) as usize])
            .unwrap();
    }
    out
}

pub fn docx_payload() -> FilePayload {
    FilePayload::new(
        "label.docx",
        ArtifactKind::Docx.default_mime_type(),
        b"PK\x03\x04".to_vec(),
    )
}

pub fn image_payload(width: u32, height: u32) -> FilePayload {
    FilePayload::new("photo.png", "image/png", png(width, height))
}

pub fn verification(json: serde_json::Value) -> Verification {
    serde_json::from_value(json).unwrap()
}
