//! Label verification core
//!
//! Client-side orchestration between the document, the photographed label
//! and the verification backend:
//! - `crop`: percentage regions, pixel rectangles and the `"[h, w, x, y]"` scope format
//! - `files`: the three artifact slots of the active verification
//! - `document` / `render`: DOCX conversion, PDF handles and cancellable page rendering
//! - `submit` / `diff`: upload, reply interpretation and word-level highlighting
//! - `catalog` / `config`: list selection and client settings

pub mod catalog;
pub mod config;
pub mod crop;
pub mod diff;
pub mod document;
pub mod error;
pub mod files;
pub mod imaging;
pub mod render;
pub mod submit;

pub use catalog::Catalog;
pub use config::ClientConfig;
pub use crop::{CropRegion, ImageSize, OcrScope, PixelRect};
pub use diff::{compute_diff, comparisons, Comparisons, DiffKind, DiffToken, FieldComparison};
pub use document::{DocumentInfo, DocumentPipeline, DocumentState, RenderOutcome};
pub use error::{ConfigError, DocumentError, FileError, RenderError, SubmitError};
pub use files::{ArtifactSet, ArtifactSlot, FileManager, ImageGeometry, LoadOutcome, LoadTicket};
pub use imaging::ImageError;
pub use render::{
    CancellationToken, FrameBuffer, LopdfBackend, PdfBackend, PdfDocument, RenderSurface, Viewport,
};
pub use submit::{interpret_reply, SubmissionEngine, SubmitOutcome};
