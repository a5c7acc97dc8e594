//! Image header inspection: MIME sniffing and natural dimensions
//!
//! Only headers are read, through `imagesize`. Decoding runs on the blocking
//! pool so a large photo never stalls the event loop.

use std::sync::Arc;

use imagesize::ImageType;
use thiserror::Error;

use crate::crop::ImageSize;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("Unsupported image format")]
    Unsupported,

    #[error("Malformed image header: {0}")]
    Malformed(String),

    #[error("Image decode task failed: {0}")]
    Task(String),
}

/// Best-effort MIME type from magic bytes, `image/*` when unknown
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match imagesize::image_type(bytes) {
        Ok(ImageType::Png) => "image/png",
        Ok(ImageType::Jpeg) => "image/jpeg",
        Ok(ImageType::Gif) => "image/gif",
        Ok(ImageType::Webp) => "image/webp",
        Ok(ImageType::Bmp) => "image/bmp",
        Ok(ImageType::Tiff) => "image/tiff",
        _ => "image/*",
    }
}

/// Read the natural size from the image header
pub fn read_dimensions(bytes: &[u8]) -> Result<ImageSize, ImageError> {
    let size = imagesize::blob_size(bytes).map_err(|e| match e {
        imagesize::ImageError::NotSupported => ImageError::Unsupported,
        other => ImageError::Malformed(other.to_string()),
    })?;
    let (width, height) = match (u32::try_from(size.width), u32::try_from(size.height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(ImageError::Malformed("image too large".to_string())),
    };
    let size = ImageSize::new(width, height);
    if size.is_empty() {
        return Err(ImageError::Malformed("zero-sized image".to_string()));
    }
    Ok(size)
}

/// [`read_dimensions`] off the event loop
pub async fn decode_dimensions(bytes: Arc<[u8]>) -> Result<ImageSize, ImageError> {
    tokio::task::spawn_blocking(move || read_dimensions(&bytes))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))?
}
