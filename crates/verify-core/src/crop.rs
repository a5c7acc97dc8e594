//! Crop region geometry and the OCR scope wire format
//!
//! Regions live in percentage space of the displayed image so they survive
//! rescaling. Pixel rectangles are derived only when the backend needs
//! absolute coordinates.
//!
//! The wire form is `"[h, w, x, y]"`: height first, then width, then the
//! offsets. Both directions keep that order.

use serde::{Deserialize, Serialize};

/// Smallest selectable width/height, in percent
pub const MIN_PERCENT: f64 = 10.0;

/// Size of the default selection, in percent
pub const INITIAL_SIZE_PERCENT: f64 = 30.0;

/// Offset that centers the default selection
pub const INITIAL_OFFSET_PERCENT: f64 = (100.0 - INITIAL_SIZE_PERCENT) / 2.0;

/// Image size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const ZERO: ImageSize = ImageSize {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Selection in percentage units of the displayed image
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRegion {
    pub const ZERO: CropRegion = CropRegion {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The default centered selection
    pub fn centered() -> Self {
        Self::new(
            INITIAL_OFFSET_PERCENT,
            INITIAL_OFFSET_PERCENT,
            INITIAL_SIZE_PERCENT,
            INITIAL_SIZE_PERCENT,
        )
    }

    /// A region with no area counts as "no selection"
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Absolute coordinates in the image's natural pixel space.
    ///
    /// The percentage region is first placed on the displayed image, then
    /// scaled by `natural / display` per axis. A zero display size falls
    /// back to the natural size.
    pub fn to_pixel_rect(&self, natural: ImageSize, display: ImageSize) -> PixelRect {
        let display = if display.is_empty() { natural } else { display };
        let (dw, dh) = (display.width as f64, display.height as f64);
        let (scale_x, scale_y) = if display.is_empty() {
            (0.0, 0.0)
        } else {
            (natural.width as f64 / dw, natural.height as f64 / dh)
        };

        PixelRect {
            x: self.x / 100.0 * dw * scale_x,
            y: self.y / 100.0 * dh * scale_y,
            width: self.width / 100.0 * dw * scale_x,
            height: self.height / 100.0 * dh * scale_y,
        }
    }
}

/// Rectangle in natural image pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Default selection for a freshly loaded image.
///
/// The result does not depend on the pixel size, except that an image with
/// no area cannot hold a selection.
pub fn initial_region(size: ImageSize) -> CropRegion {
    if size.is_empty() {
        return CropRegion::ZERO;
    }
    CropRegion::centered()
}

/// Enforce the minimum selection and keep the region inside the image
pub fn clamp(region: CropRegion) -> CropRegion {
    clamp_with_min(region, MIN_PERCENT)
}

/// [`clamp`] with a configurable minimum extent (percent)
pub fn clamp_with_min(region: CropRegion, min_percent: f64) -> CropRegion {
    let min = finite_or_zero(min_percent).clamp(0.0, 100.0);
    let mut r = CropRegion::new(
        finite_or_zero(region.x),
        finite_or_zero(region.y),
        finite_or_zero(region.width),
        finite_or_zero(region.height),
    );

    if r.width < min {
        r.width = min;
        r.x = r.x.min(100.0 - min);
    }
    if r.height < min {
        r.height = min;
        r.y = r.y.min(100.0 - min);
    }

    r.width = r.width.min(100.0);
    r.height = r.height.min(100.0);
    r.x = r.x.clamp(0.0, 100.0 - r.width);
    r.y = r.y.clamp(0.0, 100.0 - r.height);
    r
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Wire representation, kept in `[h, w, x, y]` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrScope {
    pub height: f64,
    pub width: f64,
    pub x: f64,
    pub y: f64,
}

impl OcrScope {
    /// Render as `"[h, w, x, y]"` with two decimals. Non-finite values become 0.
    pub fn to_wire(&self) -> String {
        format!(
            "[{:.2}, {:.2}, {:.2}, {:.2}]",
            finite_or_zero(self.height),
            finite_or_zero(self.width),
            finite_or_zero(self.x),
            finite_or_zero(self.y)
        )
    }
}

impl From<CropRegion> for OcrScope {
    fn from(r: CropRegion) -> Self {
        Self {
            height: r.height,
            width: r.width,
            x: r.x,
            y: r.y,
        }
    }
}

impl From<PixelRect> for OcrScope {
    fn from(r: PixelRect) -> Self {
        Self {
            height: r.height,
            width: r.width,
            x: r.x,
            y: r.y,
        }
    }
}

pub fn serialize(region: &CropRegion) -> String {
    OcrScope::from(*region).to_wire()
}

pub fn serialize_pixels(rect: &PixelRect) -> String {
    OcrScope::from(*rect).to_wire()
}

/// Parse a persisted scope back into a region.
///
/// Values without a `%` marker are taken as pixels and converted against
/// `dimensions` when given; otherwise they are used as-is. Malformed input
/// yields `None`.
pub fn deserialize(scope: &str, dimensions: Option<ImageSize>) -> Option<CropRegion> {
    let is_percent = scope.contains('%');
    let cleaned: String = scope
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '%'))
        .collect();

    let values: Vec<f64> = match cleaned
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Ignoring malformed OCR scope {:?}: {}", scope, e);
            return None;
        }
    };

    let [height, width, x, y] = match values.as_slice() {
        [h, w, x, y] if [h, w, x, y].iter().all(|v| v.is_finite()) => [*h, *w, *x, *y],
        _ => {
            tracing::warn!(
                "Ignoring OCR scope {:?}: expected 4 finite values, got {}",
                scope,
                values.len()
            );
            return None;
        }
    };

    match dimensions {
        Some(size) if !is_percent && !size.is_empty() => {
            let (w, h) = (size.width as f64, size.height as f64);
            Some(CropRegion::new(
                x / w * 100.0,
                y / h * 100.0,
                width / w * 100.0,
                height / h * 100.0,
            ))
        }
        _ => Some(CropRegion::new(x, y, width, height)),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    // Any finite or non-finite coordinate a drag could produce
    fn coordinate() -> impl Strategy<Value = f64> {
        prop_oneof![
            8 => -200.0f64..300.0,
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
        ]
    }

    fn valid_region() -> impl Strategy<Value = CropRegion> {
        (MIN_PERCENT..=100.0f64, MIN_PERCENT..=100.0f64).prop_flat_map(|(w, h)| {
            (0.0..=(100.0 - w), 0.0..=(100.0 - h))
                .prop_map(move |(x, y)| CropRegion::new(x, y, w, h))
        })
    }

    proptest! {
        /// Property: clamped regions always satisfy the selection invariant
        #[test]
        fn clamp_invariant(x in coordinate(), y in coordinate(), w in coordinate(), h in coordinate()) {
            let r = clamp(CropRegion::new(x, y, w, h));
            let eps = 1e-9;
            prop_assert!(r.width >= MIN_PERCENT && r.height >= MIN_PERCENT);
            prop_assert!(r.x >= 0.0 && r.y >= 0.0);
            prop_assert!(r.x + r.width <= 100.0 + eps, "{:?}", r);
            prop_assert!(r.y + r.height <= 100.0 + eps, "{:?}", r);
        }

        /// Property: clamping twice changes nothing
        #[test]
        fn clamp_idempotent(x in coordinate(), y in coordinate(), w in coordinate(), h in coordinate()) {
            let once = clamp(CropRegion::new(x, y, w, h));
            prop_assert_eq!(clamp(once), once);
        }

        /// Property: serialize then deserialize stays within rounding error
        #[test]
        fn wire_roundtrip(r in valid_region()) {
            let back = deserialize(&serialize(&r), None).unwrap();
            prop_assert!((back.x - r.x).abs() <= 0.01);
            prop_assert!((back.y - r.y).abs() <= 0.01);
            prop_assert!((back.width - r.width).abs() <= 0.01);
            prop_assert!((back.height - r.height).abs() <= 0.01);
        }

        /// Property: serialize always emits four comma separated values
        #[test]
        fn serialize_shape(x in coordinate(), y in coordinate(), w in coordinate(), h in coordinate()) {
            let wire = serialize(&CropRegion::new(x, y, w, h));
            prop_assert!(wire.starts_with('[') && wire.ends_with(']'));
            prop_assert_eq!(wire.split(',').count(), 4);
        }

        /// Property: pixel scope converted back with the same size is the original region
        #[test]
        fn pixel_roundtrip(r in valid_region(), w in 1u32..5000, h in 1u32..5000) {
            let size = ImageSize::new(w, h);
            let px = r.to_pixel_rect(size, size);
            let back = deserialize(&serialize_pixels(&px), Some(size)).unwrap();
            // 0.005px of rounding on a 1px image is 0.5%
            let tol_x = 0.5 / w as f64 + 1e-9;
            let tol_y = 0.5 / h as f64 + 1e-9;
            prop_assert!((back.x - r.x).abs() <= tol_x.max(0.01));
            prop_assert!((back.height - r.height).abs() <= tol_y.max(0.01));
        }
    }
}
