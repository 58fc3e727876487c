//! Export compositor: a chosen variant, filtered, scaled and positioned on a
//! caller-sized transparent canvas.
//!
//! Deterministic and local, so there is no retry or degradation: any error
//! is returned to the caller as-is.

use crate::filter::{FilterDescriptor, apply_filter};
use crate::imaging::calculations::{calculate_export_position, calculate_scaled_dimensions};
use crate::imaging::{ImagingError, composite_onto, decode_rgba, encode_png, resize_rgba};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Largest accepted edge, for both the canvas and the scaled design.
pub const MAX_EXPORT_EDGE: u32 = 16_384;

/// Pixel offset from the centered position, in canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Encoded variant image.
    pub source_variant: Vec<u8>,
    pub filter: FilterDescriptor,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scale: f64,
    pub offset: Offset,
    /// DPI tag for the output PNG.
    pub dpi: Option<u32>,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Scale must be a positive number, got {0}")]
    InvalidScale(f64),
    #[error("Canvas must be at least 1x1, got {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },
    #[error("{width}x{height} exceeds the {MAX_EXPORT_EDGE}px edge limit")]
    TooLarge { width: u32, height: u32 },
    #[error("Could not decode source variant: {0}")]
    Decode(#[source] ImagingError),
    #[error("Could not encode export: {0}")]
    Encode(#[source] ImagingError),
}

fn check_edges(width: u32, height: u32) -> Result<(), ExportError> {
    if width > MAX_EXPORT_EDGE || height > MAX_EXPORT_EDGE {
        return Err(ExportError::TooLarge { width, height });
    }
    Ok(())
}

/// Composite without encoding. See [`export`].
pub fn render(request: &ExportRequest) -> Result<RgbaImage, ExportError> {
    if !(request.scale.is_finite() && request.scale > 0.0) {
        return Err(ExportError::InvalidScale(request.scale));
    }
    let canvas_size = (request.canvas_width, request.canvas_height);
    if canvas_size.0 == 0 || canvas_size.1 == 0 {
        return Err(ExportError::InvalidCanvas {
            width: canvas_size.0,
            height: canvas_size.1,
        });
    }
    check_edges(canvas_size.0, canvas_size.1)?;

    let source = decode_rgba(&request.source_variant).map_err(ExportError::Decode)?;
    let scaled_size = calculate_scaled_dimensions(source.dimensions(), request.scale);
    check_edges(scaled_size.0, scaled_size.1)?;

    let filtered = apply_filter(&source, &request.filter);
    let scaled = if scaled_size == filtered.dimensions() {
        filtered
    } else {
        resize_rgba(&filtered, scaled_size.0, scaled_size.1)
    };

    let (x, y) = calculate_export_position(
        scaled_size,
        canvas_size,
        (request.offset.x, request.offset.y),
    );
    debug!(
        width = scaled_size.0,
        height = scaled_size.1,
        x,
        y,
        filter = %request.filter,
        "compositing export"
    );

    let mut canvas = RgbaImage::new(canvas_size.0, canvas_size.1);
    composite_onto(&mut canvas, &scaled, x, y);
    Ok(canvas)
}

/// Produce the final PNG for `request`.
pub fn export(request: &ExportRequest) -> Result<Vec<u8>, ExportError> {
    let canvas = render(request)?;
    encode_png(&canvas, request.dpi).map_err(ExportError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;
    use crate::imaging::read_png_dpi;
    use image::Rgba;

    fn request(source: &RgbaImage, scale: f64, offset: Offset, canvas: u32) -> ExportRequest {
        ExportRequest {
            source_variant: encode_png(source, None).unwrap(),
            filter: FilterDescriptor::IDENTITY,
            canvas_width: canvas,
            canvas_height: canvas,
            scale,
            offset,
            dpi: None,
        }
    }

    #[test]
    fn scaled_block_is_centered_then_shifted() {
        let source = RgbaImage::from_pixel(1000, 1000, Rgba([10, 20, 30, 255]));
        let out = render(&request(&source, 0.5, Offset { x: 50, y: 0 }, 2000)).unwrap();
        assert_eq!(out.dimensions(), (2000, 2000));

        // 500x500 block at (750 + 50, 750).
        for (x, y) in [(800, 750), (1299, 1249), (1050, 1000)] {
            assert!(out.get_pixel(x, y)[3] > 250, "({x}, {y}) should be inside");
        }
        for (x, y) in [(799, 1000), (1300, 1000), (1050, 749), (1050, 1250), (0, 0)] {
            assert_eq!(out.get_pixel(x, y)[3], 0, "({x}, {y}) should be outside");
        }
    }

    #[test]
    fn offsets_are_clamped_to_keep_design_on_canvas() {
        let source = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let out = render(&request(&source, 1.0, Offset { x: -5000, y: 5000 }, 100)).unwrap();
        // One column/row of the design remains, in the bottom-left corner.
        assert_eq!(out.get_pixel(0, 99)[3], 255);
        assert_eq!(out.get_pixel(1, 99)[3], 0);
        assert_eq!(out.get_pixel(0, 98)[3], 0);
    }

    #[test]
    fn filter_is_applied_before_compositing() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 255]));
        let mut req = request(&source, 1.0, Offset::default(), 8);
        req.filter = parse("brightness(0)");
        let out = render(&req).unwrap();
        assert_eq!(out.get_pixel(4, 4).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn rejects_bad_scale() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                render(&request(&source, scale, Offset::default(), 8)),
                Err(ExportError::InvalidScale(_))
            ));
        }
    }

    #[test]
    fn rejects_empty_canvas() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mut req = request(&source, 1.0, Offset::default(), 8);
        req.canvas_height = 0;
        assert!(matches!(
            render(&req),
            Err(ExportError::InvalidCanvas { width: 8, height: 0 })
        ));
    }

    #[test]
    fn rejects_oversized_scale() {
        let source = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        assert!(matches!(
            render(&request(&source, 200.0, Offset::default(), 100)),
            Err(ExportError::TooLarge { .. })
        ));
    }

    #[test]
    fn decode_failure_is_surfaced() {
        let req = ExportRequest {
            source_variant: b"garbage".to_vec(),
            filter: FilterDescriptor::IDENTITY,
            canvas_width: 10,
            canvas_height: 10,
            scale: 1.0,
            offset: Offset::default(),
            dpi: None,
        };
        assert!(matches!(export(&req), Err(ExportError::Decode(_))));
    }

    #[test]
    fn export_writes_dpi_tag() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mut req = request(&source, 2.0, Offset::default(), 16);
        req.dpi = Some(150);
        let png = export(&req).unwrap();
        assert_eq!(read_png_dpi(&png), Some(150));
        assert_eq!(decode_rgba(&png).unwrap().dimensions(), (16, 16));
    }
}
