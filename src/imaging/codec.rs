//! Byte-level decode/encode at the pipeline boundary.
//!
//! Collaborators exchange encoded bytes; pixel work happens on decoded RGBA.
//! Output is always PNG (lossless, keeps the alpha channel) written through the
//! `png` crate directly so the DPI tag lands in a `pHYs` chunk, which the
//! `image` crate's encoder cannot emit.

use super::calculations::{dpi_to_pixels_per_metre, pixels_per_metre_to_dpi};
use super::pixels::ImagingError;
use image::RgbaImage;
use std::io::Cursor;

/// Decode any supported format (PNG, JPEG, WebP) into straight-alpha RGBA.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, ImagingError> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Encode RGBA as PNG, tagging the physical resolution when `dpi` is given.
pub fn encode_png(img: &RgbaImage, dpi: Option<u32>) -> Result<Vec<u8>, ImagingError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(ImagingError::EmptyImage);
    }
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, img.width(), img.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if let Some(dpi) = dpi {
            let ppm = dpi_to_pixels_per_metre(dpi);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| ImagingError::Encode(e.to_string()))?;
        writer
            .write_image_data(img.as_raw())
            .map_err(|e| ImagingError::Encode(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| ImagingError::Encode(e.to_string()))?;
    }
    Ok(out)
}

/// Read the DPI tag of a PNG, if it has a metre-based `pHYs` chunk.
pub fn read_png_dpi(bytes: &[u8]) -> Option<u32> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    match reader.info().pixel_dims {
        Some(png::PixelDimensions {
            xppu,
            unit: png::Unit::Meter,
            ..
        }) => Some(pixels_per_metre_to_dpi(xppu)),
        _ => None,
    }
}
