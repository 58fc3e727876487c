//! Pixel transform library: pure Rust, stateless.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` (PNG, JPEG, WebP) |
//! | **Luminance / inversion** | per-pixel passes split by row with `rayon` |
//! | **Trim** | alpha bounding box + symmetric padding |
//! | **Resize → canvas** | Lanczos3 + `unsharpen`, centered on a transparent canvas |
//! | **Encode** | `png` crate, with a `pHYs` DPI tag |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and placement math (unit testable)
//! - **Parameters**: Data structures describing pixel operations
//! - **Color**: RGB ⇄ HSL and luma helpers
//! - **Pixels**: The raster operations themselves
//! - **Codec**: Byte decode/encode at the pipeline boundary

pub mod calculations;
pub mod codec;
pub mod color;
mod params;
pub mod pixels;

pub use codec::{decode_rgba, encode_png, read_png_dpi};
pub use params::{FitParams, PrintCanvas, Sharpening, TrimParams};
pub use pixels::{
    DEFAULT_VISIBILITY_ALPHA, ImagingError, NEUTRAL_LUMINANCE, composite_onto, invert_lightness,
    resize_and_center_on_canvas, resize_rgba, sample_average_luminance,
    sample_average_luminance_with, trim_transparent_border,
};
