// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for detection.
//!
//! Letterbox resizing (aspect-preserving scale plus gray padding), conversion
//! to a normalized NCHW tensor, and the coordinate transforms that map model
//! output back to original-image pixel space.

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::error::{DetectError, Result};

/// Letterbox padding color (gray), matching the Ultralytics default.
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Normalized letterbox padding value (114/255).
const LETTERBOX_NORM: f32 = 114.0 / 255.0;

/// Result of preprocessing an image, with the transform info needed to map
/// detections back to the original image.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Preprocessed image tensor in NCHW format, normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Original image dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

/// Letterbox an image to a square target size and convert it to a normalized
/// NCHW tensor.
///
/// # Errors
///
/// Returns an image error if the resize fails (e.g. zero-sized input).
pub fn preprocess_image(image: &DynamicImage, target_size: usize) -> Result<PreprocessResult> {
    let (orig_width, orig_height) = image.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Err(DetectError::Image("input image has zero size".to_string()));
    }
    let orig_shape = (orig_height, orig_width);

    let (new_width, new_height, pad_left, pad_top, scale) =
        calculate_letterbox_params(orig_width, orig_height, target_size);

    let resized = resize_bilinear(image, new_width, new_height)?;

    // Gray canvas, resized image pasted at the padding offset, NCHW layout
    let mut tensor = Array4::from_elem((1, 3, target_size, target_size), LETTERBOX_NORM);
    let (pad_top, pad_left) = (pad_top as usize, pad_left as usize);
    for (i, chunk) in resized.chunks_exact(3).enumerate() {
        let y = pad_top + i / new_width as usize;
        let x = pad_left + i % new_width as usize;
        tensor[[0, 0, y, x]] = f32::from(chunk[0]) / 255.0;
        tensor[[0, 1, y, x]] = f32::from(chunk[1]) / 255.0;
        tensor[[0, 2, y, x]] = f32::from(chunk[2]) / 255.0;
    }

    Ok(PreprocessResult {
        tensor,
        orig_shape,
        scale,
        #[allow(clippy::cast_precision_loss)]
        padding: (pad_top as f32, pad_left as f32),
    })
}

/// Bilinear resize to the given dimensions, returning raw RGB bytes.
fn resize_bilinear(image: &DynamicImage, width: u32, height: u32) -> Result<Vec<u8>> {
    let src_rgb = image.to_rgb8();
    let (src_w, src_h) = src_rgb.dimensions();

    let src_image = Image::from_vec_u8(src_w, src_h, src_rgb.into_raw(), PixelType::U8x3)
        .map_err(|e| DetectError::Image(format!("failed to create resize source: {e}")))?;

    let mut dst_image = Image::new(width.max(1), height.max(1), PixelType::U8x3);
    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| DetectError::Image(format!("failed to resize image: {e}")))?;

    Ok(dst_image.into_vec())
}

/// Calculate letterbox dimensions and padding.
///
/// Returns (`new_width`, `new_height`, `pad_left`, `pad_top`,
/// (`scale_y`, `scale_x`)).
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn calculate_letterbox_params(
    orig_width: u32,
    orig_height: u32,
    target_size: usize,
) -> (u32, u32, u32, u32, (f32, f32)) {
    let target = target_size as f32;
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    // Scale to fit within the target while maintaining aspect ratio
    let scale = (target / orig_h).min(target / orig_w);

    let new_w = ((orig_w * scale).round() as u32).max(1);
    let new_h = ((orig_h * scale).round() as u32).max(1);

    // Center alignment: divide padding equally on both sides
    let pad_left = (target_size as u32).saturating_sub(new_w) / 2;
    let pad_top = (target_size as u32).saturating_sub(new_h) / 2;

    let scale_x = new_w as f32 / orig_w;
    let scale_y = new_h as f32 / orig_h;

    (new_w, new_h, pad_left, pad_top, (scale_y, scale_x))
}

/// Scale coordinates from model output space back to original image space.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], scale: (f32, f32), padding: (f32, f32)) -> [f32; 4] {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;

    [
        (coords[0] - pad_left) / scale_x,
        (coords[1] - pad_top) / scale_y,
        (coords[2] - pad_left) / scale_x,
        (coords[3] - pad_top) / scale_y,
    ]
}

/// Clip box coordinates to image bounds. `shape` is (height, width).
#[must_use]
pub const fn clip_coords(coords: &[f32; 4], shape: (u32, u32)) -> [f32; 4] {
    #[allow(clippy::cast_precision_loss)]
    let (h, w) = (shape.0 as f32, shape.1 as f32);
    [
        coords[0].clamp(0.0, w),
        coords[1].clamp(0.0, h),
        coords[2].clamp(0.0, w),
        coords[3].clamp(0.0, h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_params_square() {
        let (new_w, new_h, pad_left, pad_top, _scale) = calculate_letterbox_params(640, 640, 640);
        assert_eq!(new_w, 640);
        assert_eq!(new_h, 640);
        assert_eq!(pad_left, 0);
        assert_eq!(pad_top, 0);
    }

    #[test]
    fn test_letterbox_params_wide() {
        let (new_w, new_h, pad_left, pad_top, _scale) = calculate_letterbox_params(1280, 720, 640);
        assert_eq!(new_w, 640);
        assert_eq!(new_h, 360);
        assert_eq!(pad_left, 0);
        assert_eq!(pad_top, 140);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        // A white 100x50 image: letterboxed into a 64x64 tensor with gray bands
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            100,
            50,
            image::Rgb([255, 255, 255]),
        ));
        let result = preprocess_image(&img, 64).unwrap();

        assert_eq!(result.tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(result.orig_shape, (50, 100));

        // Top-left corner is padding
        let pad = result.tensor[[0, 0, 0, 0]];
        assert!((pad - 114.0 / 255.0).abs() < 1e-6);

        // Center is image content (white)
        let center = result.tensor[[0, 0, 32, 32]];
        assert!((center - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_scale_coords() {
        let coords = [100.0, 100.0, 200.0, 200.0];
        let scaled = scale_coords(&coords, (1.0, 1.0), (10.0, 10.0));
        assert!((scaled[0] - 90.0).abs() < 1e-6);
        assert!((scaled[1] - 90.0).abs() < 1e-6);
        assert!((scaled[2] - 190.0).abs() < 1e-6);
        assert!((scaled[3] - 190.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_coords() {
        let coords = [-10.0, -20.0, 700.0, 500.0];
        let clipped = clip_coords(&coords, (480, 640));
        assert!((clipped[0] - 0.0).abs() < 1e-6);
        assert!((clipped[1] - 0.0).abs() < 1e-6);
        assert!((clipped[2] - 640.0).abs() < 1e-6);
        assert!((clipped[3] - 480.0).abs() < 1e-6);
    }
}
