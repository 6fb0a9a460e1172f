// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image annotation: detection boxes, labels, and the count banner.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::results::Detections;

/// Assets URL for downloading fonts.
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Box and banner text color (red).
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Banner background color (white).
pub const BANNER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Check if the font exists locally, downloading it on a miss.
///
/// Returns `None` if the font can't be obtained; callers skip text rendering
/// in that case rather than failing the annotation.
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy();
    let config_dir = dirs::config_dir()?.join("pipe-detect");
    let font_path = config_dir.join(font_name.as_ref());

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        eprintln!("Failed to create config directory: {e}");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    eprintln!("Downloading {url} to {}", font_path.display());

    match ureq::get(&url).call() {
        Ok(response) => {
            let mut file = match File::create(&font_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Failed to create font file: {e}");
                    return None;
                }
            };

            let mut reader = response.into_body().into_reader();
            if let Err(e) = io::copy(&mut reader, &mut file) {
                eprintln!("Failed to download font: {e}");
                let _ = fs::remove_file(&font_path);
                return None;
            }

            Some(font_path)
        }
        Err(e) => {
            eprintln!("Failed to download font from {url}: {e}");
            None
        }
    }
}

fn load_font_data() -> Option<Vec<u8>> {
    let font_path = check_font("Arial.ttf")?;
    let mut file = File::open(font_path).ok()?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).ok()?;
    Some(buffer)
}

/// Annotate an image with detection boxes, per-box labels, and a `TOTAL: N`
/// banner in the upper-left corner.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
#[must_use]
pub fn annotate_image(image: &DynamicImage, detections: &Detections) -> DynamicImage {
    let mut img = image.to_rgb8();
    let (width, height) = img.dimensions();

    let font_data = load_font_data();
    let font = font_data
        .as_ref()
        .and_then(|data| FontRef::try_from_slice(data).ok());

    for det in detections {
        let mut x1 = det.bbox[0].round() as i32;
        let mut y1 = det.bbox[1].round() as i32;
        let mut x2 = det.bbox[2].round() as i32;
        let mut y2 = det.bbox[3].round() as i32;

        if x1 > x2 {
            std::mem::swap(&mut x1, &mut x2);
        }
        if y1 > y2 {
            std::mem::swap(&mut y1, &mut y2);
        }

        x1 = x1.clamp(0, width as i32 - 1);
        y1 = y1.clamp(0, height as i32 - 1);
        x2 = x2.clamp(0, width as i32 - 1);
        y2 = y2.clamp(0, height as i32 - 1);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        // Box outline, thickness 3
        let thickness = 3;
        for t in 0..thickness {
            let tx1 = (x1 + t).min(x2);
            let ty1 = (y1 + t).min(y2);
            let tx2 = (x2 - t).max(tx1);
            let ty2 = (y2 - t).max(ty1);
            if tx2 > tx1 && ty2 > ty1 {
                let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
                draw_hollow_rect_mut(&mut img, rect, BOX_COLOR);
            }
        }

        let class_name = detections
            .names()
            .get(&det.class_id)
            .map_or("object", String::as_str);
        let label = format!("{} {:.2}", class_name, det.confidence);

        if let Some(ref f) = font {
            let scale = PxScale::from(16.0);
            let text_y = if y1 > 20 { y1 - 20 } else { y2 + 5 };
            let text_x = x1.max(0);
            if text_x < width as i32 && text_y >= 0 && text_y < height as i32 {
                draw_text_mut(&mut img, BOX_COLOR, text_x, text_y, scale, f, &label);
            }
        }
    }

    // Count banner on a white background, sized relative to the image
    if let Some(ref f) = font {
        let text = format!("TOTAL: {}", detections.len());
        let scale = PxScale::from((height as f32 / 15.0).clamp(24.0, 80.0));
        let padding = (scale.y / 4.0) as i32;
        let text_x = padding * 2;
        let text_y = padding * 2;
        let banner_w = ((text.len() as f32 * scale.x * 0.55) as i32 + 2 * padding)
            .min(width as i32 - text_x);
        let banner_h = scale.y as i32 + 2 * padding;

        if banner_w > 0 && banner_h > 0 {
            let banner = Rect::at(text_x - padding, text_y - padding)
                .of_size(banner_w as u32, banner_h as u32);
            draw_filled_rect_mut(&mut img, banner, BANNER_COLOR);
            draw_text_mut(&mut img, BOX_COLOR, text_x, text_y, scale, f, &text);
        }
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Detection;
    use image::GenericImageView;
    use std::collections::HashMap;

    #[test]
    fn test_annotate_preserves_dimensions() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(320, 240));
        let mut names = HashMap::new();
        names.insert(0, "pipe".to_string());
        let dets = Detections::new(
            vec![Detection::new([10.0, 10.0, 100.0, 100.0], 0.9, 0)],
            names,
            (240, 320),
        );

        let annotated = annotate_image(&img, &dets);
        assert_eq!(annotated.dimensions(), (320, 240));
    }

    #[test]
    fn test_annotate_out_of_bounds_box_is_skipped() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(64, 64));
        let mut names = HashMap::new();
        names.insert(0, "pipe".to_string());
        // Degenerate box collapses after clamping and must not panic
        let dets = Detections::new(
            vec![Detection::new([200.0, 200.0, 300.0, 300.0], 0.9, 0)],
            names,
            (64, 64),
        );

        let annotated = annotate_image(&img, &dets);
        assert_eq!(annotated.dimensions(), (64, 64));
    }
}
