//! Debug overlays: decoded boxes drawn back onto generated images.
//!
//! Box colors derive deterministically from the class id, so the same class
//! renders in the same color across runs. Class names are emitted to the
//! log next to each drawn box; the image carries a color tag per box.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

use crate::{load_annotations, Annotation, Result};

/// Stable per-class color, matching across runs and processes.
fn class_color(class_id: u32) -> Rgb<u8> {
    let mut rng = StdRng::seed_from_u64(class_id as u64 * 12345);
    Rgb([rng.gen(), rng.gen(), rng.gen()])
}

fn class_label(class_id: u32, class_names: Option<&[String]>) -> String {
    class_names
        .and_then(|names| names.get(class_id as usize).cloned())
        .unwrap_or_else(|| format!("class {class_id}"))
}

/// Draws every annotation onto `image` in place.
pub fn draw_annotations(
    image: &mut RgbImage,
    annotations: &[Annotation],
    class_names: Option<&[String]>,
) {
    let (width, height) = image.dimensions();

    for ann in annotations {
        let px = ann.to_pixel_box(width, height);
        let w = (px.x_max - px.x_min).max(1);
        let h = (px.y_max - px.y_min).max(1);
        let color = class_color(ann.class_id);

        // Three nested rectangles give a 3px border.
        for inset in 0..3i32 {
            let rect_w = w as i32 - 2 * inset;
            let rect_h = h as i32 - 2 * inset;
            if rect_w <= 0 || rect_h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(px.x_min as i32 + inset, px.y_min as i32 + inset)
                    .of_size(rect_w as u32, rect_h as u32),
                color,
            );
        }

        // Color tag above the box marks the class without needing glyphs.
        let tag_y = px.y_min.saturating_sub(8) as i32;
        draw_filled_rect_mut(image, Rect::at(px.x_min as i32, tag_y).of_size(24, 6), color);

        debug!(
            "Drew {} at ({}, {})-({}, {})",
            class_label(ann.class_id, class_names),
            px.x_min,
            px.y_min,
            px.x_max,
            px.y_max
        );
    }
}

/// Loads an image + its label file and writes the annotated copy.
///
/// A missing or empty label file is not an error: the image is copied with
/// a red frame so "no annotations" stays visible when eyeballing a batch.
pub fn render_annotated(
    image_path: &Path,
    label_path: &Path,
    output_path: &Path,
    class_names: Option<&[String]>,
) -> Result<()> {
    let mut image = image::open(image_path)
        .map_err(|e| crate::AnnotateError::Io {
            path: image_path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?
        .to_rgb8();

    let annotations = if label_path.is_file() {
        load_annotations(label_path)?
    } else {
        Vec::new()
    };

    if annotations.is_empty() {
        warn!("{} has no annotations", image_path.display());
        let (w, h) = image.dimensions();
        draw_hollow_rect_mut(
            &mut image,
            Rect::at(0, 0).of_size(w, h),
            Rgb([255, 0, 0]),
        );
    } else {
        draw_annotations(&mut image, &annotations, class_names);
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| crate::AnnotateError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    image.save(output_path).map_err(|e| crate::AnnotateError::Io {
        path: output_path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_colors_are_stable_and_distinct() {
        assert_eq!(class_color(0), class_color(0));
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn drawing_marks_box_border() {
        let mut img = RgbImage::new(100, 100);
        let ann = Annotation {
            class_id: 2,
            x_center: 0.5,
            y_center: 0.5,
            width: 0.4,
            height: 0.4,
        };
        draw_annotations(&mut img, &[ann], None);

        let px = ann.to_pixel_box(100, 100);
        let border = *img.get_pixel(px.x_min, px.y_min + 5);
        assert_ne!(border, Rgb([0, 0, 0]), "border pixel should be colored");
    }

    #[test]
    fn label_falls_back_to_class_number() {
        assert_eq!(class_label(4, None), "class 4");
        let names = vec!["awl".to_string(), "blade".to_string()];
        assert_eq!(class_label(1, Some(&names)), "blade");
    }
}
