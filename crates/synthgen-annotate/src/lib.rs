// synthgen-annotate/src/lib.rs
// ============================================================
// Segmentation → YOLO annotation stage for synthgen
// Converts rendered instance segmentation maps into normalized
// axis-aligned bounding boxes, one text line per object.
// ------------------------------------------------------------
// Pipeline: Array2<u32> + object list → Vec<Annotation> → .txt
// ------------------------------------------------------------
// Public API
//   * mask_to_bbox(mask)            – tight box or None
//   * from_segmentation(seg, objs)  – positional instance match
//   * save/load_annotations(path)   – round-trip text format
// ============================================================

//! synthgen – annotation layer
//!
//! Instance ids in the segmentation map are matched to tracked objects
//! strictly by the load-order convention (object at index `i` owns id
//! `i + 2`; 0 is background, 1 the surface). An object whose id is absent
//! or whose mask collapses to an empty or degenerate box is skipped
//! silently — occlusion is normal, not an error.
//!
//! The text format is one `class x_center y_center width height` line per
//! object, all geometric fields normalized to [0,1] and fixed to six
//! decimals so saved files reparse to identical values.

use ndarray::{Array2, ArrayView2};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use synthgen_engine::SceneObject;

mod visualize;
pub use visualize::{draw_annotations, render_annotated};

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Malformed annotation line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AnnotateError>;

/// Inclusive pixel-space box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

/// One normalized YOLO record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annotation {
    pub class_id: u32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl Annotation {
    /// Normalizes a pixel box against the image dimensions.
    pub fn from_pixel_box(bbox: PixelBox, class_id: u32, img_width: u32, img_height: u32) -> Self {
        let width = (bbox.x_max - bbox.x_min) as f32;
        let height = (bbox.y_max - bbox.y_min) as f32;
        let x_center = bbox.x_min as f32 + width / 2.0;
        let y_center = bbox.y_min as f32 + height / 2.0;

        Self {
            class_id,
            x_center: x_center / img_width as f32,
            y_center: y_center / img_height as f32,
            width: width / img_width as f32,
            height: height / img_height as f32,
        }
    }

    /// Back to pixel coordinates for drawing or verification.
    pub fn to_pixel_box(&self, img_width: u32, img_height: u32) -> PixelBox {
        let w = self.width * img_width as f32;
        let h = self.height * img_height as f32;
        let x_min = (self.x_center * img_width as f32 - w / 2.0).round().max(0.0);
        let y_min = (self.y_center * img_height as f32 - h / 2.0).round().max(0.0);
        PixelBox {
            x_min: x_min as u32,
            y_min: y_min as u32,
            x_max: (x_min + w.round()) as u32,
            y_max: (y_min + h.round()) as u32,
        }
    }

    pub fn parse_line(text: &str, line: usize) -> Result<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(AnnotateError::Parse {
                line,
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }
        let class_id = fields[0].parse::<u32>().map_err(|e| AnnotateError::Parse {
            line,
            reason: format!("class id: {e}"),
        })?;
        let mut geom = [0.0f32; 4];
        for (slot, field) in geom.iter_mut().zip(&fields[1..]) {
            *slot = field.parse::<f32>().map_err(|e| AnnotateError::Parse {
                line,
                reason: format!("coordinate: {e}"),
            })?;
        }
        Ok(Self {
            class_id,
            x_center: geom[0],
            y_center: geom[1],
            width: geom[2],
            height: geom[3],
        })
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

/// Tight box over the true pixels of a binary mask. `None` when the mask is
/// empty or the box would be degenerate.
pub fn mask_to_bbox(mask: ArrayView2<'_, bool>) -> Option<PixelBox> {
    let mut bbox: Option<PixelBox> = None;
    for ((y, x), &set) in mask.indexed_iter() {
        if !set {
            continue;
        }
        let (x, y) = (x as u32, y as u32);
        bbox = Some(match bbox {
            None => PixelBox {
                x_min: x,
                y_min: y,
                x_max: x,
                y_max: y,
            },
            Some(b) => PixelBox {
                x_min: b.x_min.min(x),
                y_min: b.y_min.min(y),
                x_max: b.x_max.max(x),
                y_max: b.y_max.max(y),
            },
        });
    }
    bbox.filter(|b| b.x_max > b.x_min && b.y_max > b.y_min)
}

fn instance_bbox(seg: &Array2<u32>, id: u32) -> Option<PixelBox> {
    let mut bbox: Option<PixelBox> = None;
    for ((y, x), &value) in seg.indexed_iter() {
        if value != id {
            continue;
        }
        let (x, y) = (x as u32, y as u32);
        bbox = Some(match bbox {
            None => PixelBox {
                x_min: x,
                y_min: y,
                x_max: x,
                y_max: y,
            },
            Some(b) => PixelBox {
                x_min: b.x_min.min(x),
                y_min: b.y_min.min(y),
                x_max: b.x_max.max(x),
                y_max: b.y_max.max(y),
            },
        });
    }
    bbox.filter(|b| b.x_max > b.x_min && b.y_max > b.y_min)
}

/// Converts a segmentation map plus the tracked object list into records.
///
/// Matching is positional only: the object at load index `i` is looked up
/// as instance `i + 2`. A count mismatch between map contents and tracked
/// objects is logged, never fatal; per-object misses are skipped.
pub fn from_segmentation(seg: &Array2<u32>, objects: &[SceneObject]) -> Vec<Annotation> {
    let (img_height, img_width) = seg.dim();
    let mut annotations = Vec::with_capacity(objects.len());

    let mut present: Vec<u32> = seg.iter().copied().filter(|&v| v > 1).collect();
    present.sort_unstable();
    present.dedup();
    if present.len() != objects.len() {
        log::warn!(
            "Segmentation holds {} object instances but {} objects are tracked",
            present.len(),
            objects.len()
        );
    }

    for (idx, obj) in objects.iter().enumerate() {
        let expected = idx as u32 + 2;
        if obj.instance_id != expected {
            log::warn!(
                "{} tracked as instance {} but sits at load index {}; using load order",
                obj.class_name,
                obj.instance_id,
                idx
            );
        }

        let Some(bbox) = instance_bbox(seg, expected) else {
            log::debug!(
                "Instance {expected} ({}) absent or degenerate in segmentation, skipping",
                obj.class_name
            );
            continue;
        };
        annotations.push(Annotation::from_pixel_box(
            bbox,
            obj.class_id,
            img_width as u32,
            img_height as u32,
        ));
    }
    annotations
}

/// Writes one line per record; parent directories are created on demand.
pub fn save_annotations(annotations: &[Annotation], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AnnotateError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let body = annotations
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(path, body).map_err(|source| AnnotateError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_annotations(path: &Path) -> Result<Vec<Annotation>> {
    let text = fs::read_to_string(path).map_err(|source| AnnotateError::Io {
        path: path.display().to_string(),
        source,
    })?;
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| Annotation::parse_line(l, i + 1))
        .collect()
}
