//! Crop & persist: cut detected regions out of a page and write them as PNG.
//!
//! Layout of a run:
//!
//! ```text
//! <output_root>/<YYYYMMDD-HHMMSS>/page_<n>_<label>_<i>.png
//! ```
//!
//! `n` is the 0-based page index and `i` the index of the detection within
//! its page, so file names never collide inside a run.

use crate::config::BoxPolicy;
use crate::error::ExtractError;
use crate::output::SavedCrop;
use crate::pipeline::detect::{Annotation, BoundingBox};
use chrono::{DateTime, Local};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `strftime` pattern of the per-run directory name.
pub const RUN_DIR_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Create the run directory `<root>/<timestamp>`.
///
/// `root` is created if needed. If the timestamp directory already exists
/// (two runs in the same second) a `-1`, `-2`, … suffix is appended.
pub fn create_run_dir(root: &Path, now: DateTime<Local>) -> Result<PathBuf, ExtractError> {
    std::fs::create_dir_all(root).map_err(|e| ExtractError::OutputDirFailed {
        path: root.to_path_buf(),
        source: e,
    })?;

    let stamp = now.format(RUN_DIR_FORMAT).to_string();
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            stamp.clone()
        } else {
            format!("{stamp}-{attempt}")
        };
        let path = root.join(name);
        match std::fs::create_dir(&path) {
            Ok(()) => {
                debug!("Created run directory {}", path.display());
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 1000 => {
                attempt += 1;
            }
            Err(e) => return Err(ExtractError::OutputDirFailed { path, source: e }),
        }
    }
}

/// File name of a crop: `page_<page>_<label>_<index>.png`.
pub fn crop_file_name(page_index: usize, label: &str, index: usize) -> String {
    format!("page_{page_index}_{}_{index}.png", sanitize_label(label))
}

/// Keep ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "object".to_string()
    } else {
        cleaned
    }
}

/// Resolve a box to an integer pixel rectangle `[x1, y1, x2, y2)` under `policy`.
///
/// Coordinates are rounded to the nearest pixel first. `Ok(None)` means the
/// box is dropped.
pub fn resolve_rect(
    bbox: &BoundingBox,
    width: u32,
    height: u32,
    policy: BoxPolicy,
    page_index: usize,
    index: usize,
) -> Result<Option<[u32; 4]>, ExtractError> {
    let (w, h) = (width as f32, height as f32);
    let [x1, y1, x2, y2] = [bbox.x1, bbox.y1, bbox.x2, bbox.y2].map(f32::round);

    let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
    let inside = finite && x1 >= 0.0 && y1 >= 0.0 && x2 <= w && y2 <= h;
    let non_empty = finite && x2 > x1 && y2 > y1;

    match policy {
        BoxPolicy::Strict if !(inside && non_empty) => Err(ExtractError::BoxOutOfBounds {
            page: page_index,
            index,
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
            width,
            height,
        }),
        BoxPolicy::Skip if !(inside && non_empty) => Ok(None),
        BoxPolicy::Clamp if !finite => Ok(None),
        BoxPolicy::Clamp => {
            let cx1 = x1.clamp(0.0, w);
            let cy1 = y1.clamp(0.0, h);
            let cx2 = x2.clamp(0.0, w);
            let cy2 = y2.clamp(0.0, h);
            if cx2 <= cx1 || cy2 <= cy1 {
                Ok(None)
            } else {
                Ok(Some([cx1 as u32, cy1 as u32, cx2 as u32, cy2 as u32]))
            }
        }
        _ => Ok(Some([x1 as u32, y1 as u32, x2 as u32, y2 as u32])),
    }
}

/// Crop every detected box out of `image` and write it under `run_dir`.
///
/// Boxes are handled in annotation order; the returned list holds the crops
/// actually written.
pub fn save_crops(
    image: &DynamicImage,
    annotation: &Annotation,
    page_index: usize,
    run_dir: &Path,
    policy: BoxPolicy,
) -> Result<Vec<SavedCrop>, ExtractError> {
    annotation.validate(page_index)?;

    let (width, height) = (image.width(), image.height());
    let mut saved = Vec::with_capacity(annotation.len());

    for (index, bbox, label) in annotation.iter() {
        let Some(rect) = resolve_rect(bbox, width, height, policy, page_index, index)? else {
            warn!(
                "Page {}: dropping box {} '{}' ({:.1}, {:.1}, {:.1}, {:.1}) outside {}x{} image",
                page_index, index, label, bbox.x1, bbox.y1, bbox.x2, bbox.y2, width, height
            );
            continue;
        };

        let [x1, y1, x2, y2] = rect;
        let cropped = image.crop_imm(x1, y1, x2 - x1, y2 - y1);
        let path = run_dir.join(crop_file_name(page_index, label, index));

        cropped
            .save(&path)
            .map_err(|e| ExtractError::CropWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Saved {} ({}x{})", path.display(), x2 - x1, y2 - y1);

        saved.push(SavedCrop {
            index,
            label: label.to_string(),
            rect,
            path,
        });
    }

    Ok(saved)
}
