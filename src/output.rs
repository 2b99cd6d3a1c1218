//! Result types returned by an extraction run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The run's timestamped directory holding every crop.
    pub output_dir: PathBuf,
    /// One entry per processed page, in document order.
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// All saved crops across pages, in page then detection order.
    pub fn crops(&self) -> impl Iterator<Item = &SavedCrop> {
        self.pages.iter().flat_map(|p| p.crops.iter())
    }
}

/// Detections and crops for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based page index.
    pub page_index: usize,
    /// Rendered page width in pixels.
    pub width: u32,
    /// Rendered page height in pixels.
    pub height: u32,
    /// Number of boxes the detector returned.
    pub detected: usize,
    /// Crops actually written (may be fewer than `detected` when boxes are skipped).
    pub crops: Vec<SavedCrop>,
    /// Wall-clock time spent in detection.
    pub detect_duration_ms: u64,
}

/// One cropped region written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCrop {
    /// Index of the detection within its page.
    pub index: usize,
    /// Label reported by the detector.
    pub label: String,
    /// Pixel rectangle `[x1, y1, x2, y2)` that was cropped.
    pub rect: [u32; 4],
    pub path: PathBuf,
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages processed (after page selection).
    pub processed_pages: usize,
    /// Boxes returned by the detector across all pages.
    pub detected_objects: usize,
    /// Crops written across all pages.
    pub saved_objects: usize,
    pub render_duration_ms: u64,
    pub model_load_duration_ms: u64,
    pub detect_duration_ms: u64,
    pub total_duration_ms: u64,
}
