//! # pdf2figures
//!
//! Find tables and figures in PDF documents and save each one as a cropped
//! PNG image.
//!
//! Every page is rasterised with pdfium and passed through a Florence-2
//! object-detection model (by default the TF-ID checkpoint
//! `yifeihu/TF-ID-large`) running on ONNX Runtime. The model answers the
//! `<OD>` task with labelled location tokens, which are turned into pixel
//! boxes and cropped out of the page image.
//!
//! The model is loaded from a Florence-2 ONNX export (a local directory or a
//! Hub repository with an `onnx/` folder). The TF-ID Hub repositories ship
//! PyTorch weights only; loading one of them directly fails with
//! [`ExtractError::MissingOnnxExport`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input   resolve local file or download from URL
//!  ├─ 2. Render  rasterise pages via pdfium (blocking)
//!  ├─ 3. Model   load once, on CPU or CUDA
//!  ├─ 4. Detect  vision encoder + encoder + beam-search decoder
//!  └─ 5. Crop    <output_dir>/<YYYYMMDD-HHMMSS>/page_<n>_<label>_<i>.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2figures::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .model_id("./models/tf-id-large-onnx")
//!         .output_dir("./figures")
//!         .build()?;
//!     let output = extract("paper.pdf", &config).await?;
//!     for crop in output.crops() {
//!         println!("{} -> {}", crop.label, crop.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Custom detectors
//!
//! Anything implementing [`Detector`] can replace the model, see
//! [`extract_with_detector`] and [`run_pages`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2figures` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `cuda`  | off     | ONNX Runtime with the CUDA execution provider |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2figures = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod device;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BoxPolicy, ExtractionConfig, ExtractionConfigBuilder, GenerationConfig, PageSelection,
    DEFAULT_MODEL_ID, DEFAULT_OUTPUT_DIR,
};
pub use device::{select_device, Device};
pub use error::ExtractError;
pub use extract::{extract, extract_from_bytes, extract_sync, extract_with_detector, run_pages};
pub use model::Florence2Detector;
pub use output::{ExtractionOutput, ExtractionStats, PageResult, SavedCrop};
pub use pipeline::detect::{Annotation, BoundingBox, Detector};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
