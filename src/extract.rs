//! Extraction entry points.
//!
//! A run is strictly sequential:
//!
//! 1. resolve the input (local path or URL download);
//! 2. rasterise the selected pages;
//! 3. pick the device and load the detector once;
//! 4. create `<output_dir>/<YYYYMMDD-HHMMSS>/`;
//! 5. for each page in order: detect, crop, save.
//!
//! Steps 2–5 are blocking (pdfium, ONNX Runtime, image encoding) and run on
//! one `spawn_blocking` worker. Any error aborts the run; crops of pages that
//! were already processed stay on disk.

use crate::config::ExtractionConfig;
use crate::device::resolve_device;
use crate::error::ExtractError;
use crate::model::Florence2Detector;
use crate::output::{ExtractionOutput, ExtractionStats, PageResult};
use crate::pipeline::crop::{create_run_dir, save_crops};
use crate::pipeline::detect::Detector;
use crate::pipeline::{input, render};
use chrono::Local;
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Extract every table and figure of a PDF file or URL.
///
/// Loads the detection model named by `config.model_id` on the device
/// chosen by [`resolve_device`].
///
/// # Errors
/// Any failure is fatal: missing or invalid input, pdfium errors, model
/// loading or inference errors, out-of-bounds boxes under
/// [`BoxPolicy::Strict`](crate::BoxPolicy::Strict) and filesystem errors.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    run_blocking(input_str.as_ref(), config, extract_blocking).await
}

/// Like [`extract`], with a caller-supplied detector instead of the
/// Florence-2 model.
pub async fn extract_with_detector<D>(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
    mut detector: D,
) -> Result<ExtractionOutput, ExtractError>
where
    D: Detector + Send + 'static,
{
    run_blocking(input_str.as_ref(), config, move |pdf_path, config| {
        let total_start = Instant::now();
        let (rendered, render_duration_ms) = render_timed(pdf_path, config)?;
        let mut output = run_pages(&rendered.pages, rendered.total_pages, &mut detector, config)?;
        output.stats.render_duration_ms = render_duration_ms;
        output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        Ok(output)
    })
    .await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Extract from PDF bytes held in memory.
///
/// The bytes are written to a managed temporary file that is removed when
/// the call returns.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    extract(&path, config).await
}

/// Detect, crop and save already-rasterised pages.
///
/// `pages` holds `(page_index, image)` pairs in processing order;
/// `total_pages` is the page count of the source document. The run
/// directory is created before the first page is processed.
pub fn run_pages<D: Detector + ?Sized>(
    pages: &[(usize, DynamicImage)],
    total_pages: usize,
    detector: &mut D,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let started = Instant::now();
    let run_dir = create_run_dir(&config.output_dir, Local::now())?;
    info!("Saving crops to {}", run_dir.display());

    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_extraction_start(pages.len(), &run_dir);
    }

    let mut results = Vec::with_capacity(pages.len());
    for (page_index, image) in pages {
        let page_index = *page_index;
        if let Some(cb) = callback {
            cb.on_page_start(page_index, pages.len());
        }

        let detect_start = Instant::now();
        let annotation = detector.detect(image)?;
        let detect_duration_ms = detect_start.elapsed().as_millis() as u64;
        debug!(
            "Page {}: {} detections in {}ms",
            page_index,
            annotation.len(),
            detect_duration_ms
        );

        let crops = save_crops(image, &annotation, page_index, &run_dir, config.box_policy)?;
        info!("Page {} saved. Number of objects: {}", page_index, annotation.len());
        if crops.len() != annotation.len() {
            debug!(
                "Page {}: {} of {} boxes dropped by the box policy",
                page_index,
                annotation.len() - crops.len(),
                annotation.len()
            );
        }

        if let Some(cb) = callback {
            cb.on_page_complete(page_index, pages.len(), annotation.len(), crops.len());
        }
        results.push(PageResult {
            page_index,
            width: image.width(),
            height: image.height(),
            detected: annotation.len(),
            crops,
            detect_duration_ms,
        });
    }

    let stats = ExtractionStats {
        total_pages,
        processed_pages: results.len(),
        detected_objects: results.iter().map(|p| p.detected).sum(),
        saved_objects: results.iter().map(|p| p.crops.len()).sum(),
        detect_duration_ms: results.iter().map(|p| p.detect_duration_ms).sum(),
        total_duration_ms: started.elapsed().as_millis() as u64,
        ..ExtractionStats::default()
    };

    if let Some(cb) = callback {
        cb.on_extraction_complete(stats.processed_pages, stats.saved_objects);
    }

    Ok(ExtractionOutput {
        output_dir: run_dir,
        pages: results,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the input on the async side, then run `work` on a blocking worker.
async fn run_blocking<F>(
    input_str: &str,
    config: &ExtractionConfig,
    work: F,
) -> Result<ExtractionOutput, ExtractError>
where
    F: FnOnce(&Path, &ExtractionConfig) -> Result<ExtractionOutput, ExtractError> + Send + 'static,
{
    info!("Starting extraction: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let config = config.clone();

    tokio::task::spawn_blocking(move || work(resolved.path(), &config))
        .await
        .map_err(|e| ExtractError::Internal(format!("extraction task failed: {e}")))?
}

fn render_timed(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<(render::RenderedDocument, u64), ExtractError> {
    let start = Instant::now();
    let rendered = render::render_pages(pdf_path, config)?;
    let elapsed = start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", rendered.pages.len(), elapsed);
    Ok((rendered, elapsed))
}

fn extract_blocking(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    let (rendered, render_duration_ms) = render_timed(pdf_path, config)?;

    let device = resolve_device(config.device);
    let load_start = Instant::now();
    let mut detector = Florence2Detector::load(
        &config.model_id,
        config.revision.as_deref(),
        device,
        config.generation,
    )?;
    let model_load_duration_ms = load_start.elapsed().as_millis() as u64;

    let mut output = run_pages(&rendered.pages, rendered.total_pages, &mut detector, config)?;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.model_load_duration_ms = model_load_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {} objects from {} pages in {}ms",
        output.stats.saved_objects, output.stats.processed_pages, output.stats.total_duration_ms
    );
    Ok(output)
}
