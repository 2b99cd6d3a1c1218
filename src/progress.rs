//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline processes each page.
//!
//! # Example
//!
//! ```rust
//! use pdf2figures::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     objects: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(
//!         &self,
//!         page_index: usize,
//!         total_pages: usize,
//!         detected: usize,
//!         _saved: usize,
//!     ) {
//!         self.objects.fetch_add(detected, Ordering::SeqCst);
//!         eprintln!("Page {} of {}: {} objects", page_index, total_pages, detected);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { objects: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages are processed one after another on a blocking worker thread, so
/// events arrive in order, but not on the caller's thread. All methods have
/// default no-op implementations.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the output directory has been created, before the
    /// first page is processed.
    ///
    /// # Arguments
    /// * `total_pages` — number of pages that will be processed
    /// * `output_dir`  — the run's timestamped directory
    fn on_extraction_start(&self, total_pages: usize, output_dir: &Path) {
        let _ = (total_pages, output_dir);
    }

    /// Called just before detection runs on a page.
    ///
    /// # Arguments
    /// * `page_index`  — 0-based page index
    /// * `total_pages` — number of pages being processed
    fn on_page_start(&self, page_index: usize, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called after all crops of a page are written.
    ///
    /// # Arguments
    /// * `page_index`  — 0-based page index
    /// * `total_pages` — number of pages being processed
    /// * `detected`    — number of objects the detector reported
    /// * `saved`       — number of crops written (fewer when boxes were dropped)
    fn on_page_complete(
        &self,
        page_index: usize,
        total_pages: usize,
        detected: usize,
        saved: usize,
    ) {
        let _ = (page_index, total_pages, detected, saved);
    }

    /// Called once after the last page.
    ///
    /// # Arguments
    /// * `total_pages`   — number of pages processed
    /// * `total_objects` — number of crops saved across the run
    fn on_extraction_complete(&self, total_pages: usize, total_objects: usize) {
        let _ = (total_pages, total_objects);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
