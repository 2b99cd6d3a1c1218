//! Pipeline stages for table/figure extraction.
//!
//! Each submodule implements one step and is testable on its own; detection
//! is reached only through the [`detect::Detector`] trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ detect ──▶ postprocess ──▶ crop
//! (URL/path)  (pdfium)  (model)    (loc tokens)    (PNG files)
//! ```
//!
//! 1. [`input`]  — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`] — rasterise selected pages; blocking, run off the async runtime
//! 3. [`detect`] — the detection contract: boxes and labels per page image
//! 4. [`postprocess`] — parse generated location tokens into pixel boxes
//! 5. [`crop`]   — apply the box policy, cut regions out and write them

pub mod crop;
pub mod detect;
pub mod input;
pub mod postprocess;
pub mod render;
