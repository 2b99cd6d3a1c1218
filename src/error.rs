//! Error type for the pdf2figures library.
//!
//! Every failure is fatal for the run: [`ExtractError`] is returned from the
//! top-level `extract*` functions and aborts processing of the remaining
//! pages. Crops already written for earlier pages stay on disk.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf2figures library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page selection matches no page (document has {total} pages)")]
    PageOutOfRange { total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// A model artefact could not be found locally or fetched from the hub.
    #[error("Model '{model_id}': cannot resolve '{file}': {detail}")]
    ModelFileUnavailable {
        model_id: String,
        file: String,
        detail: String,
    },

    /// The model's configuration resolved but its ONNX graphs did not.
    #[error(
        "Model '{model_id}' has no ONNX export: cannot resolve '{file}': {detail}\n\n\
Florence-2 checkpoints such as yifeihu/TF-ID-large ship PyTorch weights only.\n\
Export the checkpoint to ONNX in the onnx-community Florence-2 layout\n\
(onnx/vision_encoder.onnx, onnx/embed_tokens.onnx, onnx/encoder_model.onnx,\n\
onnx/decoder_model.onnx next to config.json, preprocessor_config.json and\n\
tokenizer.json), then pass the export directory with --model <DIR>\n\
(or PDF2FIGURES_MODEL=<DIR>).\n"
    )]
    MissingOnnxExport {
        model_id: String,
        file: String,
        detail: String,
    },

    /// A model configuration file exists but could not be parsed.
    #[error("Invalid model configuration '{path}': {detail}")]
    InvalidModelConfig { path: PathBuf, detail: String },

    /// ONNX Runtime refused to build a session for a model file.
    #[error("Failed to load ONNX model '{path}': {detail}")]
    SessionLoadFailed { path: PathBuf, detail: String },

    /// The tokenizer could not be loaded or failed to encode/decode.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// The requested compute device is not usable.
    #[error("Device '{device}' is not available: {detail}")]
    DeviceUnavailable { device: String, detail: String },

    // ── Detection errors ──────────────────────────────────────────────────
    /// Running one of the model graphs failed.
    #[error("Inference failed in {stage}: {detail}")]
    InferenceFailed { stage: &'static str, detail: String },

    /// A model graph returned a tensor of unexpected shape.
    #[error("Unexpected model output from {stage}: {detail}")]
    InvalidModelOutput { stage: &'static str, detail: String },

    /// The detector returned a different number of boxes and labels.
    #[error("Page {page}: detector returned {bboxes} boxes but {labels} labels")]
    AnnotationMismatch {
        page: usize,
        bboxes: usize,
        labels: usize,
    },

    /// A box lies (partly) outside the page image, or has zero area,
    /// and the box policy is `Strict`.
    #[error(
        "Page {page}: box {index} ({x1}, {y1}, {x2}, {y2}) is outside the {width}x{height} image or empty"
    )]
    BoxOutOfBounds {
        page: usize,
        index: usize,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        height: u32,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the run's output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not encode or write a cropped image.
    #[error("Failed to write crop '{path}': {source}")]
    CropWriteFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub(crate) fn inference(stage: &'static str, err: impl std::fmt::Display) -> Self {
        ExtractError::InferenceFailed {
            stage,
            detail: err.to_string(),
        }
    }

    pub(crate) fn invalid_output(stage: &'static str, detail: impl Into<String>) -> Self {
        ExtractError::InvalidModelOutput {
            stage,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_mismatch_display() {
        let e = ExtractError::AnnotationMismatch {
            page: 2,
            bboxes: 3,
            labels: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"), "got: {msg}");
        assert!(msg.contains("3 boxes"), "got: {msg}");
        assert!(msg.contains("2 labels"), "got: {msg}");
    }

    #[test]
    fn box_out_of_bounds_display() {
        let e = ExtractError::BoxOutOfBounds {
            page: 0,
            index: 1,
            x1: -5.0,
            y1: 0.0,
            x2: 20.0,
            y2: 30.0,
            width: 100,
            height: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("box 1"), "got: {msg}");
        assert!(msg.contains("100x50"), "got: {msg}");
    }

    #[test]
    fn inference_helper_keeps_stage() {
        let e = ExtractError::inference("decoder", "out of memory");
        assert!(e.to_string().contains("decoder"));
        assert!(e.to_string().contains("out of memory"));
    }

    #[test]
    fn model_file_display() {
        let e = ExtractError::ModelFileUnavailable {
            model_id: "yifeihu/TF-ID-large".into(),
            file: "onnx/vision_encoder.onnx".into(),
            detail: "404".into(),
        };
        assert!(e.to_string().contains("onnx/vision_encoder.onnx"));
    }

    #[test]
    fn missing_onnx_export_explains_the_fix() {
        let e = ExtractError::MissingOnnxExport {
            model_id: "yifeihu/TF-ID-large".into(),
            file: "onnx/vision_encoder.onnx".into(),
            detail: "404".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("no ONNX export"), "got: {msg}");
        assert!(msg.contains("--model <DIR>"), "got: {msg}");
    }
}
