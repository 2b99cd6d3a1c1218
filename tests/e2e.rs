//! End-to-end integration tests for pdf2figures.
//!
//! These tests use real PDF files in `./test_cases/`, a pdfium library and,
//! for the detection tests, a Florence-2 ONNX export of TF-ID. They are
//! gated behind the `E2E_ENABLED` environment variable so they do not run in
//! CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! The model is read from `E2E_MODEL` (export directory or Hub repository
//! with an `onnx/` folder), falling back to `./models/tf-id-base-onnx`.
//! Detection tests are skipped when neither is available:
//!   E2E_MODEL=/data/tf-id-large-onnx E2E_ENABLED=1 cargo test --test e2e

use image::DynamicImage;
use pdf2figures::{
    extract, extract_from_bytes, extract_sync, extract_with_detector, Annotation, Detector,
    Device, ExtractError, ExtractionConfig, PageSelection,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// `E2E_MODEL`, or the default export directory when it exists.
fn model_id() -> Option<String> {
    if let Ok(model) = std::env::var("E2E_MODEL") {
        return Some(model);
    }
    let local = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/tf-id-base-onnx");
    local
        .is_dir()
        .then(|| local.to_string_lossy().to_string())
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Like `e2e_skip_unless_ready!`, and also skip when no ONNX export is configured.
macro_rules! e2e_skip_unless_model {
    ($path:expr) => {{
        let p = e2e_skip_unless_ready!($path);
        let Some(model) = model_id() else {
            println!("SKIP — set E2E_MODEL to a Florence-2 ONNX export");
            return;
        };
        (p, model)
    }};
}

fn config(model: &str, out: &std::path::Path, pages: PageSelection) -> ExtractionConfig {
    ExtractionConfig::builder()
        .model_id(model)
        .output_dir(out)
        .device(Device::Cpu)
        .pages(pages)
        .build()
        .expect("valid config")
}

/// Records the size of every page it is given and detects nothing.
#[derive(Clone, Default)]
struct CountingDetector {
    seen: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl Detector for CountingDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Annotation, ExtractError> {
        self.seen
            .lock()
            .unwrap()
            .push((image.width(), image.height()));
        Ok(Annotation::default())
    }
}

// ── Rendering tests (need pdfium only) ───────────────────────────────────────

/// Every page of the document reaches the detector exactly once, in order.
#[tokio::test]
async fn test_all_pages_rendered_in_document_order() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let out = tempfile::tempdir().unwrap();
    let detector = CountingDetector::default();
    let seen = Arc::clone(&detector.seen);
    let config = ExtractionConfig::builder()
        .output_dir(out.path())
        .pages(PageSelection::All)
        .build()
        .unwrap();

    let output = extract_with_detector(path.to_str().unwrap(), &config, detector)
        .await
        .expect("rendering should succeed");

    let total = output.stats.total_pages;
    assert_eq!(total, 15);
    assert_eq!(output.stats.processed_pages, total);
    assert_eq!(output.pages.len(), total);
    let indices: Vec<usize> = output.pages.iter().map(|p| p.page_index).collect();
    assert_eq!(indices, (0..total).collect::<Vec<_>>());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), total, "detector must run once per page");
    for (page, size) in output.pages.iter().zip(seen.iter()) {
        assert_eq!((page.width, page.height), *size);
    }
    assert_eq!(output.stats.saved_objects, 0);
}

/// A checkpoint directory without `onnx/` graphs is rejected before any output.
#[tokio::test]
async fn test_checkpoint_without_onnx_export_is_reported() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let checkpoint = tempfile::tempdir().unwrap();
    for file in ["config.json", "preprocessor_config.json", "tokenizer.json", "pytorch_model.bin"] {
        std::fs::write(checkpoint.path().join(file), b"{}").unwrap();
    }
    let out = tempfile::tempdir().unwrap();
    let config = config(
        checkpoint.path().to_str().unwrap(),
        out.path(),
        PageSelection::Single(1),
    );

    let err = extract(path.to_str().unwrap(), &config).await.unwrap_err();
    assert!(
        matches!(err, ExtractError::MissingOnnxExport { .. }),
        "got: {err}"
    );
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

// ── Extraction tests (need pdfium + model) ───────────────────────────────────

/// Page 3 of the Attention paper holds the Transformer architecture figure.
#[tokio::test]
async fn test_extract_attention_figure() {
    let (path, model) =
        e2e_skip_unless_model!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let out = tempfile::tempdir().unwrap();

    let output = extract(path.to_str().unwrap(), &config(&model, out.path(), PageSelection::Single(3)))
        .await
        .expect("extraction should succeed");

    assert_eq!(output.stats.total_pages, 15);
    assert_eq!(output.stats.processed_pages, 1);
    assert_eq!(output.pages[0].page_index, 2);
    assert!(
        output.stats.saved_objects >= 1,
        "expected at least one figure on page 3"
    );

    for crop in output.crops() {
        assert!(crop.path.exists(), "missing {}", crop.path.display());
        let name = crop.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("page_2_"), "unexpected name {name}");
        assert!(name.ends_with(".png"));
        println!("[attention] {} {:?}", name, crop.rect);
    }
}

/// Two identical runs must produce identical files.
#[tokio::test]
async fn test_extract_is_deterministic() {
    let (path, model) =
        e2e_skip_unless_model!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = extract(path.to_str().unwrap(), &config(&model, first.path(), PageSelection::Range(1, 4)))
        .await
        .expect("first run");
    let b = extract(path.to_str().unwrap(), &config(&model, second.path(), PageSelection::Range(1, 4)))
        .await
        .expect("second run");

    let names = |o: &pdf2figures::ExtractionOutput| {
        o.crops()
            .map(|c| c.path.file_name().unwrap().to_owned())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&a), names(&b));
    for (ca, cb) in a.crops().zip(b.crops()) {
        assert_eq!(
            std::fs::read(&ca.path).unwrap(),
            std::fs::read(&cb.path).unwrap()
        );
    }
}

#[tokio::test]
async fn test_extract_from_bytes_matches_path() {
    let (path, model) =
        e2e_skip_unless_model!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let out = tempfile::tempdir().unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let output = extract_from_bytes(&bytes, &config(&model, out.path(), PageSelection::Single(1)))
        .await
        .expect("extraction from bytes should succeed");
    assert_eq!(output.stats.processed_pages, 1);
}

#[test]
fn test_extract_sync_page_out_of_range() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let out = tempfile::tempdir().unwrap();

    let err = extract_sync(path.to_str().unwrap(), &config(pdf2figures::DEFAULT_MODEL_ID, out.path(), PageSelection::Single(99)))
        .unwrap_err();
    assert!(
        matches!(err, ExtractError::PageOutOfRange { total: 15 }),
        "got: {err}"
    );
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_model_is_reported() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let out = tempfile::tempdir().unwrap();
    let config = ExtractionConfig::builder()
        .model_id("pdf2figures-test/does-not-exist")
        .output_dir(out.path())
        .device(Device::Cpu)
        .pages(PageSelection::Single(1))
        .build()
        .unwrap();

    let err = extract(path.to_str().unwrap(), &config).await.unwrap_err();
    assert!(
        matches!(err, ExtractError::ModelFileUnavailable { .. }),
        "got: {err}"
    );
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
