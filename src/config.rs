//! Configuration types for table/figure extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`].

use crate::device::Device;
use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default pretrained detection model.
pub const DEFAULT_MODEL_ID: &str = "yifeihu/TF-ID-large";

/// Default root under which each run creates its timestamped directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./sample_output";

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2figures::{Device, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .model_id("./models/tf-id-base-onnx")
///     .output_dir("./crops")
///     .device(Device::Cpu)
///     .build()
///     .unwrap();
/// assert_eq!(config.generation.num_beams, 3);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier: a local directory or a HuggingFace Hub repository
    /// holding a Florence-2 ONNX export. Default: [`DEFAULT_MODEL_ID`],
    /// whose Hub repository carries PyTorch weights only; point this at an
    /// exported directory to run it.
    pub model_id: String,

    /// Hub revision (branch, tag or commit). `None` uses `main`.
    pub revision: Option<String>,

    /// Root directory for outputs. Each run writes into
    /// `<output_dir>/<YYYYMMDD-HHMMSS>/`. Default: [`DEFAULT_OUTPUT_DIR`].
    pub output_dir: PathBuf,

    /// Compute device override. `None` selects automatically.
    pub device: Option<Device>,

    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 200.
    pub dpi: u32,

    /// Optional cap on the longest edge of a rendered page, in pixels.
    pub max_rendered_pixels: Option<u32>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Decoding parameters for the detection model.
    pub generation: GenerationConfig,

    /// What to do with boxes that fall outside the page image. Default: [`BoxPolicy::Clamp`].
    pub box_policy: BoxPolicy,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            device: None,
            dpi: 200,
            max_rendered_pixels: None,
            pages: PageSelection::default(),
            password: None,
            generation: GenerationConfig::default(),
            box_policy: BoxPolicy::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model_id", &self.model_id)
            .field("revision", &self.revision)
            .field("output_dir", &self.output_dir)
            .field("device", &self.device)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("generation", &self.generation)
            .field("box_policy", &self.box_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model_id(mut self, id: impl Into<String>) -> Self {
        self.config.model_id = id.into();
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.config.revision = Some(revision.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.config.device = Some(device);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = Some(px.max(100));
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn num_beams(mut self, n: usize) -> Self {
        self.config.generation.num_beams = n;
        self
    }

    pub fn max_new_tokens(mut self, n: usize) -> Self {
        self.config.generation.max_new_tokens = n;
        self
    }

    pub fn box_policy(mut self, policy: BoxPolicy) -> Self {
        self.config.box_policy = policy;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.model_id.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model id must not be empty".into()));
        }
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.generation.num_beams == 0 {
            return Err(ExtractError::InvalidConfig("num_beams must be ≥ 1".into()));
        }
        if c.generation.max_new_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_new_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Decoding parameters passed to the model's generation loop.
///
/// Sampling is never used; with `num_beams == 1` decoding is greedy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Beam width. Default: 3.
    pub num_beams: usize,
    /// Upper bound on generated tokens per page. Default: 1024.
    pub max_new_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_beams: 3,
            max_new_tokens: 1024,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Handling of detected boxes that extend past the page image or have no area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoxPolicy {
    /// Clamp to the image bounds; drop the box if nothing is left. (default)
    #[default]
    Clamp,
    /// Drop any box that is not fully inside the image or has zero area.
    Skip,
    /// Abort the run with [`ExtractError::BoxOutOfBounds`].
    Strict,
}

impl std::str::FromStr for BoxPolicy {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clamp" => Ok(BoxPolicy::Clamp),
            "skip" => Ok(BoxPolicy::Skip),
            "strict" | "error" => Ok(BoxPolicy::Strict),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown box policy '{other}' (expected clamp, skip or strict)"
            ))),
        }
    }
}

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_pipeline() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model_id, "yifeihu/TF-ID-large");
        assert_eq!(c.output_dir, PathBuf::from("./sample_output"));
        assert_eq!(c.device, None);
        assert_eq!(c.dpi, 200);
        assert_eq!(c.generation.num_beams, 3);
        assert_eq!(c.generation.max_new_tokens, 1024);
        assert_eq!(c.box_policy, BoxPolicy::Clamp);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(ExtractionConfig::builder().dpi(10).build().is_err());
        assert!(ExtractionConfig::builder().num_beams(0).build().is_err());
        assert!(ExtractionConfig::builder().max_new_tokens(0).build().is_err());
        assert!(ExtractionConfig::builder().model_id("  ").build().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let c = ExtractionConfig::builder()
            .model_id("local/model")
            .device(Device::Cuda(1))
            .box_policy(BoxPolicy::Strict)
            .num_beams(1)
            .build()
            .unwrap();
        assert_eq!(c.model_id, "local/model");
        assert_eq!(c.device, Some(Device::Cuda(1)));
        assert_eq!(c.box_policy, BoxPolicy::Strict);
        assert_eq!(c.generation.num_beams, 1);
    }

    #[test]
    fn parse_box_policy() {
        assert_eq!("Clamp".parse::<BoxPolicy>().unwrap(), BoxPolicy::Clamp);
        assert_eq!("skip".parse::<BoxPolicy>().unwrap(), BoxPolicy::Skip);
        assert_eq!("error".parse::<BoxPolicy>().unwrap(), BoxPolicy::Strict);
        assert!("maybe".parse::<BoxPolicy>().is_err());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(5), vec![1, 2, 3, 4]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
    }
}
