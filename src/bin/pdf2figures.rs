//! CLI binary for pdf2figures.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2figures::{
    extract, BoxPolicy, Device, ExtractionConfig, ExtractionProgressCallback, PageSelection,
    ProgressCallback, DEFAULT_MODEL_ID, DEFAULT_OUTPUT_DIR,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the PDF is rendered and the
/// model loads, then a page bar with one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering PDF and loading model…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Detecting");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize, output_dir: &Path) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("Extracting from {total_pages} pages")),
            dim(&output_dir.display().to_string())
        ));
    }

    fn on_page_start(&self, page_index: usize, _total: usize) {
        *self.page_started.lock().unwrap() = Some(Instant::now());
        self.bar.set_message(format!("page {page_index}"));
    }

    fn on_page_complete(&self, page_index: usize, total: usize, detected: usize, saved: usize) {
        let elapsed_ms = self
            .page_started
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {:<10}  {}",
            green("✓"),
            page_index,
            total,
            dim(&format!("{detected:>3} objects")),
            dim(&format!("{saved:>3} saved")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, total_objects: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} objects saved from {} pages",
            green("✔"),
            bold(&total_objects.to_string()),
            total_pages
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local ONNX export of TF-ID-large, crops under ./sample_output/<timestamp>/
  pdf2figures --model ./models/tf-id-large-onnx paper.pdf

  # Smaller export, custom output root, force CPU
  pdf2figures --model ./models/tf-id-base-onnx --output-dir ./figures --device cpu paper.pdf

  # Same export on the first GPU
  pdf2figures --model ./models/tf-id-large-onnx --device cuda:0 paper.pdf

  # Selected pages, greedy decoding, JSON report
  PDF2FIGURES_MODEL=./models/tf-id-large-onnx pdf2figures --pages 3-8 --num-beams 1 --json paper.pdf > crops.json

  # From URL
  PDF2FIGURES_MODEL=./models/tf-id-large-onnx pdf2figures https://arxiv.org/pdf/1706.03762

MODEL FILES:
  A model is a local directory or a HuggingFace Hub repository holding a
  Florence-2 ONNX export (onnx-community layout):
    config.json  preprocessor_config.json  tokenizer.json
    onnx/vision_encoder.onnx  onnx/embed_tokens.onnx
    onnx/encoder_model.onnx   onnx/decoder_model.onnx

  The default id names the TF-ID-large checkpoint. Its Hub repository ships
  PyTorch weights only, so without a repository that adds the onnx/ graphs
  the run stops with a "no ONNX export" error. Export the checkpoint once
  and point --model at the export directory.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  HF_HOME                 HuggingFace cache location
  RUST_LOG                Log filter, overrides -v / -q
  PDF2FIGURES_*           Any flag, e.g. PDF2FIGURES_DEVICE=cpu
"#;

/// Extract tables and figures from PDF documents as cropped PNG images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2figures",
    version,
    about = "Extract tables and figures from PDF files as cropped images",
    long_about = "Render every page of a PDF, detect tables and figures with a Florence-2 \
object-detection model (TF-ID) on ONNX Runtime, and save each detected region as a PNG \
under <output-dir>/<YYYYMMDD-HHMMSS>/.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Detection model: local ONNX export directory or HuggingFace repository id.
    #[arg(long, env = "PDF2FIGURES_MODEL", default_value = DEFAULT_MODEL_ID)]
    model: String,

    /// Hub revision (branch, tag or commit) of the model.
    #[arg(long, env = "PDF2FIGURES_REVISION")]
    revision: Option<String>,

    /// Root directory; each run writes into a timestamped subdirectory.
    #[arg(short, long, env = "PDF2FIGURES_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Compute device: auto, cpu, cuda, cuda:N.
    #[arg(long, env = "PDF2FIGURES_DEVICE", default_value = "auto")]
    device: String,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2FIGURES_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2FIGURES_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2FIGURES_PASSWORD")]
    password: Option<String>,

    /// Beam width; 1 means greedy decoding.
    #[arg(long, env = "PDF2FIGURES_NUM_BEAMS", default_value_t = 3)]
    num_beams: usize,

    /// Maximum generated tokens per page.
    #[arg(long, env = "PDF2FIGURES_MAX_NEW_TOKENS", default_value_t = 1024)]
    max_new_tokens: usize,

    /// Boxes outside the page: clamp, skip, strict.
    #[arg(long, env = "PDF2FIGURES_BOX_POLICY", default_value = "clamp")]
    box_policy: String,

    /// Print the run report (ExtractionOutput) as JSON on stdout.
    #[arg(long, env = "PDF2FIGURES_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2FIGURES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2FIGURES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2FIGURES_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2FIGURES_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level page logs when it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    let output = extract(&cli.input, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        for crop in output.crops() {
            println!("{}", crop.path.display());
        }
        eprintln!(
            "{}  {} objects / {} pages  {}ms  →  {}",
            green("✔"),
            output.stats.saved_objects,
            output.stats.processed_pages,
            output.stats.total_duration_ms,
            bold(&output.output_dir.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let pages = parse_pages(&cli.pages)?;
    let box_policy: BoxPolicy = cli.box_policy.parse().context("Invalid --box-policy")?;

    let mut builder = ExtractionConfig::builder()
        .model_id(cli.model.clone())
        .output_dir(cli.output_dir.clone())
        .dpi(cli.dpi)
        .pages(pages)
        .num_beams(cli.num_beams)
        .max_new_tokens(cli.max_new_tokens)
        .box_policy(box_policy)
        .download_timeout_secs(cli.download_timeout);

    if let Some(device) = parse_device(&cli.device)? {
        builder = builder.device(device);
    }
    if let Some(ref revision) = cli.revision {
        builder = builder.revision(revision.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `auto` → `None`; anything else must name a device.
fn parse_device(s: &str) -> Result<Option<Device>> {
    if s.trim().eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    let device = s.parse::<Device>().context("Invalid --device")?;
    Ok(Some(device))
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
