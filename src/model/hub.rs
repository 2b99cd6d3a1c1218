//! Model artefact resolution: local directory or HuggingFace Hub repository.

use crate::error::ExtractError;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_FILE: &str = "config.json";
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const VISION_ENCODER_FILE: &str = "onnx/vision_encoder.onnx";
pub const EMBED_TOKENS_FILE: &str = "onnx/embed_tokens.onnx";
pub const ENCODER_FILE: &str = "onnx/encoder_model.onnx";
pub const DECODER_FILE: &str = "onnx/decoder_model.onnx";

const ONNX_DIR: &str = "onnx/";

/// Local paths of every file a Florence-2 ONNX export needs.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub preprocessor_config: PathBuf,
    pub tokenizer: PathBuf,
    pub vision_encoder: PathBuf,
    pub embed_tokens: PathBuf,
    pub encoder: PathBuf,
    pub decoder: PathBuf,
}

impl ModelFiles {
    fn from_fetch(
        mut fetch: impl FnMut(&'static str) -> Result<PathBuf, ExtractError>,
    ) -> Result<Self, ExtractError> {
        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            preprocessor_config: fetch(PREPROCESSOR_CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            vision_encoder: fetch(VISION_ENCODER_FILE)?,
            embed_tokens: fetch(EMBED_TOKENS_FILE)?,
            encoder: fetch(ENCODER_FILE)?,
            decoder: fetch(DECODER_FILE)?,
        })
    }
}

/// Resolve `model_id` to local files.
///
/// An existing directory is used as-is; anything else is treated as a Hub
/// repository id and downloaded into the HuggingFace cache.
pub fn resolve_model_files(
    model_id: &str,
    revision: Option<&str>,
) -> Result<ModelFiles, ExtractError> {
    let local = Path::new(model_id);
    if local.is_dir() {
        debug!("Loading model from local directory {}", local.display());
        return ModelFiles::from_fetch(|file| {
            local_file(model_id, local, file).map_err(|e| mark_missing_export(e, file))
        });
    }

    let api = ApiBuilder::new()
        .with_progress(true)
        .build()
        .map_err(|e| unavailable(model_id, "<hub api>", e))?;
    let repo = match revision {
        Some(rev) => api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            rev.to_string(),
        )),
        None => api.model(model_id.to_string()),
    };

    info!("Fetching model files for {}", model_id);
    ModelFiles::from_fetch(|file| {
        repo.get(file)
            .map_err(|e| mark_missing_export(unavailable(model_id, file, e), file))
    })
}

fn local_file(model_id: &str, dir: &Path, file: &str) -> Result<PathBuf, ExtractError> {
    let path = dir.join(file);
    if path.is_file() {
        Ok(path)
    } else {
        Err(unavailable(model_id, file, "file does not exist"))
    }
}

/// The JSON files are fetched first, so a missing graph after them means the
/// repository or directory holds a checkpoint without an ONNX export.
fn mark_missing_export(err: ExtractError, file: &str) -> ExtractError {
    match err {
        ExtractError::ModelFileUnavailable {
            model_id,
            file: missing,
            detail,
        } if file.starts_with(ONNX_DIR) => ExtractError::MissingOnnxExport {
            model_id,
            file: missing,
            detail,
        },
        other => other,
    }
}

fn unavailable(model_id: &str, file: &str, err: impl std::fmt::Display) -> ExtractError {
    ExtractError::ModelFileUnavailable {
        model_id: model_id.to_string(),
        file: file.to_string(),
        detail: err.to_string(),
    }
}
