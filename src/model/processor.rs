//! Model-side pre/post-processing: configuration files, pixel tensors and
//! prompt tokenisation.

use crate::error::ExtractError;
use crate::model::generation::DecodingParams;
use crate::config::GenerationConfig;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tokenizers::Tokenizer;

/// Image preprocessing parameters (`preprocessor_config.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default)]
    pub size: ImageSize,
    #[serde(default = "default_image_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_image_std")]
    pub image_std: [f32; 3],
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    #[serde(default = "default_true")]
    pub do_normalize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            height: 768,
            width: 768,
        }
    }
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            size: ImageSize::default(),
            image_mean: default_image_mean(),
            image_std: default_image_std(),
            rescale_factor: default_rescale_factor(),
            do_rescale: true,
            do_normalize: true,
        }
    }
}

fn default_image_mean() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}

fn default_image_std() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_true() -> bool {
    true
}

impl PreprocessorConfig {
    /// Resize to the model's input size and build a `[1, 3, H, W]` tensor.
    pub fn pixel_values(&self, image: &DynamicImage) -> Array4<f32> {
        let (width, height) = (self.size.width, self.size.height);
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, width, height, FilterType::CatmullRom);

        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let mut v = pixel[c] as f32;
                if self.do_rescale {
                    v *= self.rescale_factor;
                }
                if self.do_normalize {
                    v = (v - self.image_mean[c]) / self.image_std[c];
                }
                tensor[[0, c, y as usize, x as usize]] = v;
            }
        }
        tensor
    }
}

/// Decoder settings read from `config.json` (`text_config` when present).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextModelConfig {
    #[serde(default = "default_eos")]
    pub eos_token_id: u32,
    #[serde(default = "default_eos")]
    pub decoder_start_token_id: u32,
    #[serde(default = "default_forced_bos")]
    pub forced_bos_token_id: Option<u32>,
    #[serde(default = "default_forced_eos")]
    pub forced_eos_token_id: Option<u32>,
    #[serde(default = "default_no_repeat_ngram_size")]
    pub no_repeat_ngram_size: usize,
    #[serde(default = "default_length_penalty")]
    pub length_penalty: f32,
}

fn default_eos() -> u32 {
    2
}

fn default_forced_bos() -> Option<u32> {
    Some(0)
}

fn default_forced_eos() -> Option<u32> {
    Some(2)
}

fn default_no_repeat_ngram_size() -> usize {
    3
}

fn default_length_penalty() -> f32 {
    1.0
}

impl Default for TextModelConfig {
    fn default() -> Self {
        Self {
            eos_token_id: default_eos(),
            decoder_start_token_id: default_eos(),
            forced_bos_token_id: default_forced_bos(),
            forced_eos_token_id: default_forced_eos(),
            no_repeat_ngram_size: default_no_repeat_ngram_size(),
            length_penalty: default_length_penalty(),
        }
    }
}

impl TextModelConfig {
    /// Parse a `config.json` body, preferring its nested `text_config`.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let mut root: serde_json::Value = serde_json::from_str(body)?;
        if let Some(text) = root.get_mut("text_config").filter(|t| t.is_object()) {
            return serde_json::from_value(text.take());
        }
        serde_json::from_value(root)
    }

    pub fn decoding_params(&self, generation: &GenerationConfig) -> DecodingParams {
        DecodingParams {
            num_beams: generation.num_beams,
            max_new_tokens: generation.max_new_tokens,
            decoder_start_token_id: self.decoder_start_token_id,
            eos_token_id: self.eos_token_id,
            forced_bos_token_id: self.forced_bos_token_id,
            forced_eos_token_id: self.forced_eos_token_id,
            no_repeat_ngram_size: self.no_repeat_ngram_size,
            length_penalty: self.length_penalty,
        }
    }
}

/// Read and deserialize a JSON model file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ExtractError> {
    let body = std::fs::read_to_string(path).map_err(|e| invalid_config(path, e))?;
    serde_json::from_str(&body).map_err(|e| invalid_config(path, e))
}

pub fn read_text_config(path: &Path) -> Result<TextModelConfig, ExtractError> {
    let body = std::fs::read_to_string(path).map_err(|e| invalid_config(path, e))?;
    TextModelConfig::from_json(&body).map_err(|e| invalid_config(path, e))
}

fn invalid_config(path: &Path, err: impl std::fmt::Display) -> ExtractError {
    ExtractError::InvalidModelConfig {
        path: path.to_path_buf(),
        detail: err.to_string(),
    }
}

/// Tokenizer wrapper for prompts and generated ids.
pub struct PromptCodec {
    tokenizer: Tokenizer,
}

impl PromptCodec {
    pub fn from_file(path: &Path) -> Result<Self, ExtractError> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| ExtractError::Tokenizer(format!("{}: {}", path.display(), e)))?;
        Ok(Self { tokenizer })
    }

    /// Token ids of `prompt`, with the tokenizer's special tokens added.
    pub fn encode(&self, prompt: &str) -> Result<Vec<i64>, ExtractError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ExtractError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().iter().map(|&id| id as i64).collect())
    }

    /// Decode ids keeping special tokens; location tokens are special.
    pub fn decode(&self, ids: &[u32]) -> Result<String, ExtractError> {
        self.tokenizer
            .decode(ids, false)
            .map_err(|e| ExtractError::Tokenizer(e.to_string()))
    }
}
