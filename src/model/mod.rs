//! Florence-2 object detection on ONNX Runtime.
//!
//! The model is exported as four graphs:
//!
//! ```text
//! pixel_values ──► vision_encoder ──► image_features ─┐
//! prompt ids ──► embed_tokens ──► text embeddings ────┴► concat ──► encoder ──► hidden
//! decoder ids ──► embed_tokens ──► decoder(hidden) ──► logits ──► beam search
//! ```
//!
//! The generated ids are decoded with special tokens kept and parsed into
//! boxes by [`crate::pipeline::postprocess::parse_detections`].

pub mod generation;
pub mod hub;
pub mod processor;
pub mod session;

use crate::config::GenerationConfig;
use crate::device::Device;
use crate::error::ExtractError;
use crate::model::generation::{generate, DecodingParams, StepScorer};
use crate::model::hub::resolve_model_files;
use crate::model::processor::{read_json, read_text_config, PreprocessorConfig, PromptCodec};
use crate::model::session::{ensure_device, load_session};
use crate::pipeline::detect::{Annotation, Detector};
use crate::pipeline::postprocess::parse_detections;
use crate::prompts::{task_instruction, OBJECT_DETECTION_TASK};
use image::DynamicImage;
use ndarray::{Array2, Array3};
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use std::time::Instant;
use tracing::{debug, info};

/// A tensor copied out of ONNX Runtime.
struct HostTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl HostTensor {
    fn from_value(value: &DynValue, stage: &'static str) -> Result<Self, ExtractError> {
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::inference(stage, e))?;
        Ok(Self {
            shape: shape.iter().map(|&d| d as usize).collect(),
            data: data.to_vec(),
        })
    }

    /// `(batch, seq, width)` of a rank-3 tensor.
    fn dims3(&self, stage: &'static str) -> Result<(usize, usize, usize), ExtractError> {
        match self.shape.as_slice() {
            &[b, s, w] if b * s * w == self.data.len() => Ok((b, s, w)),
            other => Err(ExtractError::invalid_output(
                stage,
                format!("expected a [batch, seq, dim] tensor, got shape {other:?}"),
            )),
        }
    }
}

fn ids_tensor(ids: Vec<i64>, batch: usize, len: usize) -> Result<DynValue, ExtractError> {
    let array = Array2::from_shape_vec((batch, len), ids)
        .map_err(|e| ExtractError::Internal(format!("input_ids shape: {e}")))?;
    Tensor::from_array(array)
        .map(|v| v.into_dyn())
        .map_err(|e| ExtractError::inference("embed_tokens", e))
}

fn mask_tensor(batch: usize, len: usize, stage: &'static str) -> Result<DynValue, ExtractError> {
    Tensor::from_array(Array2::<i64>::ones((batch, len)))
        .map(|v| v.into_dyn())
        .map_err(|e| ExtractError::inference(stage, e))
}

fn embeds_tensor(
    data: Vec<f32>,
    shape: (usize, usize, usize),
    stage: &'static str,
) -> Result<DynValue, ExtractError> {
    let array = Array3::from_shape_vec(shape, data)
        .map_err(|e| ExtractError::Internal(format!("{stage} embeddings shape: {e}")))?;
    Tensor::from_array(array)
        .map(|v| v.into_dyn())
        .map_err(|e| ExtractError::inference(stage, e))
}

fn embed(session: &mut Session, ids: Vec<i64>, batch: usize, len: usize) -> Result<HostTensor, ExtractError> {
    let input_ids = ids_tensor(ids, batch, len)?;
    let outputs = session
        .run(ort::inputs!["input_ids" => input_ids])
        .map_err(|e| ExtractError::inference("embed_tokens", e))?;
    HostTensor::from_value(&outputs[0], "embed_tokens")
}

/// Florence-2 (TF-ID) detector running the `<OD>` task.
pub struct Florence2Detector {
    vision_encoder: Session,
    embed_tokens: Session,
    encoder: Session,
    decoder: Session,
    preprocessor: PreprocessorConfig,
    codec: PromptCodec,
    decoding: DecodingParams,
    prompt_ids: Vec<i64>,
}

impl Florence2Detector {
    /// Resolve, download if needed, and load every model artefact onto `device`.
    pub fn load(
        model_id: &str,
        revision: Option<&str>,
        device: Device,
        generation: GenerationConfig,
    ) -> Result<Self, ExtractError> {
        ensure_device(device)?;
        let files = resolve_model_files(model_id, revision)?;

        let preprocessor: PreprocessorConfig = read_json(&files.preprocessor_config)?;
        let text_config = read_text_config(&files.config)?;
        let codec = PromptCodec::from_file(&files.tokenizer)?;
        let prompt_ids = codec.encode(task_instruction(OBJECT_DETECTION_TASK))?;
        debug!(
            "Preprocessor: {}x{}, prompt: {} tokens, decoding: {:?}",
            preprocessor.size.width,
            preprocessor.size.height,
            prompt_ids.len(),
            text_config
        );

        let detector = Self {
            vision_encoder: load_session(&files.vision_encoder, device)?,
            embed_tokens: load_session(&files.embed_tokens, device)?,
            encoder: load_session(&files.encoder, device)?,
            decoder: load_session(&files.decoder, device)?,
            preprocessor,
            codec,
            decoding: text_config.decoding_params(&generation),
            prompt_ids,
        };
        info!("Model {} loaded on {}", model_id, device);
        Ok(detector)
    }

    fn encode_image(&mut self, image: &DynamicImage) -> Result<HostTensor, ExtractError> {
        let pixels = Tensor::from_array(self.preprocessor.pixel_values(image))
            .map_err(|e| ExtractError::inference("vision_encoder", e))?;
        let image_features = {
            let outputs = self
                .vision_encoder
                .run(ort::inputs!["pixel_values" => pixels])
                .map_err(|e| ExtractError::inference("vision_encoder", e))?;
            HostTensor::from_value(&outputs[0], "vision_encoder")?
        };
        let (_, image_tokens, width) = image_features.dims3("vision_encoder")?;

        let prompt_len = self.prompt_ids.len();
        let prompt = embed(&mut self.embed_tokens, self.prompt_ids.clone(), 1, prompt_len)?;
        let (_, _, prompt_width) = prompt.dims3("embed_tokens")?;
        if prompt_width != width {
            return Err(ExtractError::invalid_output(
                "embed_tokens",
                format!("embedding width {prompt_width} does not match image features {width}"),
            ));
        }

        let seq_len = image_tokens + prompt_len;
        let mut joined = image_features.data;
        joined.extend_from_slice(&prompt.data);
        debug!("Encoder input: [1, {}, {}]", seq_len, width);

        let inputs_embeds = embeds_tensor(joined, (1, seq_len, width), "encoder")?;
        let attention_mask = mask_tensor(1, seq_len, "encoder")?;
        let outputs = self
            .encoder
            .run(ort::inputs![
                "inputs_embeds" => inputs_embeds,
                "attention_mask" => attention_mask
            ])
            .map_err(|e| ExtractError::inference("encoder", e))?;
        let hidden = HostTensor::from_value(&outputs[0], "encoder")?;
        hidden.dims3("encoder")?;
        Ok(hidden)
    }
}

impl Detector for Florence2Detector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Annotation, ExtractError> {
        let started = Instant::now();
        let encoder_hidden = self.encode_image(image)?;

        let mut scorer = DecoderScorer {
            embed_tokens: &mut self.embed_tokens,
            decoder: &mut self.decoder,
            encoder_hidden: &encoder_hidden,
        };
        let ids = generate(&mut scorer, &self.decoding)?;
        let text = self.codec.decode(&ids)?;
        debug!(
            "Generated {} tokens in {}ms: {}",
            ids.len(),
            started.elapsed().as_millis(),
            text
        );

        Ok(parse_detections(&text, image.width(), image.height()))
    }
}

/// Scores decoder steps by re-running the full decoder over each sequence.
struct DecoderScorer<'a> {
    embed_tokens: &'a mut Session,
    decoder: &'a mut Session,
    encoder_hidden: &'a HostTensor,
}

impl StepScorer for DecoderScorer<'_> {
    fn next_token_logits(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, ExtractError> {
        let batch = sequences.len();
        let len = sequences.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || len == 0 {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = sequences.iter().flatten().map(|&id| id as i64).collect();
        let embeds = embed(self.embed_tokens, ids, batch, len)?;
        let (_, _, width) = embeds.dims3("embed_tokens")?;

        let (_, src_len, hidden_width) = self.encoder_hidden.dims3("encoder")?;
        let mut hidden = Vec::with_capacity(batch * self.encoder_hidden.data.len());
        for _ in 0..batch {
            hidden.extend_from_slice(&self.encoder_hidden.data);
        }

        let inputs_embeds = embeds_tensor(embeds.data, (batch, len, width), "decoder")?;
        let encoder_hidden_states =
            embeds_tensor(hidden, (batch, src_len, hidden_width), "decoder")?;
        let encoder_attention_mask = mask_tensor(batch, src_len, "decoder")?;

        let outputs = self
            .decoder
            .run(ort::inputs![
                "encoder_attention_mask" => encoder_attention_mask,
                "encoder_hidden_states" => encoder_hidden_states,
                "inputs_embeds" => inputs_embeds
            ])
            .map_err(|e| ExtractError::inference("decoder", e))?;
        let logits = HostTensor::from_value(&outputs[0], "decoder")?;
        let (out_batch, out_len, vocab) = logits.dims3("decoder")?;
        if out_batch != batch || out_len != len {
            return Err(ExtractError::invalid_output(
                "decoder",
                format!("expected logits for [{batch}, {len}], got {:?}", logits.shape),
            ));
        }

        Ok((0..batch)
            .map(|b| {
                let start = (b * len + len - 1) * vocab;
                logits.data[start..start + vocab].to_vec()
            })
            .collect())
    }
}
