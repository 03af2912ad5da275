//! Weighted blending of voice embeddings into one synthesis identity.

use candle_core::Tensor;
use tracing::debug;
use voxweave_domain::{BlendMode, VoiceError};

use crate::Result;
use crate::voice::embedding::{VoiceEmbeddingPair, tensor_error};

/// Blends embedding pairs with a fixed [`BlendMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceBlender {
    mode: BlendMode,
}

impl VoiceBlender {
    pub fn new(mode: BlendMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    pub fn blend(
        &self,
        pairs: &[VoiceEmbeddingPair],
        weights: &[f32],
    ) -> Result<VoiceEmbeddingPair> {
        blend(pairs, weights, self.mode)
    }
}

/// Combine `pairs` field by field.
///
/// Both fields are scaled by their voice's weight and stacked on a new
/// leading axis. [`BlendMode::MeanOfScaled`] then takes the mean over that
/// axis, so weights `[1, 1]` of identical inputs return the input unchanged;
/// [`BlendMode::Normalized`] divides the sum by the total weight instead.
pub fn blend(
    pairs: &[VoiceEmbeddingPair],
    weights: &[f32],
    mode: BlendMode,
) -> Result<VoiceEmbeddingPair> {
    if pairs.is_empty() || pairs.len() != weights.len() {
        return Err(VoiceError::ArityMismatch {
            voices: pairs.len(),
            weights: weights.len(),
        });
    }
    let first = &pairs[0];
    if let Some(idx) = pairs.iter().position(|p| !p.same_shape(first)) {
        return Err(VoiceError::InvalidRequest(format!(
            "embedding {idx} has shape latent {:?} / speaker {:?}, expected {:?} / {:?}",
            pairs[idx].conditioning_latent.dims(),
            pairs[idx].speaker_embedding.dims(),
            first.conditioning_latent.dims(),
            first.speaker_embedding.dims(),
        )));
    }

    debug!(voices = pairs.len(), ?mode, "blending voice embeddings");
    let latents: Vec<&Tensor> = pairs.iter().map(|p| &p.conditioning_latent).collect();
    let speakers: Vec<&Tensor> = pairs.iter().map(|p| &p.speaker_embedding).collect();
    Ok(VoiceEmbeddingPair {
        conditioning_latent: blend_field(&latents, weights, mode)?,
        speaker_embedding: blend_field(&speakers, weights, mode)?,
    })
}

fn blend_field(tensors: &[&Tensor], weights: &[f32], mode: BlendMode) -> Result<Tensor> {
    let scaled = tensors
        .iter()
        .zip(weights)
        .map(|(t, &w)| t.affine(w as f64, 0.0))
        .collect::<candle_core::Result<Vec<_>>>()
        .map_err(tensor_error)?;
    let stacked = Tensor::stack(&scaled, 0).map_err(tensor_error)?;

    match mode {
        BlendMode::MeanOfScaled => stacked.mean(0).map_err(tensor_error),
        BlendMode::Normalized => {
            let total: f64 = weights.iter().map(|&w| w as f64).sum();
            if total.abs() < f64::EPSILON {
                return Err(VoiceError::InvalidRequest(
                    "normalized blend needs a non-zero total weight".into(),
                ));
            }
            stacked
                .sum(0)
                .and_then(|t| t.affine(1.0 / total, 0.0))
                .map_err(tensor_error)
        }
    }
}
