//! Conditioning tensors that identify a voice to the engine, plus their
//! nested-list JSON form used by voice libraries and the engine wire.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxweave_domain::VoiceError;

use crate::Result;

pub(crate) fn tensor_error(e: candle_core::Error) -> VoiceError {
    VoiceError::InvalidRequest(format!("embedding tensor: {e}"))
}

/// Latent and speaker embedding for one voice. Shapes are fixed per engine
/// and otherwise opaque.
#[derive(Debug, Clone)]
pub struct VoiceEmbeddingPair {
    pub conditioning_latent: Tensor,
    pub speaker_embedding: Tensor,
}

impl VoiceEmbeddingPair {
    pub fn new(conditioning_latent: Tensor, speaker_embedding: Tensor) -> Self {
        Self {
            conditioning_latent,
            speaker_embedding,
        }
    }

    pub fn from_payload(payload: &EmbeddingPayload) -> Result<Self> {
        Ok(Self {
            conditioning_latent: tensor_from_nested(&payload.conditioning_latent)?,
            speaker_embedding: tensor_from_nested(&payload.speaker_embedding)?,
        })
    }

    pub fn to_payload(&self) -> Result<EmbeddingPayload> {
        Ok(EmbeddingPayload {
            conditioning_latent: tensor_to_nested(&self.conditioning_latent)?,
            speaker_embedding: tensor_to_nested(&self.speaker_embedding)?,
        })
    }

    /// `true` when both fields match `other` in shape.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.conditioning_latent.dims() == other.conditioning_latent.dims()
            && self.speaker_embedding.dims() == other.speaker_embedding.dims()
    }
}

/// Serialized embedding pair. Voice libraries written by older tooling
/// name the latent `gpt_cond_latent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingPayload {
    #[serde(alias = "gpt_cond_latent")]
    pub conditioning_latent: Value,
    pub speaker_embedding: Value,
}

/// Build a CPU f32 tensor from arbitrarily nested, rectangular JSON arrays.
pub fn tensor_from_nested(value: &Value) -> Result<Tensor> {
    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    let mut data = Vec::with_capacity(shape.iter().product());
    flatten_into(value, &shape, &mut data)?;
    Tensor::from_vec(data, shape, &Device::Cpu).map_err(tensor_error)
}

fn flatten_into(value: &Value, shape: &[usize], out: &mut Vec<f32>) -> Result<()> {
    match (value, shape.split_first()) {
        (Value::Array(items), Some((&len, rest))) => {
            if items.len() != len {
                return Err(VoiceError::InvalidRequest(format!(
                    "ragged embedding: expected {len} elements, found {}",
                    items.len()
                )));
            }
            items.iter().try_for_each(|item| flatten_into(item, rest, out))
        }
        (Value::Number(n), None) => {
            let v = n.as_f64().ok_or_else(|| {
                VoiceError::InvalidRequest(format!("embedding value out of range: {n}"))
            })?;
            out.push(v as f32);
            Ok(())
        }
        (other, _) => Err(VoiceError::InvalidRequest(format!(
            "malformed embedding element: {other}"
        ))),
    }
}

/// Inverse of [`tensor_from_nested`].
pub fn tensor_to_nested(tensor: &Tensor) -> Result<Value> {
    let dims = tensor.dims().to_vec();
    let flat = tensor
        .to_dtype(candle_core::DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(tensor_error)?;
    let mut iter = flat.into_iter();
    Ok(build_nested(&dims, &mut iter))
}

fn build_nested(dims: &[usize], iter: &mut impl Iterator<Item = f32>) -> Value {
    match dims.split_first() {
        None => iter
            .next()
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some((&len, rest)) => Value::Array((0..len).map(|_| build_nested(rest, iter)).collect()),
    }
}
