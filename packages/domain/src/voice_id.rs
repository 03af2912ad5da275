//! Voice identifiers and weighted multi-voice identities.
use serde::{Deserialize, Serialize};

use crate::VoiceError;

/// Opaque voice identifier: a reference `.wav` file name, a voice-library
/// key, or an `http(s)` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceId(pub String);

impl VoiceId {
    /// Create a new voice identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier string.
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Whether the identifier points at a remote voice to download.
    pub fn is_url(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedVoice {
    pub voice: VoiceId,
    pub weight: f32,
}

/// The voice a request is synthesized with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceIdentity {
    Single(VoiceId),
    /// Ordered components; never empty.
    Blended(Vec<WeightedVoice>),
}

impl VoiceIdentity {
    pub fn single(voice: impl Into<String>) -> Self {
        Self::Single(VoiceId::new(voice))
    }

    /// Pair up parallel voice and weight lists.
    ///
    /// A single voice with weight 1.0 collapses to [`VoiceIdentity::Single`].
    pub fn from_parts(voices: Vec<String>, weights: Vec<f32>) -> Result<Self, VoiceError> {
        if voices.is_empty() || voices.len() != weights.len() {
            return Err(VoiceError::ArityMismatch {
                voices: voices.len(),
                weights: weights.len(),
            });
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(VoiceError::InvalidRequest(format!(
                "voice weight must be finite, got {w}"
            )));
        }
        if voices.len() == 1 && weights[0] == 1.0 {
            return Ok(Self::single(voices.into_iter().next().unwrap_or_default()));
        }
        Ok(Self::Blended(
            voices
                .into_iter()
                .zip(weights)
                .map(|(voice, weight)| WeightedVoice {
                    voice: VoiceId(voice),
                    weight,
                })
                .collect(),
        ))
    }

    /// Every voice referenced, in order.
    pub fn voices(&self) -> Vec<&VoiceId> {
        match self {
            Self::Single(id) => vec![id],
            Self::Blended(parts) => parts.iter().map(|p| &p.voice).collect(),
        }
    }
}

/// How weighted embeddings are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Scale each embedding by its weight, then take the arithmetic mean.
    #[default]
    MeanOfScaled,
    /// Weighted sum divided by the total weight.
    Normalized,
}
