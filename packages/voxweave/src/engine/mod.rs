//! Boundary to the neural synthesis engine.
//!
//! Engines are blocking and stateful (they own device placement), so every
//! call goes through a [`crate::residency::ModelLease`] on a blocking thread.

pub mod remote;

use std::path::Path;

use serde::{Deserialize, Serialize};
use voxweave_domain::{Language, Residency, SynthesisRequest};

use crate::Result;
use crate::voice::VoiceEmbeddingPair;

pub use remote::RemoteEngine;

/// A complete synthesized waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// One unit yielded by a streaming engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineChunk {
    Samples(Vec<f32>),
    /// Sub-sequences to be joined along time before use.
    Parts(Vec<Vec<f32>>),
}

impl EngineChunk {
    pub fn into_samples(self) -> Vec<f32> {
        match self {
            Self::Samples(s) => s,
            Self::Parts(parts) => parts.concat(),
        }
    }
}

/// Lazy, single-pass chunk sequence.
pub type ChunkStream<'a> = Box<dyn Iterator<Item = Result<EngineChunk>> + Send + 'a>;

/// Decoding parameters forwarded verbatim to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub language: Language,
    pub temperature: f32,
    pub length_penalty: f32,
    pub repetition_penalty: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub speed: f32,
    pub enable_text_splitting: bool,
    /// Tokens decoded per streamed chunk.
    pub stream_chunk_size: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            language: Language::ENGLISH,
            temperature: 0.75,
            length_penalty: 1.0,
            repetition_penalty: 10.0,
            top_k: 50,
            top_p: 0.85,
            speed: 1.0,
            enable_text_splitting: true,
            stream_chunk_size: 20,
        }
    }
}

impl InferenceParams {
    /// Overlay the per-request knobs on these defaults. Knobs the request
    /// leaves unset keep the configured value.
    pub fn for_request(&self, request: &SynthesisRequest) -> Self {
        Self {
            language: request.language,
            temperature: request.temperature.unwrap_or(self.temperature),
            repetition_penalty: request
                .repetition_penalty
                .unwrap_or(self.repetition_penalty),
            speed: request.speed.normalized().0,
            ..self.clone()
        }
    }
}

pub trait SynthesisEngine: Send {
    /// Human-readable engine name for logs and status.
    fn name(&self) -> &str;

    /// Derive conditioning from a reference clip.
    fn conditioning_latents(&mut self, reference_wav: &Path) -> Result<VoiceEmbeddingPair>;

    fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceEmbeddingPair,
        params: &InferenceParams,
    ) -> Result<Waveform>;

    /// Start a streaming synthesis. Nothing is decoded until the returned
    /// iterator is pulled; dropping it abandons the generation.
    fn synthesize_stream<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a VoiceEmbeddingPair,
        params: &'a InferenceParams,
    ) -> Result<ChunkStream<'a>>;

    /// Whether an accelerator is present at all.
    fn gpu_available(&self) -> bool;

    /// Move model weights to `target`.
    fn relocate(&mut self, target: Residency) -> Result<()>;
}

impl<E: SynthesisEngine + ?Sized> SynthesisEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn conditioning_latents(&mut self, reference_wav: &Path) -> Result<VoiceEmbeddingPair> {
        (**self).conditioning_latents(reference_wav)
    }

    fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceEmbeddingPair,
        params: &InferenceParams,
    ) -> Result<Waveform> {
        (**self).synthesize(text, voice, params)
    }

    fn synthesize_stream<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a VoiceEmbeddingPair,
        params: &'a InferenceParams,
    ) -> Result<ChunkStream<'a>> {
        (**self).synthesize_stream(text, voice, params)
    }

    fn gpu_available(&self) -> bool {
        (**self).gpu_available()
    }

    fn relocate(&mut self, target: Residency) -> Result<()> {
        (**self).relocate(target)
    }
}
