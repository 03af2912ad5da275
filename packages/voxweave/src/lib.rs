//! # voxweave
//!
//! Orchestration around a speech-synthesis engine: narration segmentation,
//! voice blending, pitch post-processing, streamed WAV framing, stitching,
//! output retention and GPU/CPU residency of the model.
//!
//! [`TtsService`] is the entry point. Engine work is blocking and runs on
//! tokio's blocking pool; the engine itself sits behind
//! [`ModelResidencyController`] so one request uses it at a time.

pub mod audio;
pub mod config;
pub mod engine;
pub mod naming;
pub mod pipeline;
pub mod postprocess;
pub mod residency;
pub mod retention;
pub mod staging;
pub mod stitch;
pub mod stream;
pub mod text;
pub mod voice;

pub use voxweave_domain as domain;
pub use voxweave_domain::{ErrorKind, VoiceError};

pub use config::ServiceConfig;
pub use engine::{EngineChunk, InferenceParams, SynthesisEngine, Waveform, remote::RemoteEngine};
pub use pipeline::TtsService;
pub use residency::{ModelLease, ModelResidencyController, PolicyChange, ResidencyStatus};
pub use stream::FrameStream;
pub use voice::{VoiceBlender, VoiceEmbeddingPair, VoiceStore};

pub type Result<T> = std::result::Result<T, VoiceError>;
