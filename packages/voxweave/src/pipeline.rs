//! Per-request orchestration: validation, voice resolution, leased engine
//! work on blocking threads, post-processing, stitching and retention.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voxweave_domain::{
    NarrationRequest, OutputArtifact, PitchMode, PitchShift, ResidencyPolicy, SpanKind, SynthesisRequest,
    VoiceError, VoiceId, VoiceIdentity, validate_output_name,
};

use crate::Result;
use crate::audio::SAMPLE_RATE;
use crate::config::ServiceConfig;
use crate::engine::{InferenceParams, SynthesisEngine};
use crate::naming;
use crate::postprocess;
use crate::residency::{ModelResidencyController, PolicyChange};
use crate::retention::{ArtifactRetention, SweepReport};
use crate::staging;
use crate::stitch::SegmentStitcher;
use crate::stream::{FrameStream, StreamFramer, pump_frames, receive_frames};
use crate::text;
use crate::voice::{ResolvedVoice, VoiceBlender, VoiceEmbeddingPair, VoiceStore};

/// A voice identity whose components have been located but not yet turned
/// into conditioning (that needs the engine).
#[derive(Debug, Clone)]
struct VoicePlan {
    components: Vec<(ResolvedVoice, f32)>,
    blended: bool,
}

impl VoicePlan {
    fn condition(
        &self,
        engine: &mut dyn SynthesisEngine,
        blender: VoiceBlender,
    ) -> Result<VoiceEmbeddingPair> {
        let mut pairs = Vec::with_capacity(self.components.len());
        let mut weights = Vec::with_capacity(self.components.len());
        for (voice, weight) in &self.components {
            let pair = match voice {
                ResolvedVoice::Embedding(pair) => pair.clone(),
                ResolvedVoice::ReferenceAudio(path) => engine.conditioning_latents(path)?,
            };
            pairs.push(pair);
            weights.push(*weight);
        }
        if !self.blended && pairs.len() == 1 {
            return Ok(pairs.remove(0));
        }
        blender.blend(&pairs, &weights)
    }
}

struct ServiceInner {
    config: ServiceConfig,
    store: VoiceStore,
    residency: ModelResidencyController,
    blender: VoiceBlender,
    retention: ArtifactRetention,
    stitcher: SegmentStitcher,
    inference: InferenceParams,
}

/// The speech service. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct TtsService {
    inner: Arc<ServiceInner>,
}

impl TtsService {
    pub fn new(
        config: ServiceConfig,
        store: VoiceStore,
        residency: ModelResidencyController,
    ) -> Result<Self> {
        config.validate()?;
        let output_dir = &config.paths.output_dir;
        std::fs::create_dir_all(output_dir).map_err(|e| VoiceError::storage(output_dir, e))?;
        staging::staging_dir(output_dir)?;

        let inner = ServiceInner {
            blender: VoiceBlender::new(config.blend.mode),
            retention: ArtifactRetention::new(config.retention.keep_latest),
            stitcher: SegmentStitcher::new(output_dir.clone()),
            inference: config.inference_defaults(),
            config,
            store,
            residency,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &VoiceStore {
        &self.inner.store
    }

    pub fn residency(&self) -> &ModelResidencyController {
        &self.inner.residency
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.config.paths.output_dir
    }

    fn timeout(&self) -> Duration {
        self.inner.config.synthesis_timeout()
    }

    async fn plan(&self, identity: &VoiceIdentity) -> Result<VoicePlan> {
        match identity {
            VoiceIdentity::Single(id) => Ok(VoicePlan {
                components: vec![(self.inner.store.resolve(id).await?, 1.0)],
                blended: false,
            }),
            VoiceIdentity::Blended(parts) => {
                if parts.is_empty() {
                    return Err(VoiceError::ArityMismatch {
                        voices: 0,
                        weights: 0,
                    });
                }
                let mut components = Vec::with_capacity(parts.len());
                for part in parts {
                    components.push((self.inner.store.resolve(&part.voice).await?, part.weight));
                }
                Ok(VoicePlan {
                    components,
                    blended: true,
                })
            }
        }
    }

    /// Run `job` on a blocking thread, bounded by `limit`. On timeout the
    /// job keeps running in the background until it releases its lease.
    async fn run_blocking<T, F>(&self, limit: Duration, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(job)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(VoiceError::SynthesisFailed(format!(
                "synthesis worker failed: {join}"
            ))),
            Err(_) => {
                warn!(secs = limit.as_secs(), "synthesis timed out");
                Err(VoiceError::SynthesisTimeout {
                    secs: limit.as_secs(),
                })
            }
        }
    }

    /// Synthesize one request into `{output_dir}/{file_name}`, apply its
    /// pitch shift and sweep old artifacts.
    pub async fn generate(
        &self,
        request: SynthesisRequest,
        file_name: &str,
    ) -> Result<OutputArtifact> {
        request.validate(self.inner.config.synthesis.max_text_chars)?;
        let dest = self.artifact_path(file_name)?;
        let plan = self.plan(&request.voice).await?;
        let params = self.inner.inference.for_request(&request);
        let pitch = request.pitch;
        let text = request.text;

        let inner = Arc::clone(&self.inner);
        let artifact = self
            .run_blocking(self.timeout(), move || {
                let waveform = {
                    let mut lease = inner.residency.lease();
                    let voice = plan.condition(lease.engine(), inner.blender)?;
                    lease.engine().synthesize(&text, &voice, &params)?
                };
                let artifact =
                    postprocess::render(&waveform.samples, waveform.sample_rate, &dest, pitch)?;
                inner.sweep_quietly();
                Ok(artifact)
            })
            .await?;

        info!(
            path = %artifact.path.display(),
            bytes = artifact.size_bytes,
            "artifact written"
        );
        Ok(artifact)
    }

    /// Start a streamed synthesis. The returned stream yields a WAV header
    /// followed by PCM16 frames as the engine produces them; dropping it
    /// stops generation at the next frame boundary.
    pub async fn stream(&self, request: SynthesisRequest) -> Result<FrameStream> {
        request.validate(self.inner.config.synthesis.max_text_chars)?;
        let plan = self.plan(&request.voice).await?;
        let params = self.inner.inference.for_request(&request);
        let text = request.text;

        let (tx, rx) = mpsc::channel(self.inner.config.stream.buffer_frames);
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut lease = inner.residency.lease();
            let voice = match plan.condition(lease.engine(), inner.blender) {
                Ok(voice) => voice,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            let chunks = match lease.engine().synthesize_stream(&text, &voice, &params) {
                Ok(chunks) => chunks,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            let sent = pump_frames(StreamFramer::new(chunks, SAMPLE_RATE), &tx);
            debug!(frames = sent, "stream producer finished");
        });

        Ok(receive_frames(rx, self.timeout()))
    }

    /// Voice mixed narration/dialogue text. With narration disabled the
    /// whole text is filtered and voiced by the character voice.
    pub async fn narrate(&self, request: NarrationRequest) -> Result<OutputArtifact> {
        let limits = &self.inner.config;
        request.validate(limits.synthesis.max_text_chars)?;

        if !request.narrator_enabled {
            let text = text::apply_filtering(request.text_filtering, &request.text);
            let voice = VoiceIdentity::Single(request.character_voice);
            let synth = SynthesisRequest::new(text, voice).with_language(request.language);
            let name = naming::standard_output_name(
                &request.output_file_name,
                request.output_file_timestamp,
            );
            return self.generate(synth, &name).await;
        }

        let prepared = text::prepare_narration(&request.text);
        let min_chars = limits.narration.min_segment_chars;
        let segments: Vec<(SpanKind, String)> = text::segment(&prepared)
            .into_iter()
            .filter(|span| span.content.trim().chars().count() >= min_chars)
            .map(|span| {
                let role = request.ambiguous_voice.role_for(span.kind);
                (role, text::clean_segment(&span.content))
            })
            .collect();
        if segments.is_empty() {
            return Err(VoiceError::InvalidRequest(
                "text contains nothing long enough to voice".into(),
            ));
        }
        debug!(segments = segments.len(), "narration segmented");

        let mut voices: HashMap<SpanKind, (VoiceId, VoicePlan)> = HashMap::new();
        for (role, _) in &segments {
            if voices.contains_key(role) {
                continue;
            }
            let id = match role {
                SpanKind::Narrator => request.narrator_voice.clone(),
                _ => request.character_voice.clone(),
            };
            let plan = self.plan(&VoiceIdentity::Single(id.clone())).await?;
            voices.insert(*role, (id, plan));
        }

        let params = InferenceParams {
            language: request.language,
            ..self.inner.inference.clone()
        };
        let name = request.output_file_name.clone();
        let timestamp = request.output_file_timestamp;
        let limit = self.timeout() * segments.len() as u32;

        let inner = Arc::clone(&self.inner);
        self.run_blocking(limit, move || {
            inner.narrate_blocking(&segments, &voices, &params, &name, timestamp)
        })
        .await
    }

    /// Toggle low-resource residency. Waits for in-flight work.
    pub async fn set_low_resource(&self, enabled: bool) -> Result<PolicyChange> {
        let residency = self.inner.residency.clone();
        let policy = ResidencyPolicy::from_low_resource(enabled);
        tokio::task::spawn_blocking(move || residency.set_policy(policy))
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("policy worker failed: {e}")))?
    }

    /// Run a retention sweep over the output directory now.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.retention.sweep(&inner.config.paths.output_dir))
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("retention worker failed: {e}")))?
    }

    /// Final location for `file_name`, which must be a plain `.wav` name.
    fn artifact_path(&self, file_name: &str) -> Result<PathBuf> {
        let stem = file_name.strip_suffix(".wav").ok_or_else(|| {
            VoiceError::InvalidRequest(format!("output name must end in .wav: {file_name}"))
        })?;
        validate_output_name(stem)?;
        Ok(self.output_dir().join(file_name))
    }

    /// A pitch shift using the configured default mode unless one is given.
    pub fn pitch_shift(&self, semitones: i32, mode: Option<PitchMode>) -> PitchShift {
        PitchShift::new(semitones, mode.unwrap_or(self.inner.config.pitch.default_mode))
    }

    /// Reference clips available in the voices directory.
    pub fn list_voices(&self) -> Result<Vec<String>> {
        self.inner.store.list_reference_voices()
    }
}

impl ServiceInner {
    fn sweep_quietly(&self) {
        if let Err(e) = self.retention.sweep(&self.config.paths.output_dir) {
            warn!(error = %e, "retention sweep failed");
        }
    }

    fn narrate_blocking(
        &self,
        segments: &[(SpanKind, String)],
        voices: &HashMap<SpanKind, (VoiceId, VoicePlan)>,
        params: &InferenceParams,
        name: &str,
        timestamp: bool,
    ) -> Result<OutputArtifact> {
        let staging = staging::staging_dir(&self.config.paths.output_dir)?;
        let mut conditioned: HashMap<SpanKind, VoiceEmbeddingPair> = HashMap::new();
        let mut produced: Vec<PathBuf> = Vec::with_capacity(segments.len());

        let voiced = (|| -> Result<()> {
            for (index, (role, text)) in segments.iter().enumerate() {
                let (voice_id, plan) = voices.get(role).ok_or_else(|| {
                    VoiceError::VoiceNotFound(format!("no voice planned for {role:?}"))
                })?;
                debug!(index, ?role, voice = %voice_id, "voicing segment");

                let waveform = {
                    let mut lease = self.residency.lease();
                    let voice = match conditioned.get(role) {
                        Some(voice) => voice.clone(),
                        None => {
                            let voice = plan.condition(lease.engine(), self.blender)?;
                            conditioned.insert(*role, voice.clone());
                            voice
                        }
                    };
                    lease.engine().synthesize(text, &voice, params)?
                };

                let path = staging.join(naming::segment_name(name, index));
                postprocess::render(
                    &waveform.samples,
                    waveform.sample_rate,
                    &path,
                    PitchShift::NONE,
                )?;
                produced.push(path);
            }
            Ok(())
        })();

        // Partial narrations are worthless, so segments go with the failure.
        if let Err(e) = voiced {
            for path in &produced {
                if let Err(rm) = std::fs::remove_file(path) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %rm, "could not remove segment");
                    }
                }
            }
            return Err(e);
        }

        // Once every segment exists they are the only copy of the audio, so a
        // failed stitch leaves them in place.
        match self.stitcher.stitch(&produced, name, timestamp) {
            Ok(artifact) => {
                info!(
                    path = %artifact.path.display(),
                    segments = produced.len(),
                    "narration written"
                );
                self.sweep_quietly();
                Ok(artifact)
            }
            Err(e) => {
                for path in &produced {
                    warn!(path = %path.display(), "stitch failed, segment kept");
                }
                Err(e)
            }
        }
    }
}
