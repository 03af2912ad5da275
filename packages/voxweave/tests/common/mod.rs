//! In-process engine double shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use candle_core::{Device, Tensor};
use parking_lot::Mutex;
use tempfile::TempDir;
use voxweave::audio::{self, SAMPLE_RATE};
use voxweave::domain::{Residency, ResidencyPolicy, VoiceError};
use voxweave::engine::ChunkStream;
use voxweave::{
    EngineChunk, InferenceParams, ModelResidencyController, ServiceConfig, SynthesisEngine,
    TtsService, VoiceEmbeddingPair, VoiceStore, Waveform,
};

/// Samples produced per input character.
pub const SAMPLES_PER_CHAR: usize = 100;
pub const STREAM_CHUNKS: usize = 3;
pub const STREAM_CHUNK_LEN: usize = 480;

/// Engine events in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Trace {
    Enter(String),
    Exit(String),
    Moved(Residency),
}

#[derive(Debug, Default)]
pub struct EngineLog {
    /// `(text, speaker embedding fill value)` per synthesize call.
    pub spoken: Vec<(String, f32)>,
    pub conditioned: Vec<String>,
    pub relocations: Vec<Residency>,
    pub chunks_pulled: usize,
    /// `(temperature, repetition_penalty)` per synthesize call.
    pub knobs: Vec<(f32, f32)>,
    pub trace: Vec<Trace>,
}

pub struct FakeEngine {
    log: Arc<Mutex<EngineLog>>,
    gpu: bool,
    delay: Option<Duration>,
    /// Output rate per synthesize call, cycled; the canonical rate if empty.
    rates: Vec<u32>,
    calls: usize,
}

impl FakeEngine {
    pub fn new(gpu: bool) -> (Self, Arc<Mutex<EngineLog>>) {
        let log = Arc::new(Mutex::new(EngineLog::default()));
        let engine = Self {
            log: Arc::clone(&log),
            gpu,
            delay: None,
            rates: Vec::new(),
            calls: 0,
        };
        (engine, log)
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_rates(mut self, rates: Vec<u32>) -> Self {
        self.rates = rates;
        self
    }
}

/// An embedding pair whose every element is `value`.
pub fn filled_pair(value: f32) -> VoiceEmbeddingPair {
    let latent = Tensor::full(value, (1, 4), &Device::Cpu).expect("latent");
    let speaker = Tensor::full(value, (1, 2), &Device::Cpu).expect("speaker");
    VoiceEmbeddingPair::new(latent, speaker)
}

fn fill_value(pair: &VoiceEmbeddingPair) -> f32 {
    pair.speaker_embedding
        .flatten_all()
        .and_then(|t| t.to_vec1::<f32>())
        .map(|v| v[0])
        .unwrap_or(f32::NAN)
}

fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / SAMPLE_RATE as f32).sin() * 0.5)
        .collect()
}

impl SynthesisEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    /// Conditioning is filled with the reference clip's length in samples.
    fn conditioning_latents(&mut self, reference_wav: &Path) -> voxweave::Result<VoiceEmbeddingPair> {
        let decoded = audio::read_wav(reference_wav)?;
        let name = reference_wav
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.log.lock().conditioned.push(name);
        Ok(filled_pair(decoded.samples.len() as f32))
    }

    fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceEmbeddingPair,
        params: &InferenceParams,
    ) -> voxweave::Result<Waveform> {
        self.log.lock().trace.push(Trace::Enter(text.to_string()));
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let sample_rate = match self.rates.len() {
            0 => SAMPLE_RATE,
            n => self.rates[self.calls % n],
        };
        self.calls += 1;
        let mut log = self.log.lock();
        log.trace.push(Trace::Exit(text.to_string()));
        if text.contains("explode") {
            return Err(VoiceError::SynthesisFailed("engine fault".into()));
        }
        log.spoken.push((text.to_string(), fill_value(voice)));
        log.knobs.push((params.temperature, params.repetition_penalty));
        Ok(Waveform {
            samples: tone(text.chars().count() * SAMPLES_PER_CHAR),
            sample_rate,
        })
    }

    fn synthesize_stream<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a VoiceEmbeddingPair,
        _params: &'a InferenceParams,
    ) -> voxweave::Result<ChunkStream<'a>> {
        self.log.lock().spoken.push((text.to_string(), fill_value(voice)));
        let log = Arc::clone(&self.log);
        let delay = self.delay;
        Ok(Box::new((0..STREAM_CHUNKS).map(move |_| {
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            log.lock().chunks_pulled += 1;
            Ok(EngineChunk::Samples(tone(STREAM_CHUNK_LEN)))
        })))
    }

    fn gpu_available(&self) -> bool {
        self.gpu
    }

    fn relocate(&mut self, target: Residency) -> voxweave::Result<()> {
        let mut log = self.log.lock();
        log.relocations.push(target);
        log.trace.push(Trace::Moved(target));
        Ok(())
    }
}

pub struct Harness {
    pub service: TtsService,
    pub log: Arc<Mutex<EngineLog>>,
    pub root: TempDir,
}

impl Harness {
    pub fn output_dir(&self) -> std::path::PathBuf {
        self.root.path().join("outputs")
    }
}

/// Config rooted in a fresh temp dir, with two reference voices:
/// `narrator.wav` (100 samples) and `hero.wav` (200 samples).
pub fn config_in(root: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.paths.output_dir = root.join("outputs");
    config.paths.voices_dir = root.join("voices");
    std::fs::create_dir_all(&config.paths.voices_dir).expect("voices dir");
    audio::write_pcm16_wav(&config.paths.voices_dir.join("narrator.wav"), &tone(100), SAMPLE_RATE)
        .expect("narrator voice");
    audio::write_pcm16_wav(&config.paths.voices_dir.join("hero.wav"), &tone(200), SAMPLE_RATE)
        .expect("hero voice");
    config
}

pub async fn harness_with(
    engine: FakeEngine,
    log: Arc<Mutex<EngineLog>>,
    policy: ResidencyPolicy,
    tweak: impl FnOnce(&mut ServiceConfig),
) -> Harness {
    let root = TempDir::new().expect("tempdir");
    let mut config = config_in(root.path());
    tweak(&mut config);
    let mut store = VoiceStore::new(config.paths.voices_dir.clone());
    store.insert_embedding("warm", filled_pair(2.0));
    store.insert_embedding("bright", filled_pair(4.0));

    let residency = tokio::task::spawn_blocking(move || {
        ModelResidencyController::start(Box::new(engine), policy)
    })
    .await
    .expect("join")
    .expect("start");
    let service = TtsService::new(config, store, residency).expect("service");
    Harness { service, log, root }
}

pub async fn harness() -> Harness {
    let (engine, log) = FakeEngine::new(false);
    harness_with(engine, log, ResidencyPolicy::Standard, |_| {}).await
}
