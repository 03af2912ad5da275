//! HTTP client for an out-of-process inference backend.
//!
//! Wire contract:
//!   * `GET  /health`            → `{"gpu_available": bool}`
//!   * `POST /conditioning`      WAV body → embedding pair JSON
//!   * `POST /inference`         JSON → WAV file bytes
//!   * `POST /inference/stream`  JSON → little-endian f32 samples, chunked
//!   * `POST /device`            `{"device": "cuda" | "cpu"}`
//!
//! The engine trait is blocking; requests are driven on the captured
//! runtime handle, so calls must come from a blocking thread.
//!
//! The request timeout bounds every call except the streamed body, whose
//! pacing is policed by the consumer's idle timeout.

use std::path::Path;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info};
use voxweave_domain::{Residency, VoiceError};

use crate::Result;
use crate::audio::decode_wav_bytes;
use crate::engine::{ChunkStream, EngineChunk, InferenceParams, SynthesisEngine, Waveform};
use crate::voice::{EmbeddingPayload, VoiceEmbeddingPair};

#[derive(Debug, Deserialize)]
struct Health {
    gpu_available: bool,
}

#[derive(Serialize)]
struct InferenceBody<'a> {
    text: &'a str,
    #[serde(flatten)]
    voice: EmbeddingPayload,
    #[serde(flatten)]
    params: &'a InferenceParams,
}

#[derive(Serialize)]
struct DeviceBody {
    device: &'static str,
}

pub struct RemoteEngine {
    base: reqwest::Url,
    client: reqwest::Client,
    timeout: Duration,
    handle: Handle,
    gpu_available: bool,
    /// Samples per chunk handed to the framer.
    stream_block: usize,
}

impl RemoteEngine {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        stream_block: usize,
        handle: Handle,
    ) -> Result<Self> {
        let base = reqwest::Url::parse(base_url)
            .map_err(|e| VoiceError::Configuration(format!("engine url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Configuration(format!("engine http client: {e}")))?;
        Ok(Self {
            base,
            client,
            timeout,
            handle,
            gpu_available: false,
            stream_block: stream_block.max(1),
        })
    }

    /// Ask the backend whether it has an accelerator.
    pub async fn probe(&mut self) -> Result<()> {
        let health: Health = self
            .client
            .get(self.endpoint("health")?)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(engine_err)?
            .json()
            .await
            .map_err(engine_err)?;
        self.gpu_available = health.gpu_available;
        info!(url = %self.base, gpu = health.gpu_available, "inference backend reachable");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url> {
        self.base
            .join(path)
            .map_err(|e| VoiceError::Configuration(format!("engine url: {e}")))
    }

    fn inference_request(
        &self,
        path: &str,
        text: &str,
        voice: &VoiceEmbeddingPair,
        params: &InferenceParams,
        deadline: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let body = InferenceBody {
            text,
            voice: voice.to_payload()?,
            params,
        };
        let mut request = self.client.post(self.endpoint(path)?).json(&body);
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }
        self.handle
            .block_on(async { request.send().await.and_then(|r| r.error_for_status()) })
            .map_err(engine_err)
    }
}

fn engine_err(e: reqwest::Error) -> VoiceError {
    if e.is_timeout() {
        VoiceError::SynthesisFailed(format!("inference backend timed out: {e}"))
    } else {
        VoiceError::SynthesisFailed(format!("inference backend: {e}"))
    }
}

impl SynthesisEngine for RemoteEngine {
    fn name(&self) -> &str {
        "remote"
    }

    fn conditioning_latents(&mut self, reference_wav: &Path) -> Result<VoiceEmbeddingPair> {
        let audio =
            std::fs::read(reference_wav).map_err(|e| VoiceError::storage(reference_wav, e))?;
        let request = self
            .client
            .post(self.endpoint("conditioning")?)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .timeout(self.timeout)
            .body(audio);
        let payload: EmbeddingPayload = self
            .handle
            .block_on(async {
                request
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())?
                    .json::<EmbeddingPayload>()
                    .await
            })
            .map_err(engine_err)?;
        VoiceEmbeddingPair::from_payload(&payload)
    }

    fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceEmbeddingPair,
        params: &InferenceParams,
    ) -> Result<Waveform> {
        let response =
            self.inference_request("inference", text, voice, params, Some(self.timeout))?;
        let bytes = self.handle.block_on(response.bytes()).map_err(engine_err)?;
        let decoded = decode_wav_bytes(&bytes)?;
        debug!(
            samples = decoded.samples.len(),
            rate = decoded.sample_rate,
            "remote synthesis done"
        );
        Ok(Waveform {
            samples: decoded.samples,
            sample_rate: decoded.sample_rate,
        })
    }

    fn synthesize_stream<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a VoiceEmbeddingPair,
        params: &'a InferenceParams,
    ) -> Result<ChunkStream<'a>> {
        let response =
            self.inference_request("inference/stream", text, voice, params, None)?;
        Ok(Box::new(RemoteChunks {
            response,
            handle: self.handle.clone(),
            buffer: BytesMut::new(),
            block_bytes: self.stream_block * 4,
            done: false,
        }))
    }

    fn gpu_available(&self) -> bool {
        self.gpu_available
    }

    fn relocate(&mut self, target: Residency) -> Result<()> {
        let device = match target {
            Residency::Gpu => "cuda",
            Residency::Cpu => "cpu",
        };
        let request = self
            .client
            .post(self.endpoint("device")?)
            .timeout(self.timeout)
            .json(&DeviceBody { device });
        self.handle
            .block_on(async { request.send().await.and_then(|r| r.error_for_status()) })
            .map_err(engine_err)?;
        Ok(())
    }
}

/// Pulls the streamed body on demand and re-blocks it into sample chunks.
struct RemoteChunks {
    response: reqwest::Response,
    handle: Handle,
    buffer: BytesMut,
    block_bytes: usize,
    done: bool,
}

impl RemoteChunks {
    fn take_samples(&mut self, bytes: usize) -> EngineChunk {
        let mut block = self.buffer.split_to(bytes);
        let mut samples = Vec::with_capacity(bytes / 4);
        while block.remaining() >= 4 {
            samples.push(block.get_f32_le());
        }
        EngineChunk::Samples(samples)
    }
}

impl Iterator for RemoteChunks {
    type Item = Result<EngineChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.buffer.len() < self.block_bytes {
            match self.handle.block_on(self.response.chunk()) {
                Ok(Some(bytes)) => self.buffer.extend_from_slice(&bytes),
                Ok(None) => self.done = true,
                Err(e) => {
                    self.done = true;
                    self.buffer.clear();
                    return Some(Err(engine_err(e)));
                }
            }
        }

        if self.buffer.len() >= self.block_bytes {
            return Some(Ok(self.take_samples(self.block_bytes)));
        }
        let whole = self.buffer.len() - self.buffer.len() % 4;
        if whole > 0 {
            return Some(Ok(self.take_samples(whole)));
        }
        if !self.buffer.is_empty() {
            let stray = self.buffer.len();
            self.buffer.clear();
            return Some(Err(VoiceError::AudioDecode(format!(
                "stream ended mid-sample ({stray} stray bytes)"
            ))));
        }
        None
    }
}
